//! Error types used by the scheduler, its jobs and the lock primitives.
//!
//! This module defines three error enums:
//!
//! - [`SchedulerError`] - errors raised by the scheduler itself (rejections, shutdown).
//! - [`TaskError`] - errors raised by individual job executions.
//! - [`LockError`] - misuse of a lock primitive.
//!
//! All of them provide `as_label` (stable snake_case, for logs/metrics) and `as_message`.

use std::any::Any;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinError;

/// # Errors produced by the scheduler.
///
/// These represent failures of the scheduling system itself, surfaced
/// synchronously to whoever asked for work to be accepted or drained.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The scheduler cannot accept more work (shut down or queue saturated).
    #[error("submission rejected: {reason}")]
    Rejected {
        /// Why the submission was refused (`shutdown`, `queue_full`).
        reason: &'static str,
    },

    /// Jobs or services were still running when the termination timeout elapsed.
    #[error("termination timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The timeout that was exceeded.
        grace: Duration,
        /// Names of jobs and services that did not finish in time.
        stuck: Vec<String>,
    },

    /// A live service is already registered under this name.
    #[error("service {name:?} is already running")]
    ServiceExists {
        /// The duplicate service name.
        name: String,
    },

    /// No service is registered under this name.
    #[error("service {name:?} not found")]
    ServiceNotFound {
        /// The requested service name.
        name: String,
    },

    /// A scheduling argument was out of range (e.g. a zero period).
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong with the argument.
        reason: &'static str,
    },

    /// A thread pool or runtime could not be started.
    #[error("failed to start {component}: {error}")]
    Startup {
        /// Which pool failed (`workers`, `timers`, `fork-join`, service name).
        component: String,
        /// The underlying error message.
        error: String,
    },

    /// Registering OS signal handlers failed.
    #[error("signal handling failed: {0}")]
    Signal(#[from] std::io::Error),
}

impl SchedulerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use pipevisor::SchedulerError;
    ///
    /// let err = SchedulerError::Rejected { reason: "shutdown" };
    /// assert_eq!(err.as_label(), "scheduler_rejected");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SchedulerError::Rejected { .. } => "scheduler_rejected",
            SchedulerError::GraceExceeded { .. } => "scheduler_grace_exceeded",
            SchedulerError::ServiceExists { .. } => "scheduler_service_exists",
            SchedulerError::ServiceNotFound { .. } => "scheduler_service_not_found",
            SchedulerError::InvalidArgument { .. } => "scheduler_invalid_argument",
            SchedulerError::Startup { .. } => "scheduler_startup",
            SchedulerError::Signal(_) => "scheduler_signal",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            SchedulerError::Rejected { reason } => format!("rejected: {reason}"),
            SchedulerError::GraceExceeded { grace, stuck } => {
                format!("grace exceeded after {grace:?}; stuck={stuck:?}")
            }
            SchedulerError::ServiceExists { name } => format!("service exists: {name}"),
            SchedulerError::ServiceNotFound { name } => format!("service not found: {name}"),
            SchedulerError::InvalidArgument { reason } => format!("invalid argument: {reason}"),
            SchedulerError::Startup { component, error } => format!("{component}: {error}"),
            SchedulerError::Signal(e) => format!("signal: {e}"),
        }
    }
}

/// # Errors produced by job execution.
///
/// Confined to the job's own [`JobHandle`](crate::JobHandle); they never
/// affect sibling jobs or the pool.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TaskError {
    /// Execution failed; the job may succeed if submitted again.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable error.
    #[error("fatal error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// The job was cancelled (handle cancel, `shutdown_now`, periodic schedule stop).
    #[error("job cancelled")]
    Canceled,

    /// The job panicked; the panic was caught at the scheduler boundary.
    #[error("job panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },

    /// A lock used by the job was misused.
    #[error(transparent)]
    Lock(#[from] LockError),
}

impl TaskError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use pipevisor::TaskError;
    ///
    /// let err = TaskError::Fail { error: "boom".into() };
    /// assert_eq!(err.as_label(), "task_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::Fatal { .. } => "task_fatal",
            TaskError::Canceled => "task_canceled",
            TaskError::Panicked { .. } => "task_panicked",
            TaskError::Lock(_) => "task_lock",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TaskError::Fail { error } => format!("error: {error}"),
            TaskError::Fatal { error } => format!("fatal: {error}"),
            TaskError::Canceled => "cancelled".to_string(),
            TaskError::Panicked { info } => format!("panic: {info}"),
            TaskError::Lock(e) => e.as_message(),
        }
    }

    /// Shorthand for [`TaskError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        TaskError::Fail {
            error: error.into(),
        }
    }

    pub(crate) fn panicked(payload: &(dyn Any + Send)) -> Self {
        TaskError::Panicked {
            info: panic_message(payload),
        }
    }

    pub(crate) fn from_join(err: JoinError) -> Self {
        if err.is_panic() {
            let payload = err.into_panic();
            TaskError::panicked(&*payload)
        } else {
            TaskError::Canceled
        }
    }
}

/// # Errors produced by lock primitives.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Direct `lock()`/`unlock()` on a lock that only supports scoped use.
    #[error("{lock} must be used through its scoped API, not lock()/unlock()")]
    Misuse {
        /// Type name of the misused lock.
        lock: &'static str,
    },

    /// `unlock()` on a lock (or permit) that is not held.
    #[error("unlock called on a lock that is not held")]
    NotHeld,

    /// The registry already holds a live lock of another type under this name.
    #[error("lock {name:?} is registered with a different type")]
    TypeMismatch {
        /// The lock name.
        name: String,
    },

    /// The underlying semaphore was closed.
    #[error("semaphore closed")]
    Closed,
}

impl LockError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            LockError::Misuse { .. } => "lock_misuse",
            LockError::NotHeld => "lock_not_held",
            LockError::TypeMismatch { .. } => "lock_type_mismatch",
            LockError::Closed => "lock_closed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            LockError::Misuse { lock } => format!("misuse of {lock}"),
            LockError::NotHeld => "not held".to_string(),
            LockError::TypeMismatch { name } => format!("type mismatch for {name}"),
            LockError::Closed => "closed".to_string(),
        }
    }
}

/// Renders a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
