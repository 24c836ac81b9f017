//! # Runtime events emitted by the scheduler, its jobs and services.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Job events**: submission, start, completion, failure, child fan-out
//! - **Schedule events**: delayed/periodic registration and suppression
//! - **Service events**: dedicated-thread service lifecycle
//! - **Shutdown events**: drain progress of the scheduler
//!
//! The [`Event`] struct carries metadata such as timestamps, task name,
//! job id, reasons and delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use pipevisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::TaskFailed)
//!     .with_task("resize-images")
//!     .with_reason("disk full")
//!     .with_delay(Duration::from_millis(250));
//!
//! assert_eq!(ev.kind, EventKind::TaskFailed);
//! assert_eq!(ev.task.as_deref(), Some("resize-images"));
//! assert_eq!(ev.delay_ms, Some(250));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::runtime::JobId;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `task` (subscriber name), `reason` (panic message).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `task` (subscriber name), `reason` (`full` / `closed`).
    SubscriberOverflow,

    // === Job events ===
    /// Job accepted by the scheduler and queued.
    ///
    /// Sets: `task`, `job`.
    TaskSubmitted,

    /// Submission refused (scheduler shut down or queue saturated).
    ///
    /// Sets: `task`, `reason`.
    TaskRejected,

    /// Job obtained a worker slot and is starting.
    ///
    /// Sets: `task`, `job`.
    TaskStarting,

    /// Job finished successfully or was cancelled.
    ///
    /// Sets: `task`, `job`, `reason` (`canceled` for cancellations).
    TaskStopped,

    /// Job failed or panicked.
    ///
    /// Sets: `task`, `job`, `reason`.
    TaskFailed,

    /// A task run handed its queued children back to the scheduler.
    ///
    /// Sets: `task`, `count`.
    ChildrenSubmitted,

    // === Schedule events ===
    /// A delayed or periodic schedule was registered.
    ///
    /// Sets: `task`, `job`, `delay_ms` (initial delay).
    ScheduleRegistered,

    /// A periodic run failed; no further runs of that schedule will happen.
    ///
    /// Sets: `task`, `job`, `reason`.
    ScheduleSuppressed,

    // === Service events ===
    /// Service thread started.
    ///
    /// Sets: `task` (service name).
    ServiceStarted,

    /// Restart requested for a service.
    ///
    /// Sets: `task` (service name).
    ServiceRestarting,

    /// Service loop exited cleanly.
    ///
    /// Sets: `task` (service name).
    ServiceStopped,

    /// Service loop exited with an error or panic.
    ///
    /// Sets: `task` (service name), `reason`.
    ServiceFailed,

    // === Shutdown events ===
    /// Shutdown requested; no new submissions are accepted.
    ShutdownRequested,

    /// Every job, schedule and service drained within the timeout.
    AllStoppedWithin,

    /// Termination timeout exceeded; some jobs or services are still running.
    GraceExceeded,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the task, service or subscriber, if applicable.
    pub task: Option<Arc<str>>,
    /// Job identifier, if applicable.
    pub job: Option<JobId>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Item count (e.g. children submitted).
    pub count: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            job: None,
            reason: None,
            delay_ms: None,
            count: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a task name.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches a job identifier.
    #[inline]
    pub fn with_job(mut self, job: JobId) -> Self {
        self.job = Some(job);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches an item count.
    #[inline]
    pub fn with_count(mut self, n: usize) -> Self {
        self.count = Some(n.min(u32::MAX as usize) as u32);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }
}
