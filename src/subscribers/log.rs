//! # Logging subscriber.
//!
//! [`LogWriter`] renders scheduler events through [`tracing`], so failures are
//! logged with the originating task or service name without propagating past
//! the scheduler boundary.
//!
//! ## Output (with a fmt subscriber installed)
//! ```text
//! DEBUG task starting task=resize job=7
//! ERROR task failed task=resize job=7 reason="execution failed: disk full"
//!  WARN schedule suppressed task=heartbeat job=3 reason="execution failed: timeout"
//!  INFO service started task=http
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// `tracing`-backed logging subscriber.
///
/// Enabled via the `logging` feature (on by default).
#[derive(Debug, Default, Clone, Copy)]
pub struct LogWriter;

impl LogWriter {
    /// Creates a new log writer.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let task = e.task.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        let job = e.job.map(|j| j.get()).unwrap_or_default();

        match e.kind {
            EventKind::TaskSubmitted => tracing::trace!(task, job, "task submitted"),
            EventKind::TaskRejected => tracing::warn!(task, reason, "task rejected"),
            EventKind::TaskStarting => tracing::debug!(task, job, "task starting"),
            EventKind::TaskStopped => tracing::debug!(task, job, reason, "task stopped"),
            EventKind::TaskFailed => tracing::error!(task, job, reason, "task failed"),
            EventKind::ChildrenSubmitted => {
                tracing::trace!(task, count = e.count.unwrap_or_default(), "children submitted")
            }
            EventKind::ScheduleRegistered => {
                tracing::debug!(task, job, delay_ms = e.delay_ms.unwrap_or_default(), "schedule registered")
            }
            EventKind::ScheduleSuppressed => tracing::warn!(task, job, reason, "schedule suppressed"),
            EventKind::ServiceStarted => tracing::info!(task, "service started"),
            EventKind::ServiceRestarting => tracing::info!(task, "service restarting"),
            EventKind::ServiceStopped => tracing::info!(task, "service stopped"),
            EventKind::ServiceFailed => tracing::error!(task, reason, "service failed"),
            EventKind::ShutdownRequested => tracing::info!("shutdown requested"),
            EventKind::AllStoppedWithin => tracing::info!("all jobs stopped within timeout"),
            EventKind::GraceExceeded => tracing::warn!("termination timeout exceeded"),
            EventKind::SubscriberOverflow => tracing::warn!(subscriber = task, reason, "subscriber overflow"),
            EventKind::SubscriberPanicked => tracing::error!(subscriber = task, reason, "subscriber panicked"),
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
