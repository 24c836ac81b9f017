//! # Long-running services.
//!
//! A [`Service`] is a task specialization that runs on its own dedicated thread
//! (see [`SchedulerHandle::create_service`](crate::SchedulerHandle::create_service))
//! and loops until an external shutdown request.
//!
//! ## Lifecycle on the service thread
//! ```text
//! pre      ──► start()
//! process  ──► service(ctx)        loop owned by the concrete service:
//!                                    while !shutdown {
//!                                        control.wait(interval)
//!                                        if restart requested {
//!                                            stop(delay); start(); clear_restart()
//!                                        }
//!                                    }
//! post     ──► stop(Duration::ZERO)
//! ```
//!
//! If `start()` or `service()` fails, `stop(Duration::ZERO)` still runs once
//! before the error is reported.
//!
//! ## Rules
//! - Shutdown is cooperative: observed at the next wake of [`ServiceControl::wait`].
//! - `stop`/`start` must be idempotent; restart cycles may repeat.
//! - The restart flag is cleared by the service itself once the cycle completed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::TaskError;
use crate::tasks::{Task, TaskContext};

/// Shutdown/restart flags shared between a service and its controllers.
#[derive(Debug, Default)]
pub struct ServiceControl {
    shutdown: AtomicBool,
    restart: AtomicBool,
    wake: Notify,
}

impl ServiceControl {
    /// Creates a control block with both flags cleared.
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the service loop to exit.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// Asks the service loop to run a stop/start cycle.
    pub fn request_restart(&self) {
        self.restart.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// True once shutdown was requested.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// True while a restart request is pending.
    pub fn restart_requested(&self) -> bool {
        self.restart.load(Ordering::Acquire)
    }

    /// Clears a pending restart request.
    pub fn clear_restart(&self) {
        self.restart.store(false, Ordering::Release);
    }

    /// Waits up to `interval` for a shutdown or restart request.
    ///
    /// Returns `true` when woken by a request, `false` on timeout.
    pub async fn wait(&self, interval: Duration) -> bool {
        if self.is_shutdown() || self.restart_requested() {
            return true;
        }
        tokio::time::timeout(interval, self.wake.notified())
            .await
            .is_ok()
    }
}

/// # Long-running service with cooperative shutdown/restart.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use async_trait::async_trait;
/// use pipevisor::{Service, ServiceControl, TaskContext, TaskError};
///
/// #[derive(Default)]
/// struct Heartbeat { control: ServiceControl }
///
/// #[async_trait]
/// impl Service for Heartbeat {
///     fn control(&self) -> &ServiceControl { &self.control }
///     async fn start(&self) -> Result<(), TaskError> { Ok(()) }
///     async fn stop(&self, _delay: Duration) -> Result<(), TaskError> { Ok(()) }
///     async fn service(&self, _ctx: &mut TaskContext) -> Result<(), TaskError> {
///         self.idle_loop(Duration::from_millis(100), Duration::ZERO).await
///     }
/// }
/// ```
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Shared shutdown/restart flags of this service.
    fn control(&self) -> &ServiceControl;

    /// Acquires the service's resources (e.g. binds a socket).
    async fn start(&self) -> Result<(), TaskError>;

    /// Releases the service's resources, after waiting `delay`.
    async fn stop(&self, delay: Duration) -> Result<(), TaskError>;

    /// Service loop; returns once shutdown was requested.
    async fn service(&self, ctx: &mut TaskContext) -> Result<(), TaskError>;

    /// Canonical loop for services without per-iteration work: wait, honour
    /// restart requests, repeat until shutdown.
    async fn idle_loop(&self, interval: Duration, restart_delay: Duration) -> Result<(), TaskError> {
        let control = self.control();
        while !control.is_shutdown() {
            control.wait(interval).await;
            if control.restart_requested() && !control.is_shutdown() {
                self.stop(restart_delay).await?;
                self.start().await?;
                control.clear_restart();
            }
        }
        Ok(())
    }
}

/// Runs a [`Service`] through the task protocol under its registered name.
pub(crate) struct ServiceTask {
    name: Arc<str>,
    service: Arc<dyn Service>,
}

impl ServiceTask {
    pub(crate) fn new(name: Arc<str>, service: Arc<dyn Service>) -> Self {
        Self { name, service }
    }

    /// Releases the service's resources after a failed hook and hands back the hook's error.
    async fn stop_after(&self, err: TaskError) -> TaskError {
        if let Err(stop_err) = self.service.stop(Duration::ZERO).await {
            tracing::warn!(
                service = %self.name,
                error = %stop_err,
                "stop after failure also failed"
            );
        }
        err
    }
}

#[async_trait]
impl Task for ServiceTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn pre(&self, _ctx: &mut TaskContext) -> Result<(), TaskError> {
        match self.service.start().await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.stop_after(e).await),
        }
    }

    async fn process(&self, ctx: &mut TaskContext) -> Result<(), TaskError> {
        match self.service.service(ctx).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.stop_after(e).await),
        }
    }

    async fn post(&self, _ctx: &mut TaskContext) -> Result<(), TaskError> {
        self.service.stop(Duration::ZERO).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_times_out_without_requests() {
        let control = ServiceControl::new();
        assert!(!control.wait(Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn test_wait_wakes_on_restart_request() {
        let control = Arc::new(ServiceControl::new());
        let c = Arc::clone(&control);
        let waiter = tokio::spawn(async move { c.wait(Duration::from_secs(5)).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        control.request_restart();
        assert!(waiter.await.unwrap());
        assert!(control.restart_requested());

        control.clear_restart();
        assert!(!control.restart_requested());
    }

    #[tokio::test]
    async fn test_pending_shutdown_returns_immediately() {
        let control = ServiceControl::new();
        control.request_shutdown();
        assert!(control.is_shutdown());
        assert!(control.wait(Duration::from_secs(5)).await);
    }
}
