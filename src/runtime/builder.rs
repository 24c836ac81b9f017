use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;

use crate::error::SchedulerError;
use crate::events::Bus;
use crate::runtime::scheduler::Shared;
use crate::runtime::{SchedulerConfig, TaskScheduler};
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for constructing a [`TaskScheduler`] with optional subscribers.
pub struct SchedulerBuilder {
    cfg: SchedulerConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl SchedulerBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: SchedulerConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (job lifecycle, schedules, services)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the scheduler.
    ///
    /// Starts the worker runtime (`pool_size` threads), the single-thread timer
    /// runtime, the fork-join pool and one listener forwarding bus events to
    /// the subscribers.
    pub fn build(self) -> Result<TaskScheduler, SchedulerError> {
        let pool_size = self.cfg.pool_size();
        let prefix = self.cfg.thread_name.clone();

        let workers = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(pool_size)
            .thread_name(format!("{prefix}-worker"))
            .enable_all()
            .build()
            .map_err(|e| startup("workers", e))?;

        let timers = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name(format!("{prefix}-timer"))
            .enable_all()
            .build()
            .map_err(|e| startup("timers", e))?;

        let fork_prefix = prefix.clone();
        let fork_join = rayon::ThreadPoolBuilder::new()
            .num_threads(pool_size)
            .thread_name(move |i| format!("{fork_prefix}-fork-{i}"))
            .build()
            .map_err(|e| startup("fork-join", e))?;

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        if !self.subscribers.is_empty() {
            let subs = SubscriberSet::new(self.subscribers, bus.clone(), workers.handle());
            let mut rx = bus.subscribe();
            workers.spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(ev) => subs.emit(&ev),
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    }
                }
            });
        }

        tracing::debug!(pool_size, prefix = %prefix, "scheduler started");
        let shared = Shared::new(
            self.cfg,
            pool_size,
            bus,
            workers.handle().clone(),
            timers.handle().clone(),
            fork_join,
        );
        Ok(TaskScheduler::new(shared, workers, timers))
    }
}

fn startup(component: &str, e: impl std::fmt::Display) -> SchedulerError {
    SchedulerError::Startup {
        component: component.to_string(),
        error: e.to_string(),
    }
}
