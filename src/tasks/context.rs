//! # Per-run task context.
//!
//! A fresh [`TaskContext`] is created for every run of a [`Task`](crate::Task).
//! It carries the ordered child queue, the job's cancellation token and a
//! handle to the scheduler that is running it.

use tokio_util::sync::CancellationToken;

use crate::runtime::SchedulerHandle;
use crate::tasks::TaskRef;

/// Mutable state handed to every hook of one task run.
pub struct TaskContext {
    scheduler: SchedulerHandle,
    token: CancellationToken,
    children: Vec<TaskRef>,
}

impl TaskContext {
    pub(crate) fn new(scheduler: SchedulerHandle, token: CancellationToken) -> Self {
        Self {
            scheduler,
            token,
            children: Vec::new(),
        }
    }

    /// Queues a child task; it is submitted after `process` returns.
    pub fn push_child(&mut self, child: TaskRef) {
        self.children.push(child);
    }

    /// Children currently queued (in submission order).
    pub fn children(&self) -> &[TaskRef] {
        &self.children
    }

    /// Scheduler running this task.
    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    /// Cancellation token of the job.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Shorthand for `token().is_cancelled()`.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn take_children(&mut self) -> Vec<TaskRef> {
        std::mem::take(&mut self.children)
    }
}
