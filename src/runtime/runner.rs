//! # Run one task through the pre/process/post protocol.
//!
//! ## Flow
//! ```text
//! pre(ctx)?  ──► process(ctx)?  ──► take queued children
//!                                        │
//!                                        ├─ submit each (rejection → TaskError::Fail)
//!                                        └─ publish ChildrenSubmitted (count > 0)
//!            ──► post(ctx)?     ──► children queued in post are dropped (trace log)
//! ```
//!
//! ## Rules
//! - The first hook error ends the run; later hooks do not run.
//! - Children are submitted as independent jobs; the parent does not wait for them.
//! - Terminal events (`TaskStopped`/`TaskFailed`) are published by the caller.

use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::events::{Event, EventKind};
use crate::runtime::SchedulerHandle;
use crate::tasks::{TaskContext, TaskRef};

/// Executes one run of `task` with a fresh [`TaskContext`].
pub(crate) async fn run_task(
    task: TaskRef,
    scheduler: SchedulerHandle,
    token: CancellationToken,
) -> Result<(), TaskError> {
    let mut ctx = TaskContext::new(scheduler, token);

    task.pre(&mut ctx).await?;
    task.process(&mut ctx).await?;

    let children = ctx.take_children();
    let count = children.len();
    for child in children {
        let child_name = child.name().to_string();
        if let Err(e) = ctx.scheduler().submit(child) {
            return Err(TaskError::fail(format!(
                "child {child_name} of {} rejected: {}",
                task.name(),
                e.as_message()
            )));
        }
    }
    if count > 0 {
        ctx.scheduler().bus().publish(
            Event::new(EventKind::ChildrenSubmitted)
                .with_task(task.name())
                .with_count(count),
        );
    }

    task.post(&mut ctx).await?;

    let late = ctx.children().len();
    if late > 0 {
        tracing::trace!(task = task.name(), late, "children queued in post are not submitted");
    }
    Ok(())
}
