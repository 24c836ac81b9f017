//! # Task abstraction.
//!
//! A [`Task`] is the unit of schedulable work. Every run follows a fixed
//! three-phase protocol driven by the scheduler:
//!
//! ```text
//! pre(ctx) ──► process(ctx) ──► submit every child queued in ctx ──► post(ctx)
//! ```
//!
//! Children pushed during `post` are **not** submitted by that run. Any error
//! returned by a hook ends the run; the error is confined to the job's handle.
//!
//! Fan-out happens breadth-wise through the scheduler instead of through
//! recursive calls, so deep task trees do not grow the call stack.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TaskError;
use crate::tasks::TaskContext;

/// # Asynchronous unit of work with pre/process/post hooks.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use pipevisor::{Task, TaskContext, TaskError};
///
/// struct Crawl { depth: u32 }
///
/// #[async_trait]
/// impl Task for Crawl {
///     fn name(&self) -> &str { "crawl" }
///
///     async fn process(&self, ctx: &mut TaskContext) -> Result<(), TaskError> {
///         if self.depth > 0 {
///             ctx.push_child(std::sync::Arc::new(Crawl { depth: self.depth - 1 }));
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Returns a stable, human-readable task name (used in events and logs).
    fn name(&self) -> &str;

    /// Runs before `process`.
    async fn pre(&self, _ctx: &mut TaskContext) -> Result<(), TaskError> {
        Ok(())
    }

    /// Main body; may queue child tasks with [`TaskContext::push_child`].
    async fn process(&self, ctx: &mut TaskContext) -> Result<(), TaskError>;

    /// Runs after the queued children were handed to the scheduler.
    async fn post(&self, _ctx: &mut TaskContext) -> Result<(), TaskError> {
        Ok(())
    }
}

/// Shared handle to a task object.
pub type TaskRef = Arc<dyn Task>;
