//! # Pipeline stage contract.
//!
//! A [`Pipe`] transforms (or merely observes) the data of one flow. Stages
//! receive a [`PipeContext`] describing the flow, so they can be dropped into
//! any pipeline engine without that engine knowing what they do.

use crate::error::TaskError;
use crate::runtime::JobId;

/// Per-flow information handed to every stage.
#[derive(Clone, Copy, Debug)]
pub struct PipeContext<'a> {
    /// Jobs of the flows started before this one in the same parallel run.
    pub futures: &'a [JobId],
    /// Name of the pipeline driving the flow.
    pub pipeline: &'a str,
    /// True when the flow runs concurrently with other flows.
    pub parallel: bool,
}

impl<'a> PipeContext<'a> {
    /// Context of a single flow run on the calling thread.
    pub fn sequential(pipeline: &'a str) -> Self {
        Self {
            futures: &[],
            pipeline,
            parallel: false,
        }
    }
}

/// One stage of a pipeline.
pub trait Pipe<T>: Send + Sync {
    /// Processes `data` and hands it to the next stage.
    fn process(&self, data: T, ctx: &PipeContext<'_>) -> Result<T, TaskError>;
}

/// Closure-backed [`Pipe`].
///
/// # Example
/// ```
/// use pipevisor::{FnPipe, Pipe, PipeContext};
///
/// let double = FnPipe::new(|n: u32, _ctx: &PipeContext<'_>| Ok(n * 2));
/// assert_eq!(double.process(21, &PipeContext::sequential("demo")).unwrap(), 42);
/// ```
pub struct FnPipe<F>(F);

impl<F> FnPipe<F> {
    /// Wraps `f` as a stage.
    pub fn new<T>(f: F) -> Self
    where
        F: Fn(T, &PipeContext<'_>) -> Result<T, TaskError> + Send + Sync,
    {
        Self(f)
    }
}

impl<T, F> Pipe<T> for FnPipe<F>
where
    F: Fn(T, &PipeContext<'_>) -> Result<T, TaskError> + Send + Sync,
{
    fn process(&self, data: T, ctx: &PipeContext<'_>) -> Result<T, TaskError> {
        (self.0)(data, ctx)
    }
}
