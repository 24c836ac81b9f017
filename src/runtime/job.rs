//! # Job handles.
//!
//! Every accepted submission (task run, closure, future, delayed or periodic
//! schedule) becomes a *job* with a [`JobId`] and a [`JobHandle`] that the
//! caller uses to wait for the result or cancel it.
//!
//! ```text
//! submit(..) ──► JobHandle<T>
//!                  ├─ .await / wait()  → Result<T, TaskError>
//!                  ├─ cancel()         → token cancelled, future dropped at next await
//!                  └─ is_finished()
//! ```
//!
//! Dropping a handle detaches the job; it keeps running.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// Scheduler-wide unique job identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Handle for waiting on (or cancelling) one job.
///
/// Implements [`Future`]; sync callers use [`JobHandle::wait`].
#[must_use = "dropping a JobHandle detaches the job; its result is lost"]
pub struct JobHandle<T> {
    id: JobId,
    name: Arc<str>,
    token: CancellationToken,
    join: JoinHandle<Result<T, TaskError>>,
}

impl<T> JobHandle<T> {
    pub(crate) fn new(
        id: JobId,
        name: Arc<str>,
        token: CancellationToken,
        join: JoinHandle<Result<T, TaskError>>,
    ) -> Self {
        Self {
            id,
            name,
            token,
            join,
        }
    }

    /// Job identifier.
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Name the job was submitted under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Best-effort cancellation.
    ///
    /// Async jobs are dropped at their next await point and resolve to
    /// [`TaskError::Canceled`]; blocking closures that already started run to
    /// completion in the background (still holding their worker permit), but
    /// the handle resolves to `Canceled` right away.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns true once the job has resolved.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Blocks the current thread until the job resolves.
    ///
    /// Must not be called from an async context (it would stall that worker).
    pub fn wait(self) -> Result<T, TaskError> {
        futures::executor::block_on(self)
    }
}

impl<T> Future for JobHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.join).poll(cx) {
            Poll::Ready(Ok(res)) => Poll::Ready(res),
            Poll::Ready(Err(e)) => Poll::Ready(Err(TaskError::from_join(e))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for JobHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("finished", &self.join.is_finished())
            .finish()
    }
}
