//! # Synchronization pipes.
//!
//! - [`Pipe`], [`PipeContext`], [`FnPipe`] - stage contract
//! - [`LockPipe`], [`UnlockPipe`] - acquire/release pair over a shared [`Lock`](crate::Lock)
//! - [`mutex_pipes`], [`semaphore_pipes`], [`lock_pair`] - pair constructors
//! - [`Pipeline`] - ordered stages, run sequentially or as parallel flows

mod lock_pipes;
mod pipe;
mod pipeline;

pub use lock_pipes::{LockPipe, UnlockPipe, lock_pair, mutex_pipes, semaphore_pipes};
pub use pipe::{FnPipe, Pipe, PipeContext};
pub use pipeline::Pipeline;
