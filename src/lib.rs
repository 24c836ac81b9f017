//! # pipevisor
//!
//! **Pipevisor** is a bounded-pool task scheduler with a small family of lock
//! primitives meant to be dropped between the stages of a pipeline.
//!
//! It runs hierarchical tasks (a task may queue children that are submitted
//! after it finishes), delayed and periodic schedules, long-running services
//! on dedicated threads and fork-join task trees, and provides fair, named
//! and monitor locks plus lock/unlock pipe pairs built on top of them.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  submit / submit_fn / schedule*      create_service         invoke
//!        │                                   │                    │
//!        ▼                                   ▼                    ▼
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │ TaskScheduler (owner) / SchedulerHandle (cloneable front-end)         │
//! │  - admission (shutdown flag, queue limit, pending/running maps)       │
//! │  - Bus (broadcast events) ──► listener ──► SubscriberSet              │
//! └──────┬──────────────────────┬──────────────────────┬──────────────────┘
//!        ▼                      ▼                      ▼
//!  ┌────────────┐        ┌─────────────┐        ┌──────────────┐  ┌───────────┐
//!  │  workers   │◄───────│   timers    │        │   services   │  │ fork-join │
//!  │ pool_size  │ submit │ (1 thread)  │        │ (1 thread    │  │  (rayon)  │
//!  │ permits    │        │ rate/delay  │        │  per service)│  │           │
//!  └─────┬──────┘        └─────────────┘        └──────────────┘  └───────────┘
//!        ▼
//!  pre ─► process ─► submit children ─► post
//! ```
//!
//! ### Pipes
//! ```text
//! item ─► [stage] ─► [LockPipe] ─► [stage] ─► [UnlockPipe] ─► [stage] ─► result
//!                        │                          │
//!                        └──── shared FairLock / CountingSemaphore ────┘
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                               |
//! |-------------------|--------------------------------------------------------------|--------------------------------------------------|
//! | **Scheduling**    | Bounded worker pool, delays, fixed-rate and fixed-delay runs | [`TaskScheduler`], [`SchedulerHandle`]           |
//! | **Tasks**         | Pre/process/post hooks with child tasks                      | [`Task`], [`TaskFn`], [`TaskContext`]            |
//! | **Services**      | Restartable long-running loops on named threads              | [`Service`], [`ServiceControl`]                  |
//! | **Locks**         | FIFO, name-keyed, reentrant monitor, counting semaphore      | [`FairLock`], [`NamedLock`], [`MonitorLock`]     |
//! | **Registry**      | Weakly-held name → lock cache                                | [`LockRegistry`]                                 |
//! | **Pipes**         | Guarded sections inside sequential or parallel pipelines     | [`Pipe`], [`Pipeline`], [`LockPipe`]             |
//! | **Subscriber API**| Hook into job, schedule and service events                   | [`Subscribe`], [`Event`]                         |
//! | **Errors**        | Typed errors for scheduling, execution and lock misuse       | [`SchedulerError`], [`TaskError`], [`LockError`] |
//!
//! ## Optional features
//! - `logging`: exports the [`LogWriter`] subscriber (on by default).
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use pipevisor::{
//!     FnPipe, PipeContext, Pipeline, SchedulerBuilder, SchedulerConfig, TaskFn, TaskRef,
//!     semaphore_pipes,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = SchedulerConfig::default();
//!     cfg.grace = Duration::from_secs(5);
//!
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn pipevisor::Subscribe>> = vec![Arc::new(pipevisor::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn pipevisor::Subscribe>> = Vec::new();
//!
//!     let scheduler = SchedulerBuilder::new(cfg).with_subscribers(subs).build()?;
//!
//!     let hello: TaskRef = TaskFn::arc("hello", |_token: CancellationToken| async move {
//!         println!("hello from the pool");
//!         Ok(())
//!     });
//!     scheduler.submit(hello)?.wait()?;
//!
//!     // At most two flows inside the guarded stage at once.
//!     let (enter, leave) = semaphore_pipes(2);
//!     let pipeline = Arc::new(
//!         Pipeline::new("double")
//!             .stage(enter)
//!             .stage(FnPipe::new(|n: u64, _: &PipeContext<'_>| Ok(n * 2)))
//!             .stage(leave),
//!     );
//!     for (i, job) in pipeline.run_parallel(&scheduler, (0..8).collect())?.into_iter().enumerate() {
//!         assert_eq!(job.wait()?, i as u64 * 2);
//!     }
//!
//!     scheduler.shutdown();
//!     scheduler.await_termination(Duration::from_secs(5))?;
//!     Ok(())
//! }
//! ```
mod error;
mod events;
mod locks;
mod pipes;
mod runtime;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use error::{LockError, SchedulerError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use locks::{
    ActionFn, CountingSemaphore, FairLock, FairLockGuard, Lock, LockRegistry, MonitorLock,
    NamedLock, RecursiveAction, SentinelLock,
};
pub use pipes::{
    FnPipe, LockPipe, Pipe, PipeContext, Pipeline, UnlockPipe, lock_pair, mutex_pipes,
    semaphore_pipes,
};
pub use runtime::{
    JobHandle, JobId, NamedLockConfig, SchedulerBuilder, SchedulerConfig, SchedulerHandle,
    TaskScheduler, wait_for_shutdown_signal,
};
pub use subscribers::{Subscribe, SubscriberSet};
pub use tasks::{Service, ServiceControl, Task, TaskContext, TaskFn, TaskRef};

// Optional: expose the built-in logger subscriber.
// Enable with: `--features logging` (default)
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
