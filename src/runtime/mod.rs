//! Runtime: scheduler construction, job execution and lifecycle.
//!
//! The public API of this module is [`TaskScheduler`] (owner) and
//! [`SchedulerHandle`] (cloneable front-end), built by [`SchedulerBuilder`].
//!
//! Internal modules:
//! - [`scheduler`]: admission, worker-pool jobs, shutdown and termination;
//! - [`runner`]: the pre/process/children/post protocol of one task run;
//! - [`periodic`]: delayed and periodic schedules on the timer thread;
//! - [`services`]: dedicated service threads;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod builder;
mod config;
mod job;
mod periodic;
mod runner;
mod scheduler;
mod services;
mod shutdown;

pub use builder::SchedulerBuilder;
pub use config::{NamedLockConfig, SchedulerConfig};
pub use job::{JobHandle, JobId};
pub(crate) use runner::run_task;
pub use scheduler::{SchedulerHandle, TaskScheduler};
pub use shutdown::wait_for_shutdown_signal;

#[cfg(test)]
pub(crate) use scheduler::tests::{scheduler as test_scheduler, wait_until};
