//! # Task abstractions.
//!
//! This module provides the core task-related types:
//! - [`Task`] - trait with pre/process/post hooks
//! - [`TaskFn`] - function-backed leaf task
//! - [`TaskRef`] - shared reference to a task (`Arc<dyn Task>`)
//! - [`TaskContext`] - per-run child queue, token and scheduler handle
//! - [`Service`], [`ServiceControl`] - long-running services on dedicated threads

mod context;
mod service;
mod task;
mod task_fn;

pub use context::TaskContext;
pub(crate) use service::ServiceTask;
pub use service::{Service, ServiceControl};
pub use task::{Task, TaskRef};
pub use task_fn::TaskFn;
