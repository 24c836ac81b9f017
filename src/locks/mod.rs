//! # Locking primitives.
//!
//! - [`FairLock`] - strict FIFO mutual exclusion
//! - [`NamedLock`] - name-keyed gate with bounded-wait force release
//! - [`MonitorLock`] - one reentrant monitor usable sync, async or around a fork-join tree
//! - [`CountingSemaphore`] - N-permit lock with explicit release
//! - [`LockRegistry`] - weakly-referenced name → lock cache
//! - [`RecursiveAction`] - fork-join task tree run by the scheduler's fork-join pool
//!
//! Primitives that can be acquired and released by separate calls implement
//! [`Lock`]; pipes and the registry are generic over it.

mod fair;
mod fork;
mod monitor;
mod named;
mod registry;
mod semaphore;

pub use fair::{FairLock, FairLockGuard};
pub(crate) use fork::run_tree;
pub use fork::{ActionFn, RecursiveAction};
pub use monitor::MonitorLock;
pub use named::NamedLock;
pub use registry::{LockRegistry, SentinelLock};
pub use semaphore::CountingSemaphore;

use crate::error::LockError;

/// Lock with split acquire/release calls.
///
/// `lock` blocks the calling thread. `unlock` may be called from a different
/// thread than `lock` (pipes acquire in one stage and release in a later one).
pub trait Lock: Send + Sync + 'static {
    /// Blocks until the lock (or one permit) is acquired.
    fn lock(&self) -> Result<(), LockError>;

    /// Releases the lock (or one permit).
    fn unlock(&self) -> Result<(), LockError>;
}
