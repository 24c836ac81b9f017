//! # Synchronization pipe pairs.
//!
//! A [`LockPipe`] and its matching [`UnlockPipe`] share one [`Lock`]. Data
//! passes through both unchanged; the lock pipe acquires, the unlock pipe
//! releases. Whatever stages sit between them are serialized (with a
//! [`FairLock`], in arrival order) or bounded to N concurrent flows (with an
//! N-permit [`CountingSemaphore`]).
//!
//! ```text
//! flow 1 ─► [LockPipe] ─► stage ─► stage ─► [UnlockPipe] ─►
//! flow 2 ─► [LockPipe] ┄┄ waits ┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄
//! ```

use std::sync::Arc;

use crate::error::TaskError;
use crate::locks::{CountingSemaphore, FairLock, Lock};
use crate::pipes::{Pipe, PipeContext};

/// Stage that acquires the shared lock.
pub struct LockPipe<L> {
    lock: Arc<L>,
}

/// Stage that releases the shared lock.
pub struct UnlockPipe<L> {
    lock: Arc<L>,
}

impl<T, L: Lock> Pipe<T> for LockPipe<L> {
    fn process(&self, data: T, ctx: &PipeContext<'_>) -> Result<T, TaskError> {
        self.lock.lock()?;
        tracing::trace!(pipeline = ctx.pipeline, "entered guarded section");
        Ok(data)
    }
}

impl<T, L: Lock> Pipe<T> for UnlockPipe<L> {
    fn process(&self, data: T, ctx: &PipeContext<'_>) -> Result<T, TaskError> {
        self.lock.unlock()?;
        tracing::trace!(pipeline = ctx.pipeline, "left guarded section");
        Ok(data)
    }
}

impl<L> LockPipe<L> {
    /// The lock shared with the matching [`UnlockPipe`].
    pub fn lock(&self) -> &Arc<L> {
        &self.lock
    }
}

/// Builds a lock/unlock pair over `lock`.
pub fn lock_pair<L: Lock>(lock: Arc<L>) -> (LockPipe<L>, UnlockPipe<L>) {
    (
        LockPipe {
            lock: Arc::clone(&lock),
        },
        UnlockPipe { lock },
    )
}

/// Mutex pipe pair sharing a fresh [`FairLock`].
pub fn mutex_pipes() -> (LockPipe<FairLock>, UnlockPipe<FairLock>) {
    lock_pair(Arc::new(FairLock::new()))
}

/// Semaphore pipe pair sharing a fresh `permits`-permit [`CountingSemaphore`].
pub fn semaphore_pipes(permits: usize) -> (LockPipe<CountingSemaphore>, UnlockPipe<CountingSemaphore>) {
    lock_pair(Arc::new(CountingSemaphore::new(permits)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LockError;
    use crate::locks::LockRegistry;

    #[test]
    fn test_pair_passes_data_through() {
        let (lock, unlock) = mutex_pipes();
        let ctx = PipeContext::sequential("unit");

        let data = lock.process(vec![1, 2, 3], &ctx).unwrap();
        assert!(lock.lock().is_locked());
        let data = unlock.process(data, &ctx).unwrap();
        assert_eq!(data, vec![1, 2, 3]);
        assert!(!lock.lock().is_locked());
    }

    #[test]
    fn test_unbalanced_unlock_fails() {
        let (_lock, unlock) = semaphore_pipes(2);
        let err = unlock
            .process("x", &PipeContext::sequential("unit"))
            .unwrap_err();
        assert!(matches!(err, TaskError::Lock(LockError::NotHeld)));
    }

    #[test]
    fn test_registry_sentinel_cannot_back_a_pipe() {
        let registry = LockRegistry::new();
        let (lock, _unlock) = lock_pair(registry.get_lock("stage").unwrap());
        let err = lock
            .process(0u8, &PipeContext::sequential("unit"))
            .unwrap_err();
        assert_eq!(err.as_label(), "task_lock");
    }
}
