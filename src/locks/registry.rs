//! # Weakly-referenced lock registry.
//!
//! [`LockRegistry`] is the single place named locks are minted, so two
//! components asking for the same name share one lock. Entries are held
//! weakly: once no caller keeps the `Arc`, the lock is reclaimed and the next
//! lookup creates a fresh instance. Callers relying on identity must keep
//! their own strong reference. Dead entries are swept whenever the map has
//! doubled since the last sweep, so one-off names do not accumulate.
//!
//! ```text
//! get_lock_as::<L>(name)
//!   ├─ live entry of type L      → same Arc
//!   ├─ live entry of other type  → Err(TypeMismatch)
//!   └─ missing or reclaimed      → L::default(), stored weakly
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};

use crate::error::LockError;
use crate::locks::Lock;

/// Default lock type of the registry.
///
/// Only usable through [`synchronized`](SentinelLock::synchronized); the
/// [`Lock`] methods always fail with [`LockError::Misuse`].
#[derive(Debug, Default)]
pub struct SentinelLock {
    monitor: ReentrantMutex<()>,
}

impl SentinelLock {
    /// Runs `f` while holding this lock (reentrant).
    pub fn synchronized<R>(&self, f: impl FnOnce() -> R) -> R {
        let _held = self.monitor.lock();
        f()
    }
}

impl Lock for SentinelLock {
    fn lock(&self) -> Result<(), LockError> {
        Err(LockError::Misuse {
            lock: "SentinelLock",
        })
    }

    fn unlock(&self) -> Result<(), LockError> {
        Err(LockError::Misuse {
            lock: "SentinelLock",
        })
    }
}

/// Smallest map size that triggers a sweep of dead entries.
const SWEEP_FLOOR: usize = 64;

struct Entries {
    map: HashMap<String, Weak<dyn Any + Send + Sync>>,
    sweep_at: usize,
}

impl Default for Entries {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            sweep_at: SWEEP_FLOOR,
        }
    }
}

impl Entries {
    fn sweep(&mut self) {
        self.map.retain(|_, weak| weak.strong_count() > 0);
        self.sweep_at = (self.map.len() * 2).max(SWEEP_FLOOR);
    }
}

/// Name → lock cache with weak values.
#[derive(Default)]
pub struct LockRegistry {
    locks: Mutex<Entries>,
}

impl LockRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the [`SentinelLock`] registered under `name`, creating it if needed.
    pub fn get_lock(&self, name: &str) -> Result<Arc<SentinelLock>, LockError> {
        self.get_lock_as::<SentinelLock>(name)
    }

    /// Returns the lock of type `L` registered under `name`, creating it if needed.
    ///
    /// # Example
    /// ```
    /// use std::sync::Arc;
    /// use pipevisor::{FairLock, LockRegistry};
    ///
    /// let registry = LockRegistry::new();
    /// let a = registry.get_lock_as::<FairLock>("db").unwrap();
    /// let b = registry.get_lock_as::<FairLock>("db").unwrap();
    /// assert!(Arc::ptr_eq(&a, &b));
    /// ```
    pub fn get_lock_as<L: Lock + Default>(&self, name: &str) -> Result<Arc<L>, LockError> {
        let mut locks = self.locks.lock();
        if let Some(live) = locks.map.get(name).and_then(Weak::upgrade) {
            return live.downcast::<L>().map_err(|_| LockError::TypeMismatch {
                name: name.to_string(),
            });
        }

        if locks.map.len() >= locks.sweep_at {
            locks.sweep();
        }
        let lock = Arc::new(L::default());
        let erased: Arc<dyn Any + Send + Sync> = lock.clone();
        locks.map.insert(name.to_string(), Arc::downgrade(&erased));
        tracing::trace!(name, kind = std::any::type_name::<L>(), "lock created");
        Ok(lock)
    }

    /// Number of entries whose lock is still referenced.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .map
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// True when no registered lock is referenced anymore.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops entries whose lock was reclaimed.
    pub fn purge(&self) {
        self.locks.lock().sweep();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locks::{CountingSemaphore, FairLock};

    #[test]
    fn test_same_name_shares_instance() {
        let registry = LockRegistry::new();
        let a = registry.get_lock("orders").unwrap();
        let b = registry.get_lock("orders").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unreferenced_lock_is_reclaimed() {
        let registry = LockRegistry::new();
        let first = registry.get_lock_as::<FairLock>("cache").unwrap();
        let old = Arc::downgrade(&first);
        drop(first);

        assert!(old.upgrade().is_none());
        assert!(registry.is_empty());

        let fresh = registry.get_lock_as::<FairLock>("cache").unwrap();
        assert!(!std::ptr::eq(old.as_ptr(), Arc::as_ptr(&fresh)));
    }

    #[test]
    fn test_sentinel_rejects_direct_use() {
        let registry = LockRegistry::new();
        let sentinel = registry.get_lock("jobs").unwrap();
        assert_eq!(
            Lock::lock(&*sentinel),
            Err(LockError::Misuse {
                lock: "SentinelLock"
            })
        );
        assert!(matches!(Lock::unlock(&*sentinel), Err(LockError::Misuse { .. })));
        assert_eq!(sentinel.synchronized(|| sentinel.synchronized(|| 3)), 3);
    }

    #[test]
    fn test_live_name_with_other_type_is_rejected() {
        let registry = LockRegistry::new();
        let _fair = registry.get_lock_as::<FairLock>("shared").unwrap();
        let err = registry
            .get_lock_as::<CountingSemaphore>("shared")
            .unwrap_err();
        assert_eq!(
            err,
            LockError::TypeMismatch {
                name: "shared".to_string()
            }
        );
    }

    #[test]
    fn test_purge_drops_dead_entries() {
        let registry = LockRegistry::new();
        drop(registry.get_lock("a").unwrap());
        let _b = registry.get_lock("b").unwrap();

        registry.purge();
        assert_eq!(registry.locks.lock().map.len(), 1);
    }

    #[test]
    fn test_one_off_names_do_not_accumulate() {
        let registry = LockRegistry::new();
        let kept: Vec<_> = (0..10)
            .map(|i| registry.get_lock(&format!("kept-{i}")).unwrap())
            .collect();

        for i in 0..10_000 {
            drop(registry.get_lock(&format!("flow-{i}")).unwrap());
        }

        assert_eq!(registry.len(), kept.len());
        assert!(registry.locks.lock().map.len() <= SWEEP_FLOOR);
        for (i, lock) in kept.iter().enumerate() {
            let again = registry.get_lock(&format!("kept-{i}")).unwrap();
            assert!(Arc::ptr_eq(lock, &again));
        }
    }
}
