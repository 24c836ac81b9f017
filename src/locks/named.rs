//! # Name-keyed critical-section gate.
//!
//! A [`NamedLock`] admits every caller presenting the *held* name and excludes
//! callers presenting any other name. It is a named critical section, not a
//! per-identity mutex.
//!
//! ```text
//! acquire(name):
//!   loop {
//!     unheld or force_release  → holder = name, count = 1, force_release = false
//!     holder == name           → count += 1
//!     waited > max_wait        → force_release = true   (next poll of anyone seizes)
//!     wait ≤ wait_time (release notifies)
//!   }
//! release(name): count ≤ 1 → unheld, else count -= 1
//! ```
//!
//! ## Fairness inversion
//! Once a caller of a different name has waited longer than `max_wait`, the
//! lock is flagged for force release and the very next contender takes it
//! regardless of the holder's remaining count. That contender may be a
//! newcomer (even one presenting the held name) rather than the long waiter. Holders must
//! treat this as a weaker-than-mutex guarantee. Every forced seizure is
//! logged with `warn!`.
//!
//! ## Release is not checked
//! `release` does not verify that `name` is the holder, and any caller
//! presenting the held name may re-enter. Cooperating flows sharing one name
//! rely on this.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::error::{SchedulerError, TaskError};
use crate::locks::RecursiveAction;
use crate::runtime::{JobHandle, NamedLockConfig, SchedulerHandle};

#[derive(Debug, Default)]
struct State {
    holder: Option<String>,
    count: usize,
    waiting_since: HashMap<ThreadId, Instant>,
    force_release: bool,
}

/// Name-keyed lock with bounded-wait force release.
#[derive(Debug, Default)]
pub struct NamedLock {
    state: Mutex<State>,
    released: Condvar,
    cfg: NamedLockConfig,
}

impl NamedLock {
    /// Creates an unheld lock with the given timing.
    pub fn new(cfg: NamedLockConfig) -> Self {
        Self {
            state: Mutex::new(State::default()),
            released: Condvar::new(),
            cfg,
        }
    }

    /// Blocks until the lock is held under `name`.
    pub fn acquire(&self, name: &str) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        loop {
            if state.holder.is_none() || state.force_release {
                if let Some(prev) = state.holder.take() {
                    tracing::warn!(
                        previous = %prev,
                        count = state.count,
                        name,
                        "named lock force-released after max wait"
                    );
                }
                state.holder = Some(name.to_string());
                state.count = 1;
                state.force_release = false;
                state.waiting_since.remove(&me);
                return;
            }

            if state.holder.as_deref() == Some(name) {
                state.count += 1;
                state.waiting_since.remove(&me);
                return;
            }

            let since = *state.waiting_since.entry(me).or_insert_with(Instant::now);
            if since.elapsed() > self.cfg.max_wait && !state.force_release {
                state.force_release = true;
                tracing::debug!(name, waited = ?since.elapsed(), "named lock flagged for force release");
            }
            self.released.wait_for(&mut state, self.cfg.wait_time);
        }
    }

    /// Decrements the hold count; at zero the lock becomes unheld.
    ///
    /// The name is not checked against the holder.
    pub fn release(&self, name: &str) {
        let mut state = self.state.lock();
        if state.count <= 1 {
            state.count = 0;
            state.holder = None;
        } else {
            state.count -= 1;
        }
        tracing::trace!(name, remaining = state.count, "named lock released");
        drop(state);
        self.released.notify_all();
    }

    /// Runs `f` while holding the lock under `name`; releases even if `f` panics.
    pub fn with_lock<R>(&self, name: &str, f: impl FnOnce() -> R) -> R {
        self.acquire(name);
        let _release = Release { lock: self, name };
        f()
    }

    /// Submits `f` as a job that runs under the lock.
    ///
    /// The lock is acquired on the job's blocking thread, not by the caller.
    pub fn lock_future<T, F>(
        self: &Arc<Self>,
        scheduler: &SchedulerHandle,
        name: &str,
        f: F,
    ) -> Result<JobHandle<T>, SchedulerError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, TaskError> + Send + 'static,
    {
        let lock = Arc::clone(self);
        let section = name.to_string();
        scheduler.submit_fn(format!("named-lock:{name}"), move || {
            lock.with_lock(&section, f)
        })
    }

    /// Runs a fork-join tree while the lock is held under `name` for the whole tree.
    pub fn lock_recursive_action(
        &self,
        scheduler: &SchedulerHandle,
        name: &str,
        action: Box<dyn RecursiveAction>,
    ) -> Result<(), TaskError> {
        self.with_lock(name, || scheduler.invoke(action))
    }

    /// Submits [`lock_recursive_action`](Self::lock_recursive_action) as a job.
    pub fn lock_recursive_future_action(
        self: &Arc<Self>,
        scheduler: &SchedulerHandle,
        name: &str,
        action: Box<dyn RecursiveAction>,
    ) -> Result<JobHandle<()>, SchedulerError> {
        let lock = Arc::clone(self);
        let section = name.to_string();
        let handle = scheduler.clone();
        scheduler.submit_fn(format!("named-lock:{name}"), move || {
            lock.lock_recursive_action(&handle, &section, action)
        })
    }

    /// Current holder name.
    pub fn holder(&self) -> Option<String> {
        self.state.lock().holder.clone()
    }

    /// Current hold count (0 when unheld).
    pub fn count(&self) -> usize {
        self.state.lock().count
    }

    /// True while a long-waiting caller is about to seize the lock.
    pub fn is_force_release(&self) -> bool {
        self.state.lock().force_release
    }
}

struct Release<'a> {
    lock: &'a NamedLock,
    name: &'a str,
}

impl Drop for Release<'_> {
    fn drop(&mut self) {
        self.lock.release(self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn test_same_name_enters_concurrently() {
        let lock = Arc::new(NamedLock::default());
        lock.acquire("ingest");

        let other = Arc::clone(&lock);
        thread::spawn(move || other.acquire("ingest")).join().unwrap();
        assert_eq!(lock.count(), 2);
        assert_eq!(lock.holder().as_deref(), Some("ingest"));

        lock.release("ingest");
        assert_eq!(lock.count(), 1);
        lock.release("ingest");
        assert_eq!(lock.holder(), None);
    }

    #[test]
    fn test_different_name_waits_for_release() {
        let lock = Arc::new(NamedLock::default());
        lock.acquire("a");

        let entered = Arc::new(AtomicBool::new(false));
        let waiter = {
            let (lock, entered) = (Arc::clone(&lock), Arc::clone(&entered));
            thread::spawn(move || {
                lock.acquire("b");
                entered.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!entered.load(Ordering::SeqCst));

        lock.release("a");
        waiter.join().unwrap();
        assert!(entered.load(Ordering::SeqCst));
        assert_eq!(lock.holder().as_deref(), Some("b"));
    }

    #[test]
    fn test_force_release_after_max_wait() {
        let lock = Arc::new(NamedLock::new(NamedLockConfig {
            wait_time: Duration::from_millis(10),
            max_wait: Duration::from_millis(200),
        }));
        lock.acquire("a");
        lock.acquire("a");

        let other = Arc::clone(&lock);
        let waited = thread::spawn(move || {
            let started = Instant::now();
            other.acquire("b");
            started.elapsed()
        })
        .join()
        .unwrap();

        assert!(waited >= Duration::from_millis(190), "seized too early: {waited:?}");
        assert!(waited < Duration::from_millis(600), "seized too late: {waited:?}");
        assert_eq!(lock.holder().as_deref(), Some("b"));
        assert_eq!(lock.count(), 1);
        assert!(!lock.is_force_release());
    }

    #[test]
    fn test_force_release_lets_next_contender_seize() {
        let lock = Arc::new(NamedLock::new(NamedLockConfig {
            wait_time: Duration::from_millis(300),
            max_wait: Duration::from_millis(100),
        }));
        lock.acquire("a");
        lock.acquire("a");

        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || lock.acquire("b"))
        };

        let deadline = Instant::now() + Duration::from_secs(2);
        while !lock.is_force_release() {
            assert!(Instant::now() < deadline, "force release never flagged");
            thread::sleep(Duration::from_millis(1));
        }

        // Same name, but the flag makes this a seizure rather than a reentry.
        lock.acquire("a");
        assert_eq!(lock.holder().as_deref(), Some("a"));
        assert_eq!(lock.count(), 1);
        assert!(!lock.is_force_release());

        // The long waiter flags again on its next poll and then takes over.
        waiter.join().unwrap();
        assert_eq!(lock.holder().as_deref(), Some("b"));
        assert_eq!(lock.count(), 1);
    }

    #[test]
    fn test_release_does_not_check_name() {
        let lock = NamedLock::default();
        lock.acquire("owner");
        lock.release("stranger");
        assert_eq!(lock.holder(), None);
        assert_eq!(lock.count(), 0);
    }

    #[test]
    fn test_with_lock_releases_on_panic() {
        let lock = NamedLock::default();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            lock.with_lock("section", || panic!("inside"))
        }));
        assert!(res.is_err());
        assert_eq!(lock.holder(), None);
    }

    #[test]
    fn test_lock_future_runs_under_lock() {
        let scheduler = crate::runtime::test_scheduler(2);
        let lock = Arc::new(NamedLock::default());

        let reader = Arc::clone(&lock);
        let job = lock
            .lock_future(&scheduler, "report", move || Ok(reader.holder()))
            .unwrap();
        assert_eq!(job.wait().unwrap().as_deref(), Some("report"));
        assert_eq!(lock.holder(), None);
    }
}
