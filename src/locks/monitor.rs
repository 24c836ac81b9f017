//! # Single-monitor exclusive execution.
//!
//! Every entry point of a [`MonitorLock`] funnels through one reentrant
//! monitor. The recursive variants hold it for the lifetime of the whole
//! fork-join tree, so the tree is exclusive with every other user of the
//! monitor even though its nodes run in parallel on the fork-join pool.
//!
//! Nodes of a tree run on pool threads; they must not enter the same monitor
//! themselves (the monitor is owned by the thread that started the tree).

use std::sync::Arc;

use parking_lot::ReentrantMutex;

use crate::error::{SchedulerError, TaskError};
use crate::locks::RecursiveAction;
use crate::runtime::{JobHandle, SchedulerHandle};

/// Exclusive-execution helper; clones share the same monitor.
#[derive(Clone, Default)]
pub struct MonitorLock {
    monitor: Arc<ReentrantMutex<()>>,
}

impl MonitorLock {
    /// Creates a lock with a fresh monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` on the calling thread under the monitor.
    ///
    /// Reentrant: `f` may call `lock` again on the same thread.
    pub fn lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _held = self.monitor.lock();
        f()
    }

    /// Submits `f` as a job that takes the monitor before running.
    pub fn lock_future<T, F>(
        &self,
        scheduler: &SchedulerHandle,
        f: F,
    ) -> Result<JobHandle<T>, SchedulerError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, TaskError> + Send + 'static,
    {
        let lock = self.clone();
        scheduler.submit_fn("monitor-lock", move || lock.lock(f))
    }

    /// Runs a fork-join tree while holding the monitor; blocks until the tree settled.
    pub fn lock_recursive_action(
        &self,
        scheduler: &SchedulerHandle,
        action: Box<dyn RecursiveAction>,
    ) -> Result<(), TaskError> {
        self.lock(|| scheduler.invoke(action))
    }

    /// Submits [`lock_recursive_action`](Self::lock_recursive_action) as a job.
    pub fn lock_recursive_future_action(
        &self,
        scheduler: &SchedulerHandle,
        action: Box<dyn RecursiveAction>,
    ) -> Result<JobHandle<()>, SchedulerError> {
        let lock = self.clone();
        let handle = scheduler.clone();
        scheduler.submit_fn("monitor-lock", move || {
            lock.lock_recursive_action(&handle, action)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locks::ActionFn;
    use crate::runtime::test_scheduler;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_sync_callers_are_exclusive() {
        let lock = MonitorLock::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let (lock, inside, peak) = (lock.clone(), Arc::clone(&inside), Arc::clone(&peak));
                thread::spawn(move || {
                    for _ in 0..50 {
                        lock.lock(|| {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            inside.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lock_is_reentrant() {
        let lock = MonitorLock::new();
        let v = lock.lock(|| lock.lock(|| 7));
        assert_eq!(v, 7);
    }

    #[test]
    fn test_lock_future_returns_result() {
        let scheduler = test_scheduler(2);
        let lock = MonitorLock::new();
        let job = lock.lock_future(&scheduler, || Ok("done")).unwrap();
        assert_eq!(job.wait().unwrap(), "done");
    }

    #[test]
    fn test_recursive_action_holds_monitor_for_whole_tree() {
        let scheduler = test_scheduler(2);
        let lock = MonitorLock::new();
        let tree_started = Arc::new(AtomicBool::new(false));
        let leaves = Arc::new(AtomicUsize::new(0));

        let root = {
            let (tree_started, leaves) = (Arc::clone(&tree_started), Arc::clone(&leaves));
            ActionFn::boxed(move || {
                tree_started.store(true, Ordering::SeqCst);
                let children = (0..4)
                    .map(|_| {
                        let leaves = Arc::clone(&leaves);
                        ActionFn::boxed(move || {
                            thread::sleep(Duration::from_millis(30));
                            leaves.fetch_add(1, Ordering::SeqCst);
                            Ok(Vec::new())
                        })
                    })
                    .collect();
                Ok(children)
            })
        };

        let job = lock.lock_recursive_future_action(&scheduler, root).unwrap();
        while !tree_started.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }

        // The monitor is only free again once every leaf finished.
        let seen_leaves = lock.lock(|| leaves.load(Ordering::SeqCst));
        job.wait().unwrap();
        assert_eq!(seen_leaves, 4);
    }
}
