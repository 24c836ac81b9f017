//! # Strictly ordered mutual exclusion.
//!
//! [`FairLock`] grants the lock in arrival order: the longest-waiting thread
//! acquires next, never a newcomer.
//!
//! ```text
//! lock():   enqueue self ─► loop { head && CAS(held false→true) ? dequeue, return : park }
//! unlock(): held = false ─► unpark head
//! ```
//!
//! ## Rules
//! - At most one holder at any time.
//! - A thread only takes the lock from the head of the queue, so barging is impossible.
//! - Spurious unparks are absorbed by re-checking the head/held condition.
//! - The holder is not tracked; `unlock` may run on another thread (pipes rely on this).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, Thread};

use parking_lot::Mutex;

use crate::error::LockError;
use crate::locks::Lock;

/// FIFO mutual-exclusion lock.
#[derive(Debug, Default)]
pub struct FairLock {
    held: AtomicBool,
    waiters: Mutex<VecDeque<Thread>>,
}

impl FairLock {
    /// Creates an unheld lock with an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until this thread reaches the head of the queue and takes the lock.
    pub fn lock(&self) {
        let me = thread::current();
        let id = me.id();
        self.waiters.lock().push_back(me);

        loop {
            {
                let mut waiters = self.waiters.lock();
                let at_head = waiters.front().is_some_and(|t| t.id() == id);
                if at_head
                    && self
                        .held
                        .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                        .is_ok()
                {
                    waiters.pop_front();
                    return;
                }
            }
            thread::park();
        }
    }

    /// Takes the lock only if it is free and nobody is queued.
    pub fn try_lock(&self) -> bool {
        let waiters = self.waiters.lock();
        waiters.is_empty()
            && self
                .held
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
    }

    /// Releases the lock and wakes the head of the queue.
    ///
    /// Returns [`LockError::NotHeld`] if the lock was not held.
    pub fn unlock(&self) -> Result<(), LockError> {
        if !self.held.swap(false, Ordering::Release) {
            return Err(LockError::NotHeld);
        }
        if let Some(head) = self.waiters.lock().front() {
            head.unpark();
        }
        Ok(())
    }

    /// Acquires the lock and returns a guard that releases it on drop.
    pub fn guard(&self) -> FairLockGuard<'_> {
        self.lock();
        FairLockGuard { lock: self }
    }

    /// Number of threads currently queued.
    pub fn queue_len(&self) -> usize {
        self.waiters.lock().len()
    }

    /// True while some thread holds the lock.
    pub fn is_locked(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

impl Lock for FairLock {
    fn lock(&self) -> Result<(), LockError> {
        FairLock::lock(self);
        Ok(())
    }

    fn unlock(&self) -> Result<(), LockError> {
        FairLock::unlock(self)
    }
}

/// RAII guard of a [`FairLock`].
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct FairLockGuard<'a> {
    lock: &'a FairLock,
}

impl Drop for FairLockGuard<'_> {
    fn drop(&mut self) {
        let _ = self.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    fn wait_for_queue(lock: &FairLock, len: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while lock.queue_len() < len {
            assert!(Instant::now() < deadline, "waiters never enqueued");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_acquires_in_arrival_order() {
        let lock = Arc::new(FairLock::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        lock.lock();
        let mut handles = Vec::new();
        for i in 0..8 {
            let waiter = Arc::clone(&lock);
            let order = Arc::clone(&order);
            handles.push(thread::spawn(move || {
                waiter.lock();
                order.lock().push(i);
                waiter.unlock().unwrap();
            }));
            // Enroll one thread at a time so the arrival order is known.
            wait_for_queue(&lock, i + 1);
        }

        lock.unlock().unwrap();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*order.lock(), (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_never_two_holders() {
        let lock = Arc::new(FairLock::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let (lock, inside, peak) = (Arc::clone(&lock), Arc::clone(&inside), Arc::clone(&peak));
                thread::spawn(move || {
                    for _ in 0..200 {
                        let _g = lock.guard();
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(!lock.is_locked());
        assert_eq!(lock.queue_len(), 0);
    }

    #[test]
    fn test_unlock_without_holder_fails() {
        let lock = FairLock::new();
        assert_eq!(lock.unlock(), Err(LockError::NotHeld));
    }

    #[test]
    fn test_try_lock_respects_queue() {
        let lock = Arc::new(FairLock::new());
        assert!(lock.try_lock());
        assert!(!lock.try_lock());

        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                lock.lock();
                lock.unlock().unwrap();
            })
        };
        wait_for_queue(&lock, 1);

        assert!(!lock.try_lock());

        lock.unlock().unwrap();
        waiter.join().unwrap();
        assert!(lock.try_lock());
    }

    #[test]
    fn test_unlock_from_another_thread() {
        let lock = Arc::new(FairLock::new());
        lock.lock();
        let other = Arc::clone(&lock);
        thread::spawn(move || other.unlock().unwrap()).join().unwrap();
        assert!(!lock.is_locked());
    }
}
