//! # Counting semaphore with split acquire/release.
//!
//! [`CountingSemaphore`] bounds how many holders are inside a section at once.
//! Permits are not tied to a guard: [`acquire`](CountingSemaphore::acquire)
//! and [`release`](CountingSemaphore::release) may happen in different
//! pipeline stages or on different threads. Waiters are served in FIFO order.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;

use crate::error::LockError;
use crate::locks::Lock;

/// N-permit semaphore implementing [`Lock`].
#[derive(Debug)]
pub struct CountingSemaphore {
    permits: Semaphore,
    held: AtomicUsize,
    capacity: usize,
}

impl CountingSemaphore {
    /// Creates a semaphore with `permits` permits (at least 1).
    pub fn new(permits: usize) -> Self {
        let capacity = permits.max(1);
        Self {
            permits: Semaphore::new(capacity),
            held: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Blocks the calling thread until a permit is available.
    ///
    /// Returns [`LockError::Closed`] once the semaphore was closed.
    pub fn acquire(&self) -> Result<(), LockError> {
        let permit = futures::executor::block_on(self.permits.acquire())
            .map_err(|_| LockError::Closed)?;
        permit.forget();
        self.held.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Takes a permit if one is free right now.
    pub fn try_acquire(&self) -> bool {
        match self.permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.held.fetch_add(1, Ordering::AcqRel);
                true
            }
            Err(_) => false,
        }
    }

    /// Returns one permit.
    ///
    /// Returns [`LockError::NotHeld`] if no permit is currently taken.
    pub fn release(&self) -> Result<(), LockError> {
        self.held
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |held| held.checked_sub(1))
            .map_err(|_| LockError::NotHeld)?;
        self.permits.add_permits(1);
        Ok(())
    }

    /// Wakes every waiter with [`LockError::Closed`] and refuses further acquisitions.
    pub fn close(&self) {
        self.permits.close();
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Permits currently taken.
    pub fn held(&self) -> usize {
        self.held.load(Ordering::Acquire)
    }

    /// Total number of permits.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for CountingSemaphore {
    /// A binary semaphore.
    fn default() -> Self {
        Self::new(1)
    }
}

impl Lock for CountingSemaphore {
    fn lock(&self) -> Result<(), LockError> {
        self.acquire()
    }

    fn unlock(&self) -> Result<(), LockError> {
        self.release()
    }
}
