//! # Scheduler and lock configuration.
//!
//! Provides [`SchedulerConfig`] (pool sizing, queue bound, event bus, shutdown grace)
//! and [`NamedLockConfig`] (poll interval and max wait of a [`NamedLock`](crate::NamedLock)).
//!
//! ## Sentinel values
//! - `multiplier = 0` → treated as `1`
//! - `max_queued = 0` → unbounded queue (no `queue_full` rejections)
//! - `bus_capacity = 0` → clamped to `1`

use std::time::Duration;

/// Configuration for a [`TaskScheduler`](crate::TaskScheduler).
///
/// ## Pool sizing
/// The worker pool (and the fork-join pool) is sized once at construction:
/// ```text
/// reserved_cores <  cpus  → (cpus - reserved_cores) × multiplier
/// reserved_cores >= cpus  → multiplier
/// ```
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Cores left to the rest of the process (not used by the worker pool).
    pub reserved_cores: usize,

    /// Workers per available core (`0` = `1`).
    pub multiplier: usize,

    /// Maximum number of accepted-but-not-started jobs (`0` = unbounded).
    ///
    /// When reached, further submissions are rejected with
    /// [`SchedulerError::Rejected`](crate::SchedulerError::Rejected) `queue_full`.
    pub max_queued: usize,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Default drain timeout used by [`shutdown_on_signal`](crate::SchedulerHandle::shutdown_on_signal).
    pub grace: Duration,

    /// Prefix for pool thread names (`{prefix}-worker`, `{prefix}-timer`, `{prefix}-fork-N`).
    pub thread_name: String,
}

impl SchedulerConfig {
    /// Computes the worker pool size for this machine.
    #[inline]
    pub fn pool_size(&self) -> usize {
        Self::compute_pool_size(num_cpus::get(), self.reserved_cores, self.multiplier)
    }

    /// Pool size for an explicit core count.
    pub fn compute_pool_size(available: usize, reserved: usize, multiplier: usize) -> usize {
        let multiplier = multiplier.max(1);
        if reserved >= available {
            multiplier
        } else {
            (available - reserved) * multiplier
        }
    }

    /// Returns the queue bound as an `Option` (`None` = unbounded).
    #[inline]
    pub fn queue_limit(&self) -> Option<usize> {
        if self.max_queued == 0 {
            None
        } else {
            Some(self.max_queued)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for SchedulerConfig {
    /// Default configuration:
    ///
    /// - `reserved_cores = 0`, `multiplier = 1` (one worker per core)
    /// - `max_queued = 0` (unbounded)
    /// - `bus_capacity = 1024`
    /// - `grace = 60s`
    /// - `thread_name = "pipevisor"`
    fn default() -> Self {
        Self {
            reserved_cores: 0,
            multiplier: 1,
            max_queued: 0,
            bus_capacity: 1024,
            grace: Duration::from_secs(60),
            thread_name: "pipevisor".to_string(),
        }
    }
}

/// Timing contract of a [`NamedLock`](crate::NamedLock).
///
/// - `wait_time`: poll interval while a different name holds the lock
/// - `max_wait`: cumulative wait after which a caller forces the lock free
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NamedLockConfig {
    /// Poll interval between acquisition attempts.
    pub wait_time: Duration,
    /// Wait after which force-release kicks in.
    pub max_wait: Duration,
}

impl Default for NamedLockConfig {
    /// `wait_time = 10ms`, `max_wait = 30s`.
    fn default() -> Self {
        Self {
            wait_time: Duration::from_millis(10),
            max_wait: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_size_subtracts_reserved_cores() {
        assert_eq!(SchedulerConfig::compute_pool_size(8, 2, 3), 18);
        assert_eq!(SchedulerConfig::compute_pool_size(8, 0, 1), 8);
    }

    #[test]
    fn test_pool_size_falls_back_to_multiplier() {
        assert_eq!(SchedulerConfig::compute_pool_size(4, 4, 3), 3);
        assert_eq!(SchedulerConfig::compute_pool_size(4, 9, 2), 2);
    }

    #[test]
    fn test_zero_multiplier_is_one() {
        assert_eq!(SchedulerConfig::compute_pool_size(4, 1, 0), 3);
        assert_eq!(SchedulerConfig::compute_pool_size(1, 1, 0), 1);
    }

    #[test]
    fn test_sentinels() {
        let mut cfg = SchedulerConfig::default();
        assert_eq!(cfg.queue_limit(), None);
        cfg.max_queued = 5;
        assert_eq!(cfg.queue_limit(), Some(5));
        cfg.bus_capacity = 0;
        assert_eq!(cfg.bus_capacity_clamped(), 1);
        assert!(cfg.pool_size() >= 1);
    }
}
