//! # Subscriber contract.
//!
//! A [`Subscribe`] implementation observes scheduler events (job lifecycle,
//! schedule suppression, service transitions, termination). The
//! [`SubscriberSet`](crate::SubscriberSet) gives each subscriber its own queue
//! and worker, so a slow one only drops its own events (reported as
//! `SubscriberOverflow`) and a panicking one only loses the event it panicked
//! on.
//!
//! [`Subscribe::accepts`] filters by kind before an event is queued, so a
//! subscriber interested in failures never fills its queue with
//! `TaskSubmitted` noise.
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use async_trait::async_trait;
//! use pipevisor::{Event, EventKind, Subscribe};
//!
//! /// Counts schedules that stopped because a run failed.
//! struct SuppressedSchedules(AtomicUsize);
//!
//! #[async_trait]
//! impl Subscribe for SuppressedSchedules {
//!     async fn on_event(&self, _ev: &Event) {
//!         self.0.fetch_add(1, Ordering::Relaxed);
//!     }
//!     fn name(&self) -> &'static str { "suppressed-schedules" }
//!     fn accepts(&self, kind: EventKind) -> bool { kind == EventKind::ScheduleSuppressed }
//! }
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};

/// Scheduler event observer.
///
/// `on_event` runs on the subscriber's worker task on the scheduler's worker
/// runtime; it should not block.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow and panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Capacity of this subscriber's queue (minimum 1).
    fn queue_capacity(&self) -> usize {
        1024
    }

    /// Whether events of `kind` should be queued for this subscriber at all.
    fn accepts(&self, _kind: EventKind) -> bool {
        true
    }
}
