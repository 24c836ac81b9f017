//! # Scheduler event bus.
//!
//! One [`Bus`] per scheduler. Every component that changes the state of a
//! job, schedule or service publishes onto it; a single listener on the
//! worker runtime forwards to the [`SubscriberSet`](crate::SubscriberSet).
//!
//! | Publisher                       | Kinds                                                    |
//! |---------------------------------|----------------------------------------------------------|
//! | admission (`submit*`, `schedule*`) | `TaskSubmitted`, `TaskRejected`, `ScheduleRegistered` |
//! | worker-pool job wrapper         | `TaskStarting`, `TaskStopped`, `TaskFailed`               |
//! | task runner                     | `ChildrenSubmitted`                                       |
//! | timer driver                    | `TaskStarting`, `ScheduleSuppressed`                      |
//! | service threads                 | `ServiceStarted`, `ServiceStopped`, `ServiceFailed`      |
//! | `restart_service`               | `ServiceRestarting`                                       |
//! | `shutdown` / `terminated`       | `ShutdownRequested`, `AllStoppedWithin`, `GraceExceeded` |
//! | subscriber workers              | `SubscriberOverflow`, `SubscriberPanicked`                |
//!
//! `publish` is a plain `broadcast::Sender::send`, so service threads and
//! blocking closures publish without entering a runtime. The ring buffer
//! holds `SchedulerConfig::bus_capacity` events; a listener that falls behind
//! skips the oldest ones (`RecvError::Lagged`) instead of stalling a job.

use tokio::sync::broadcast;

use super::event::Event;

/// Fire-and-forget broadcast of scheduler events; clones share one channel.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes an event; dropped when nobody is listening.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_subscriber_sees_events_after_subscribe() {
        let bus = Bus::new(8);
        bus.publish(Event::new(EventKind::TaskSubmitted));

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::TaskStarting).with_task("a"));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::TaskStarting);
        assert_eq!(ev.task.as_deref(), Some("a"));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::ShutdownRequested));
    }
}
