//! # Delayed and periodic schedules.
//!
//! Every schedule is one driver future on the single-thread timer runtime, so
//! runs of one schedule never overlap and never compete with the worker pool.
//!
//! ```text
//! Once            sleep(initial) ─► run
//! FixedRate(p)    tick at initial + n·p ─► run ─► tick ...   (late ticks fire back-to-back)
//! FixedDelay(d)   sleep(initial) ─► run ─► sleep(d) ─► run ...
//! ```
//!
//! ## Rules
//! - A failing (or panicking) periodic run ends its schedule and publishes
//!   `ScheduleSuppressed`; the scheduler and other schedules are unaffected.
//! - The schedule token is checked between runs; an in-flight run is only
//!   aborted by `shutdown_now`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::events::{Event, EventKind};
use crate::runtime::scheduler::JobGuard;
use crate::runtime::{JobId, SchedulerHandle, run_task};
use crate::tasks::TaskRef;

/// How often a scheduled task runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Cadence {
    Once,
    FixedRate(Duration),
    FixedDelay(Duration),
}

impl Cadence {
    pub(crate) fn period(self) -> Option<Duration> {
        match self {
            Cadence::Once => None,
            Cadence::FixedRate(p) | Cadence::FixedDelay(p) => Some(p),
        }
    }
}

/// Drives one schedule until it fails or its token is cancelled.
pub(crate) async fn drive(
    task: TaskRef,
    scheduler: SchedulerHandle,
    id: JobId,
    token: CancellationToken,
    initial_delay: Duration,
    cadence: Cadence,
) -> Result<(), TaskError> {
    let start = Instant::now() + initial_delay;

    match cadence {
        Cadence::Once => {
            sleep_until(start, &token).await?;
            run_once(&task, &scheduler, id, &token).await
        }
        Cadence::FixedRate(period) => {
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(TaskError::Canceled),
                    _ = ticker.tick() => {}
                }
                run_periodic(&task, &scheduler, id, &token).await?;
            }
        }
        Cadence::FixedDelay(delay) => {
            sleep_until(start, &token).await?;
            loop {
                run_periodic(&task, &scheduler, id, &token).await?;
                sleep_until(Instant::now() + delay, &token).await?;
            }
        }
    }
}

async fn sleep_until(deadline: Instant, token: &CancellationToken) -> Result<(), TaskError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(TaskError::Canceled),
        _ = tokio::time::sleep_until(deadline) => Ok(()),
    }
}

/// One run of a periodic schedule; failures suppress the schedule.
async fn run_periodic(
    task: &TaskRef,
    scheduler: &SchedulerHandle,
    id: JobId,
    token: &CancellationToken,
) -> Result<(), TaskError> {
    match run_once(task, scheduler, id, token).await {
        Err(TaskError::Canceled) => Err(TaskError::Canceled),
        Err(e) => {
            scheduler.bus().publish(
                Event::new(EventKind::ScheduleSuppressed)
                    .with_task(task.name())
                    .with_job(id)
                    .with_reason(e.as_message()),
            );
            Err(e)
        }
        Ok(()) => Ok(()),
    }
}

async fn run_once(
    task: &TaskRef,
    scheduler: &SchedulerHandle,
    id: JobId,
    token: &CancellationToken,
) -> Result<(), TaskError> {
    let shared = &scheduler.inner;
    let name: Arc<str> = Arc::from(task.name());
    let _running = JobGuard::running(Arc::clone(shared), id, Arc::clone(&name));
    shared.bus.publish(
        Event::new(EventKind::TaskStarting)
            .with_task(name)
            .with_job(id),
    );

    let run = run_task(Arc::clone(task), scheduler.clone(), token.clone());
    tokio::select! {
        biased;
        _ = shared.runtime_token.cancelled() => Err(TaskError::Canceled),
        out = AssertUnwindSafe(run).catch_unwind() => {
            out.unwrap_or_else(|p| Err(TaskError::panicked(&*p)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SchedulerError;
    use crate::runtime::scheduler::tests::{scheduler, wait_until};
    use crate::tasks::TaskFn;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_fixed_rate_runs_never_overlap() {
        let scheduler = scheduler(2);
        let runs = Arc::new(AtomicUsize::new(0));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let task = {
            let (runs, in_flight, peak) = (Arc::clone(&runs), Arc::clone(&in_flight), Arc::clone(&peak));
            TaskFn::arc("overrun", move |_: CancellationToken| {
                let (runs, in_flight, peak) = (Arc::clone(&runs), Arc::clone(&in_flight), Arc::clone(&peak));
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    // Each run outlasts the period.
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
        };

        let job = scheduler
            .schedule_at_fixed_rate(task, Duration::ZERO, Duration::from_millis(10))
            .unwrap();
        assert!(wait_until(Duration::from_secs(5), || runs.load(Ordering::SeqCst) >= 5));

        job.cancel();
        assert!(matches!(job.wait(), Err(TaskError::Canceled)));
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_run_suppresses_schedule() {
        let scheduler = scheduler(1);
        let runs = Arc::new(AtomicUsize::new(0));

        let task = {
            let runs = Arc::clone(&runs);
            TaskFn::arc("flaky", move |_: CancellationToken| {
                let runs = Arc::clone(&runs);
                async move {
                    if runs.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                        return Err(TaskError::fail("third run fails"));
                    }
                    Ok(())
                }
            })
        };

        let job = scheduler
            .schedule_with_fixed_delay(task, Duration::ZERO, Duration::from_millis(5))
            .unwrap();
        assert!(matches!(job.wait(), Err(TaskError::Fail { .. })));

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert!(!scheduler.is_shutdown());
    }

    #[test]
    fn test_fixed_delay_spaces_runs_after_completion() {
        let scheduler = scheduler(1);
        let starts = Arc::new(Mutex::new(Vec::new()));

        let task = {
            let starts = Arc::clone(&starts);
            TaskFn::arc("spaced", move |_: CancellationToken| {
                let starts = Arc::clone(&starts);
                async move {
                    starts.lock().push(std::time::Instant::now());
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(())
                }
            })
        };

        let job = scheduler
            .schedule_with_fixed_delay(task, Duration::ZERO, Duration::from_millis(30))
            .unwrap();
        assert!(wait_until(Duration::from_secs(5), || starts.lock().len() >= 4));
        job.cancel();

        let starts = starts.lock();
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(50));
        }
    }

    #[test]
    fn test_zero_period_is_rejected() {
        let scheduler = scheduler(1);
        let task = TaskFn::arc("noop", |_: CancellationToken| async { Ok::<(), TaskError>(()) });
        let err = scheduler
            .schedule_at_fixed_rate(task, Duration::ZERO, Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidArgument { .. }));
    }

    #[test]
    fn test_one_shot_runs_after_delay() {
        let scheduler = scheduler(1);
        let started = std::time::Instant::now();
        let task = TaskFn::arc("later", |_: CancellationToken| async { Ok::<(), TaskError>(()) });

        scheduler
            .schedule(task, Duration::from_millis(50))
            .unwrap()
            .wait()
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_shutdown_cancels_periodic_but_keeps_one_shot() {
        let scheduler = scheduler(1);
        let fired = Arc::new(AtomicUsize::new(0));

        let once = {
            let fired = Arc::clone(&fired);
            scheduler
                .schedule(
                    TaskFn::arc("once", move |_: CancellationToken| {
                        let fired = Arc::clone(&fired);
                        async move {
                            fired.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }
                    }),
                    Duration::from_millis(100),
                )
                .unwrap()
        };
        let periodic = scheduler
            .schedule_at_fixed_rate(
                TaskFn::arc("tick", |_: CancellationToken| async { Ok::<(), TaskError>(()) }),
                Duration::ZERO,
                Duration::from_millis(10),
            )
            .unwrap();

        scheduler.shutdown();
        assert!(matches!(periodic.wait(), Err(TaskError::Canceled)));
        once.wait().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        scheduler.await_termination(Duration::from_secs(2)).unwrap();
    }
}
