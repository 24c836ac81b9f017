//! # Task scheduler: bounded worker pool, job admission and shutdown.
//!
//! [`TaskScheduler`] owns the runtimes; [`SchedulerHandle`] is the cheap,
//! cloneable front-end that tasks, services and lock helpers use to submit
//! more work.
//!
//! ## Job lifecycle
//! ```text
//! submit(..)
//!   ├─ admit: shutdown? queue full? ──► Err(Rejected) + TaskRejected
//!   ├─ pending[id] = name                TaskSubmitted
//!   └─ spawn on workers:
//!        acquire permit (cancellable) ──► pending → running   TaskStarting
//!        select { body.catch_unwind(), token.cancelled() }
//!        running.remove(id)                TaskStopped | TaskFailed
//! ```
//!
//! ## Rules
//! - At most `pool_size` jobs run at once (async and blocking alike). A
//!   cancelled blocking closure keeps its permit until it returns.
//! - Errors and panics are confined to the job's [`JobHandle`].
//! - `shutdown()` rejects new work and cancels periodic schedules; queued and
//!   in-flight jobs and pending one-shot delays still run.
//! - `shutdown_now()` additionally cancels every job token and returns the
//!   names of jobs that never started.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::ops::Deref;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TaskTrackerToken;

use crate::error::{SchedulerError, TaskError};
use crate::events::{Bus, Event, EventKind};
use crate::locks::{RecursiveAction, run_tree};
use crate::runtime::periodic::{self, Cadence};
use crate::runtime::services::ServiceEntry;
use crate::runtime::shutdown::wait_for_shutdown_signal;
use crate::runtime::{JobHandle, JobId, SchedulerConfig, run_task};
use crate::tasks::TaskRef;

/// State shared by the scheduler and every handle.
pub(crate) struct Shared {
    pub(crate) cfg: SchedulerConfig,
    pub(crate) pool_size: usize,
    pub(crate) bus: Bus,

    pub(crate) workers: Handle,
    pub(crate) timers: Handle,
    pub(crate) fork_join: rayon::ThreadPool,
    pub(crate) permits: Arc<Semaphore>,

    pub(crate) jobs: TaskTracker,
    pub(crate) timer_jobs: TaskTracker,
    pub(crate) service_tracker: TaskTracker,

    /// Parent of every job token; cancelled by `shutdown_now`.
    pub(crate) runtime_token: CancellationToken,
    /// Parent of every periodic schedule token; cancelled by `shutdown`.
    pub(crate) periodic_token: CancellationToken,

    pub(crate) pending: Mutex<BTreeMap<JobId, Arc<str>>>,
    pub(crate) running: Mutex<BTreeMap<JobId, Arc<str>>>,
    pub(crate) services: Mutex<HashMap<String, ServiceEntry>>,

    next_id: AtomicU64,
    shutdown: AtomicBool,
}

impl Shared {
    pub(crate) fn new(
        cfg: SchedulerConfig,
        pool_size: usize,
        bus: Bus,
        workers: Handle,
        timers: Handle,
        fork_join: rayon::ThreadPool,
    ) -> Self {
        let runtime_token = CancellationToken::new();
        let periodic_token = runtime_token.child_token();
        Self {
            cfg,
            pool_size,
            bus,
            workers,
            timers,
            fork_join,
            permits: Arc::new(Semaphore::new(pool_size)),
            jobs: TaskTracker::new(),
            timer_jobs: TaskTracker::new(),
            service_tracker: TaskTracker::new(),
            runtime_token,
            periodic_token,
            pending: Mutex::new(BTreeMap::new()),
            running: Mutex::new(BTreeMap::new()),
            services: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            shutdown: AtomicBool::new(false),
        }
    }
}

/// Keeps the pending/running maps in sync with one job's progress.
pub(crate) struct JobGuard {
    shared: Arc<Shared>,
    id: JobId,
}

impl JobGuard {
    pub(crate) fn new(shared: Arc<Shared>, id: JobId) -> Self {
        Self { shared, id }
    }

    /// Marks a job that bypasses the queue (timer runs) as running.
    pub(crate) fn running(shared: Arc<Shared>, id: JobId, name: Arc<str>) -> Self {
        shared.running.lock().insert(id, name);
        Self { shared, id }
    }

    /// Moves the job from pending to running.
    ///
    /// Returns false when `shutdown_now` already drained it from the queue.
    pub(crate) fn started(&self) -> bool {
        let name = self.shared.pending.lock().remove(&self.id);
        match name {
            Some(name) => {
                self.shared.running.lock().insert(self.id, name);
                true
            }
            None => false,
        }
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.shared.pending.lock().remove(&self.id);
        self.shared.running.lock().remove(&self.id);
    }
}

/// What a started job holds until its work has actually finished.
///
/// Dropping it frees the worker permit, removes the job from the running map
/// and releases its slot in the job tracker.
struct Lease {
    _guard: JobGuard,
    _permit: OwnedSemaphorePermit,
    _tracked: TaskTrackerToken,
}

/// Publishes the terminal event of a job.
pub(crate) fn report<T>(bus: &Bus, name: &Arc<str>, id: JobId, res: &Result<T, TaskError>) {
    let ev = match res {
        Ok(_) => Event::new(EventKind::TaskStopped),
        Err(TaskError::Canceled) => Event::new(EventKind::TaskStopped).with_reason("canceled"),
        Err(e) => Event::new(EventKind::TaskFailed).with_reason(e.as_message()),
    };
    bus.publish(ev.with_task(Arc::clone(name)).with_job(id));
}

/// Cloneable front-end of a [`TaskScheduler`].
///
/// Handles stay valid after the scheduler is dropped; every submission then
/// fails with [`SchedulerError::Rejected`].
#[derive(Clone)]
pub struct SchedulerHandle {
    pub(crate) inner: Arc<Shared>,
}

impl SchedulerHandle {
    /// Submits a task run onto the worker pool.
    ///
    /// Children queued by the task are submitted after `process` returns.
    pub fn submit(&self, task: TaskRef) -> Result<JobHandle<()>, SchedulerError> {
        let name: Arc<str> = Arc::from(task.name());
        let token = self.inner.runtime_token.child_token();
        let body = run_task(task, self.clone(), token.clone());
        self.spawn_job(name, token, move |lease| async move {
            let _lease = lease;
            body.await
        })
    }

    /// Submits a blocking closure; it runs on the blocking pool while holding a worker permit.
    ///
    /// A started closure cannot be interrupted. Cancelling its handle resolves
    /// the handle to [`TaskError::Canceled`], but the closure keeps its permit
    /// and stays tracked until it returns.
    ///
    /// # Example
    /// ```
    /// use pipevisor::{SchedulerBuilder, SchedulerConfig, TaskError};
    ///
    /// let scheduler = SchedulerBuilder::new(SchedulerConfig::default()).build().unwrap();
    /// let job = scheduler.submit_fn("answer", || Ok::<_, TaskError>(42)).unwrap();
    /// assert_eq!(job.wait().unwrap(), 42);
    /// ```
    pub fn submit_fn<T, F>(
        &self,
        name: impl Into<Arc<str>>,
        f: F,
    ) -> Result<JobHandle<T>, SchedulerError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, TaskError> + Send + 'static,
    {
        let token = self.inner.runtime_token.child_token();
        self.spawn_job(name.into(), token, move |lease| async move {
            let blocking = tokio::task::spawn_blocking(move || {
                let _lease = lease;
                f()
            });
            match blocking.await {
                Ok(res) => res,
                Err(e) => Err(TaskError::from_join(e)),
            }
        })
    }

    /// Submits a future; it is polled on the worker pool while holding a permit.
    pub fn submit_async<T, Fut>(
        &self,
        name: impl Into<Arc<str>>,
        fut: Fut,
    ) -> Result<JobHandle<T>, SchedulerError>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let token = self.inner.runtime_token.child_token();
        self.spawn_job(name.into(), token, move |lease| async move {
            let _lease = lease;
            fut.await
        })
    }

    /// Runs `task` once after `delay` on the timer thread.
    pub fn schedule(&self, task: TaskRef, delay: Duration) -> Result<JobHandle<()>, SchedulerError> {
        let token = self.inner.runtime_token.child_token();
        self.register(task, delay, Cadence::Once, token)
    }

    /// Runs `task` at `initial_delay + n * period`.
    ///
    /// Overrunning runs delay later ones (they never overlap). The first
    /// failing run ends the schedule with a `ScheduleSuppressed` event.
    pub fn schedule_at_fixed_rate(
        &self,
        task: TaskRef,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<JobHandle<()>, SchedulerError> {
        let token = self.inner.periodic_token.child_token();
        self.register(task, initial_delay, Cadence::FixedRate(period), token)
    }

    /// Runs `task` after `initial_delay`, then `delay` after each run completes.
    pub fn schedule_with_fixed_delay(
        &self,
        task: TaskRef,
        initial_delay: Duration,
        delay: Duration,
    ) -> Result<JobHandle<()>, SchedulerError> {
        let token = self.inner.periodic_token.child_token();
        self.register(task, initial_delay, Cadence::FixedDelay(delay), token)
    }

    /// Runs a recursive action tree on the fork-join pool and blocks until
    /// every node of the tree finished.
    ///
    /// The first error (or panic) of any node is returned once the whole tree settled.
    pub fn invoke(&self, action: Box<dyn RecursiveAction>) -> Result<(), TaskError> {
        run_tree(&self.inner.fork_join, action)
    }

    /// Stops accepting work and cancels periodic schedules.
    ///
    /// Queued and in-flight jobs, pending one-shot delays and service
    /// shutdown hooks still run. Idempotent.
    pub fn shutdown(&self) {
        {
            let _pending = self.inner.pending.lock();
            if self.inner.shutdown.swap(true, Ordering::AcqRel) {
                return;
            }
        }
        self.inner.bus.publish(Event::new(EventKind::ShutdownRequested));

        self.inner.periodic_token.cancel();
        self.inner.jobs.close();
        self.inner.timer_jobs.close();
        self.inner.service_tracker.close();

        for entry in self.inner.services.lock().values() {
            entry.service.control().request_shutdown();
        }
    }

    /// Shuts down, cancels every job and returns the names of jobs that never started
    /// (in submission order).
    pub fn shutdown_now(&self) -> Vec<String> {
        self.shutdown();
        let never_started = std::mem::take(&mut *self.inner.pending.lock());
        self.inner.runtime_token.cancel();
        self.inner.permits.close();
        never_started
            .into_values()
            .map(|name| name.to_string())
            .collect()
    }

    /// Waits until every job, schedule and service thread finished.
    ///
    /// Only completes after [`shutdown`](Self::shutdown); on timeout returns
    /// [`SchedulerError::GraceExceeded`] listing what was still alive.
    pub async fn terminated(&self, timeout: Duration) -> Result<(), SchedulerError> {
        let drained = async {
            tokio::join!(
                self.inner.jobs.wait(),
                self.inner.timer_jobs.wait(),
                self.inner.service_tracker.wait(),
            );
        };

        match tokio::time::timeout(timeout, drained).await {
            Ok(()) => {
                self.inner
                    .bus
                    .publish(Event::new(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(_) => {
                let stuck = self.stuck();
                self.inner.bus.publish(
                    Event::new(EventKind::GraceExceeded)
                        .with_reason(stuck.join(", "))
                        .with_delay(timeout),
                );
                Err(SchedulerError::GraceExceeded {
                    grace: timeout,
                    stuck,
                })
            }
        }
    }

    /// Blocking form of [`terminated`](Self::terminated).
    ///
    /// Blocks the calling thread; do not call it from a job running on this scheduler.
    pub fn await_termination(&self, timeout: Duration) -> Result<(), SchedulerError> {
        self.block_on(self.terminated(timeout))
    }

    /// Waits for SIGINT/SIGTERM/SIGQUIT (Ctrl-C elsewhere), then shuts down
    /// and waits up to the configured grace for everything to stop.
    pub async fn shutdown_on_signal(&self) -> Result<(), SchedulerError> {
        wait_for_shutdown_signal().await?;
        self.shutdown();
        self.terminated(self.inner.cfg.grace).await
    }

    /// True once shutdown was requested.
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// True once shut down and every job, schedule and service finished.
    pub fn is_terminated(&self) -> bool {
        self.is_shutdown()
            && self.inner.jobs.is_empty()
            && self.inner.timer_jobs.is_empty()
            && self.inner.service_tracker.is_empty()
    }

    /// Number of workers (and fork-join threads).
    pub fn pool_size(&self) -> usize {
        self.inner.pool_size
    }

    /// Jobs currently running (worker pool and timer thread).
    pub fn active_count(&self) -> usize {
        self.inner.running.lock().len()
    }

    /// Jobs accepted but waiting for a worker.
    pub fn queued_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Event bus of this scheduler.
    pub fn bus(&self) -> &Bus {
        &self.inner.bus
    }

    /// Drives `fut` to completion on the calling thread inside the worker runtime context.
    pub(crate) fn block_on<F: Future>(&self, fut: F) -> F::Output {
        let _ctx = self.inner.workers.enter();
        futures::executor::block_on(fut)
    }

    pub(crate) fn next_id(&self) -> JobId {
        JobId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn reject(&self, name: &str, reason: &'static str) -> SchedulerError {
        self.inner.bus.publish(
            Event::new(EventKind::TaskRejected)
                .with_task(name)
                .with_reason(reason),
        );
        SchedulerError::Rejected { reason }
    }

    /// Names of running jobs, queued jobs and live services.
    fn stuck(&self) -> Vec<String> {
        let mut stuck: Vec<String> = self
            .inner
            .running
            .lock()
            .values()
            .chain(self.inner.pending.lock().values())
            .map(|name| name.to_string())
            .collect();
        stuck.extend(self.services());
        stuck
    }

    fn admit(&self, name: &Arc<str>) -> Result<JobId, SchedulerError> {
        let mut pending = self.inner.pending.lock();
        if self.is_shutdown() {
            drop(pending);
            return Err(self.reject(name, "shutdown"));
        }
        if let Some(limit) = self.inner.cfg.queue_limit() {
            if pending.len() >= limit {
                drop(pending);
                return Err(self.reject(name, "queue_full"));
            }
        }
        let id = self.next_id();
        pending.insert(id, Arc::clone(name));
        Ok(id)
    }

    /// Admits a job and spawns it on the worker pool.
    ///
    /// `body` receives the job's [`Lease`] once a permit was granted and must
    /// keep it for as long as its work runs.
    fn spawn_job<T, B, Fut>(
        &self,
        name: Arc<str>,
        token: CancellationToken,
        body: B,
    ) -> Result<JobHandle<T>, SchedulerError>
    where
        T: Send + 'static,
        B: FnOnce(Lease) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let id = self.admit(&name)?;
        self.inner.bus.publish(
            Event::new(EventKind::TaskSubmitted)
                .with_task(Arc::clone(&name))
                .with_job(id),
        );

        let shared = Arc::clone(&self.inner);
        let job_name = Arc::clone(&name);
        let job_token = token.clone();
        let job = async move {
            let guard = JobGuard::new(Arc::clone(&shared), id);

            let permit = tokio::select! {
                biased;
                _ = job_token.cancelled() => None,
                p = Arc::clone(&shared.permits).acquire_owned() => p.ok(),
            };
            let res = match permit {
                Some(permit) if guard.started() => {
                    shared.bus.publish(
                        Event::new(EventKind::TaskStarting)
                            .with_task(Arc::clone(&job_name))
                            .with_job(id),
                    );
                    let lease = Lease {
                        _guard: guard,
                        _permit: permit,
                        _tracked: shared.jobs.token(),
                    };
                    tokio::select! {
                        biased;
                        _ = job_token.cancelled() => Err(TaskError::Canceled),
                        out = AssertUnwindSafe(body(lease)).catch_unwind() => {
                            out.unwrap_or_else(|p| Err(TaskError::panicked(&*p)))
                        }
                    }
                }
                _ => {
                    drop(guard);
                    Err(TaskError::Canceled)
                }
            };

            report(&shared.bus, &job_name, id, &res);
            res
        };

        let join = self.inner.jobs.spawn_on(job, &self.inner.workers);
        Ok(JobHandle::new(id, name, token, join))
    }

    fn register(
        &self,
        task: TaskRef,
        initial_delay: Duration,
        cadence: Cadence,
        token: CancellationToken,
    ) -> Result<JobHandle<()>, SchedulerError> {
        let name: Arc<str> = Arc::from(task.name());
        if cadence.period().is_some_and(|p| p.is_zero()) {
            return Err(SchedulerError::InvalidArgument {
                reason: "period must be non-zero",
            });
        }

        let pending = self.inner.pending.lock();
        if self.is_shutdown() {
            drop(pending);
            return Err(self.reject(&name, "shutdown"));
        }
        let id = self.next_id();
        drop(pending);
        self.inner.bus.publish(
            Event::new(EventKind::ScheduleRegistered)
                .with_task(Arc::clone(&name))
                .with_job(id)
                .with_delay(initial_delay),
        );

        let shared = Arc::clone(&self.inner);
        let job_name = Arc::clone(&name);
        let driver = periodic::drive(task, self.clone(), id, token.clone(), initial_delay, cadence);
        let job = async move {
            let res = driver.await;
            report(&shared.bus, &job_name, id, &res);
            res
        };

        let join = self.inner.timer_jobs.spawn_on(job, &self.inner.timers);
        Ok(JobHandle::new(id, name, token, join))
    }
}

/// # Bounded-pool task scheduler.
///
/// Owns the worker runtime, the single-thread timer runtime and the
/// fork-join pool. Dereferences to [`SchedulerHandle`] for the whole API.
///
/// Dropping the scheduler calls [`shutdown_now`](SchedulerHandle::shutdown_now)
/// and tears the runtimes down without waiting.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
/// use pipevisor::{SchedulerBuilder, SchedulerConfig, TaskError, TaskFn};
///
/// let scheduler = SchedulerBuilder::new(SchedulerConfig::default()).build().unwrap();
/// let job = scheduler
///     .submit(TaskFn::arc("hello", |_token: CancellationToken| async { Ok::<(), TaskError>(()) }))
///     .unwrap();
/// job.wait().unwrap();
///
/// scheduler.shutdown();
/// scheduler.await_termination(Duration::from_secs(5)).unwrap();
/// ```
pub struct TaskScheduler {
    handle: SchedulerHandle,
    workers: Option<Runtime>,
    timers: Option<Runtime>,
}

impl TaskScheduler {
    pub(crate) fn new(shared: Shared, workers: Runtime, timers: Runtime) -> Self {
        Self {
            handle: SchedulerHandle {
                inner: Arc::new(shared),
            },
            workers: Some(workers),
            timers: Some(timers),
        }
    }

    /// Returns a cloneable handle for collaborators.
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }
}

impl Deref for TaskScheduler {
    type Target = SchedulerHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.handle.shutdown_now();
        if let Some(rt) = self.workers.take() {
            rt.shutdown_background();
        }
        if let Some(rt) = self.timers.take() {
            rt.shutdown_background();
        }
    }
}
