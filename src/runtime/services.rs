//! # Dedicated service threads.
//!
//! Each [`Service`] runs on its own OS thread (named after the service) with
//! a private current-thread runtime, outside the bounded worker pool.
//!
//! ```text
//! create_service(name, svc)
//!   └─ thread "name": ServiceStarted ─► start() ─► service() ─► stop(0)
//!                     ─► ServiceStopped | ServiceFailed
//!
//! restart_service(name) ─► control.request_restart()        ServiceRestarting
//! stop_service(name, g) ─► control.request_shutdown() ─► join within g
//! shutdown()            ─► request_shutdown() on every service
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::error::{SchedulerError, TaskError};
use crate::events::{Event, EventKind};
use crate::runtime::{SchedulerHandle, run_task};
use crate::tasks::{Service, ServiceTask};

/// Registry entry of one service thread.
pub(crate) struct ServiceEntry {
    pub(crate) service: Arc<dyn Service>,
    pub(crate) thread: JoinHandle<()>,
    /// Cancelled when the thread body returns.
    pub(crate) done: CancellationToken,
}

impl SchedulerHandle {
    /// Starts `service` on a dedicated thread named `name`.
    ///
    /// Fails with [`SchedulerError::ServiceExists`] while a live service has the same name.
    pub fn create_service(
        &self,
        name: impl Into<String>,
        service: Arc<dyn Service>,
    ) -> Result<(), SchedulerError> {
        let name = name.into();
        let mut services = self.inner.services.lock();
        if self.is_shutdown() {
            drop(services);
            return Err(self.reject(&name, "shutdown"));
        }
        if services
            .get(&name)
            .is_some_and(|entry| !entry.thread.is_finished())
        {
            return Err(SchedulerError::ServiceExists { name });
        }

        let done = CancellationToken::new();
        let body = {
            let tracked = self.inner.service_tracker.token();
            let finished = done.clone().drop_guard();
            let scheduler = self.clone();
            let service = Arc::clone(&service);
            let task_name: Arc<str> = Arc::from(name.as_str());
            move || {
                let _tracked = tracked;
                let _finished = finished;
                run_service(scheduler, task_name, service);
            }
        };
        let thread = std::thread::Builder::new()
            .name(name.clone())
            .spawn(body)
            .map_err(|e| SchedulerError::Startup {
                component: name.clone(),
                error: e.to_string(),
            })?;

        services.insert(
            name,
            ServiceEntry {
                service,
                thread,
                done,
            },
        );
        Ok(())
    }

    /// Requests shutdown of a service and waits up to `grace` for its thread to exit.
    ///
    /// On timeout the service stays registered and
    /// [`SchedulerError::GraceExceeded`] names it. Blocks the calling thread.
    pub fn stop_service(&self, name: &str, grace: Duration) -> Result<(), SchedulerError> {
        let entry = self
            .inner
            .services
            .lock()
            .remove(name)
            .ok_or_else(|| SchedulerError::ServiceNotFound {
                name: name.to_string(),
            })?;
        entry.service.control().request_shutdown();

        let done = entry.done.clone();
        let exited = self.block_on(async move {
            tokio::time::timeout(grace, done.cancelled()).await.is_ok()
        });
        if !exited {
            self.inner.services.lock().insert(name.to_string(), entry);
            return Err(SchedulerError::GraceExceeded {
                grace,
                stuck: vec![name.to_string()],
            });
        }

        if entry.thread.join().is_err() {
            tracing::warn!(service = name, "service thread panicked outside the service loop");
        }
        Ok(())
    }

    /// Asks a running service to perform a stop/start cycle.
    pub fn restart_service(&self, name: &str) -> Result<(), SchedulerError> {
        let services = self.inner.services.lock();
        let entry = services
            .get(name)
            .filter(|entry| !entry.thread.is_finished())
            .ok_or_else(|| SchedulerError::ServiceNotFound {
                name: name.to_string(),
            })?;

        entry.service.control().request_restart();
        self.inner
            .bus
            .publish(Event::new(EventKind::ServiceRestarting).with_task(name));
        Ok(())
    }

    /// Names of services whose thread is still alive (sorted).
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .services
            .lock()
            .iter()
            .filter(|(_, entry)| !entry.thread.is_finished())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

/// Body of a service thread.
fn run_service(scheduler: SchedulerHandle, name: Arc<str>, service: Arc<dyn Service>) {
    let bus = scheduler.bus().clone();
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            bus.publish(
                Event::new(EventKind::ServiceFailed)
                    .with_task(name)
                    .with_reason(format!("runtime: {e}")),
            );
            return;
        }
    };

    bus.publish(Event::new(EventKind::ServiceStarted).with_task(Arc::clone(&name)));

    let token = scheduler.inner.runtime_token.child_token();
    let task = Arc::new(ServiceTask::new(Arc::clone(&name), service));
    let res = rt.block_on(async move {
        AssertUnwindSafe(run_task(task, scheduler, token))
            .catch_unwind()
            .await
            .unwrap_or_else(|p| Err(TaskError::panicked(&*p)))
    });

    let ev = match res {
        Ok(()) => Event::new(EventKind::ServiceStopped),
        Err(e) => Event::new(EventKind::ServiceFailed).with_reason(e.as_message()),
    };
    bus.publish(ev.with_task(name));
}
