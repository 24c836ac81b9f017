//! # Ordered stage lists driven sequentially or in parallel.
//!
//! [`Pipeline::run`] pushes one item through every stage on the calling
//! thread. [`Pipeline::run_parallel`] submits one job per item to the
//! scheduler; each flow still visits the stages in order, but flows overlap
//! except where a synchronization pipe pair guards a section.
//!
//! A flow that fails between a lock pipe and its unlock pipe leaves that
//! lock held; stages inside a guarded section should not fail.

use std::sync::Arc;

use crate::error::{SchedulerError, TaskError};
use crate::pipes::{Pipe, PipeContext};
use crate::runtime::{JobHandle, JobId, SchedulerHandle};

/// Named, ordered list of stages.
pub struct Pipeline<T> {
    name: String,
    stages: Vec<Arc<dyn Pipe<T>>>,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Creates an empty pipeline.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Appends a stage.
    pub fn stage(mut self, pipe: impl Pipe<T> + 'static) -> Self {
        self.stages.push(Arc::new(pipe));
        self
    }

    /// Appends a stage shared with other pipelines.
    pub fn shared_stage(mut self, pipe: Arc<dyn Pipe<T>>) -> Self {
        self.stages.push(pipe);
        self
    }

    /// Pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// True when the pipeline has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs one item through every stage on the calling thread.
    pub fn run(&self, data: T) -> Result<T, TaskError> {
        self.flow(data, &[], false)
    }

    /// Submits one flow per item; flow `i` sees the jobs of flows `0..i` as its `futures`.
    ///
    /// Handles are returned in item order.
    pub fn run_parallel(
        self: &Arc<Self>,
        scheduler: &SchedulerHandle,
        items: Vec<T>,
    ) -> Result<Vec<JobHandle<T>>, SchedulerError> {
        let mut handles = Vec::with_capacity(items.len());
        let mut started: Vec<JobId> = Vec::with_capacity(items.len());

        for (i, item) in items.into_iter().enumerate() {
            let pipeline = Arc::clone(self);
            let futures = started.clone();
            let handle = scheduler.submit_fn(format!("{}#{i}", self.name), move || {
                pipeline.flow(item, &futures, true)
            })?;
            started.push(handle.id());
            handles.push(handle);
        }
        Ok(handles)
    }

    fn flow(&self, data: T, futures: &[JobId], parallel: bool) -> Result<T, TaskError> {
        let ctx = PipeContext {
            futures,
            pipeline: &self.name,
            parallel,
        };
        self.stages
            .iter()
            .try_fold(data, |data, stage| stage.process(data, &ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipes::{FnPipe, mutex_pipes, semaphore_pipes};
    use crate::runtime::test_scheduler;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Stage that tracks how many flows are inside it at once.
    fn gauge(in_flight: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> impl Pipe<u64> + 'static {
        FnPipe::new(move |n: u64, _ctx: &PipeContext<'_>| {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(2));
            in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(n + 1)
        })
    }

    #[test]
    fn test_sequential_run_applies_stages_in_order() {
        let pipeline = Pipeline::new("arith")
            .stage(FnPipe::new(|n: i32, _: &PipeContext<'_>| Ok(n + 1)))
            .stage(FnPipe::new(|n: i32, _: &PipeContext<'_>| Ok(n * 10)));
        assert_eq!(pipeline.len(), 2);
        assert_eq!(pipeline.run(4).unwrap(), 50);
    }

    #[test]
    fn test_semaphore_section_is_bounded() {
        let scheduler = test_scheduler(8);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (enter, leave) = semaphore_pipes(3);
        let pipeline = Arc::new(
            Pipeline::new("bounded")
                .stage(enter)
                .stage(gauge(Arc::clone(&in_flight), Arc::clone(&peak)))
                .stage(leave),
        );

        let handles = pipeline
            .run_parallel(&scheduler, (0..64).collect())
            .unwrap();
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.wait().unwrap(), i as u64 + 1);
        }
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_mutex_section_is_serialized() {
        let scheduler = test_scheduler(4);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (enter, leave) = mutex_pipes();
        let pipeline = Arc::new(
            Pipeline::new("serial")
                .stage(enter)
                .stage(gauge(Arc::clone(&in_flight), Arc::clone(&peak)))
                .stage(leave),
        );

        let handles = pipeline
            .run_parallel(&scheduler, (0..32).collect())
            .unwrap();
        for handle in handles {
            handle.wait().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parallel_flows_see_earlier_jobs() {
        let scheduler = test_scheduler(2);
        let pipeline = Arc::new(Pipeline::new("ctx").stage(FnPipe::new(
            |_: usize, ctx: &PipeContext<'_>| {
                assert!(ctx.parallel);
                assert_eq!(ctx.pipeline, "ctx");
                Ok(ctx.futures.len())
            },
        )));

        let handles = pipeline
            .run_parallel(&scheduler, vec![0; 5])
            .unwrap();
        let seen: Vec<usize> = handles.into_iter().map(|h| h.wait().unwrap()).collect();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }
}
