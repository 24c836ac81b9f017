//! # Fork-join task trees.
//!
//! A [`RecursiveAction`] does its own share of work and returns the
//! sub-actions to fork. [`run_tree`] drives the whole tree on a rayon pool
//! and returns once every node finished.
//!
//! ```text
//! compute(root) ──► [a, b]
//!                    ├─ compute(a) ──► [a1, a2] ──► ...
//!                    └─ compute(b) ──► []
//! ```
//!
//! A failing or panicking node does not fork its children; its siblings keep
//! running. The first error recorded is returned.

use std::panic::AssertUnwindSafe;

use parking_lot::Mutex;

use crate::error::TaskError;

/// One node of a fork-join tree.
pub trait RecursiveAction: Send + 'static {
    /// Performs this node's work and returns the sub-actions to fork.
    fn compute(self: Box<Self>) -> Result<Vec<Box<dyn RecursiveAction>>, TaskError>;
}

/// Closure-backed [`RecursiveAction`].
///
/// # Example
/// ```
/// use pipevisor::{ActionFn, RecursiveAction};
///
/// fn leaf() -> Box<dyn RecursiveAction> {
///     ActionFn::boxed(|| Ok(Vec::new()))
/// }
/// let root = ActionFn::boxed(|| Ok(vec![leaf(), leaf()]));
/// # let _ = root;
/// ```
pub struct ActionFn<F>(F);

impl<F> ActionFn<F>
where
    F: FnOnce() -> Result<Vec<Box<dyn RecursiveAction>>, TaskError> + Send + 'static,
{
    /// Wraps `f` as an action.
    pub fn new(f: F) -> Self {
        Self(f)
    }

    /// Wraps `f` and boxes it as a tree node.
    pub fn boxed(f: F) -> Box<dyn RecursiveAction> {
        Box::new(Self(f))
    }
}

impl<F> RecursiveAction for ActionFn<F>
where
    F: FnOnce() -> Result<Vec<Box<dyn RecursiveAction>>, TaskError> + Send + 'static,
{
    fn compute(self: Box<Self>) -> Result<Vec<Box<dyn RecursiveAction>>, TaskError> {
        (self.0)()
    }
}

/// Runs `root` and all its descendants on `pool`; blocks until the tree settled.
pub(crate) fn run_tree(
    pool: &rayon::ThreadPool,
    root: Box<dyn RecursiveAction>,
) -> Result<(), TaskError> {
    let first_error = Mutex::new(None);
    pool.scope(|scope| fork(scope, root, &first_error));
    match first_error.into_inner() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn fork<'s>(
    scope: &rayon::Scope<'s>,
    action: Box<dyn RecursiveAction>,
    first_error: &'s Mutex<Option<TaskError>>,
) {
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| action.compute()))
        .unwrap_or_else(|p| Err(TaskError::panicked(&*p)));

    match outcome {
        Ok(children) => {
            for child in children {
                scope.spawn(move |s| fork(s, child, first_error));
            }
        }
        Err(e) => {
            let mut slot = first_error.lock();
            if slot.is_none() {
                *slot = Some(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn pool() -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap()
    }

    /// Sums `lo..hi` by halving until ranges are small.
    fn sum(lo: u64, hi: u64, total: Arc<AtomicU64>) -> Box<dyn RecursiveAction> {
        ActionFn::boxed(move || {
            if hi - lo <= 16 {
                total.fetch_add((lo..hi).sum(), Ordering::SeqCst);
                return Ok(Vec::new());
            }
            let mid = lo + (hi - lo) / 2;
            Ok(vec![sum(lo, mid, Arc::clone(&total)), sum(mid, hi, total)])
        })
    }

    #[test]
    fn test_whole_tree_runs_before_return() {
        let total = Arc::new(AtomicU64::new(0));
        run_tree(&pool(), sum(0, 10_000, Arc::clone(&total))).unwrap();
        assert_eq!(total.load(Ordering::SeqCst), (0..10_000).sum::<u64>());
    }

    #[test]
    fn test_node_error_is_returned() {
        let root = ActionFn::boxed(|| {
            Ok(vec![
                ActionFn::boxed(|| Ok(Vec::new())),
                ActionFn::boxed(|| Err(TaskError::fail("leaf failed"))),
            ])
        });
        assert!(matches!(run_tree(&pool(), root), Err(TaskError::Fail { .. })));
    }

    #[test]
    fn test_node_panic_is_caught() {
        let root = ActionFn::boxed(|| -> Result<Vec<Box<dyn RecursiveAction>>, TaskError> {
            panic!("node exploded")
        });
        match run_tree(&pool(), root) {
            Err(TaskError::Panicked { info }) => assert!(info.contains("node exploded")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
