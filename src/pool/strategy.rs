/*!
 * Worker Strategy
 *
 * Pluggable per-worker business logic
 */

use std::fmt;

/// Business logic run by each worker thread
///
/// Each worker calls [`initialize`](Self::initialize) once at thread start,
/// [`process`](Self::process) for every item it dequeues, and
/// [`cleanup`](Self::cleanup) once on exit. The state therefore lives for
/// exactly one worker thread and is never shared.
///
/// # Failure Policy
///
/// - `initialize` failing stops that worker only
/// - `process` failing (error or panic) is logged, passed to
///   [`handle_failure`](Self::handle_failure), and the worker moves on
/// - `cleanup` always runs; a panic there is logged and contained
pub trait WorkerStrategy<T>: Send + Sync + 'static {
    /// Per-thread context
    type State;

    /// Create the state for a new worker thread
    fn initialize(&self) -> anyhow::Result<Self::State>;

    /// Handle one work item
    fn process(&self, state: &mut Self::State, item: &T) -> anyhow::Result<()>;

    /// Called after `process` fails for `item`
    fn handle_failure(&self, _state: &mut Self::State, _item: &T, _error: &anyhow::Error) {}

    /// Tear down the state when the worker exits
    fn cleanup(&self, state: Self::State) {
        drop(state);
    }
}

/// Stateless strategy backed by a closure
pub struct FnStrategy<F> {
    process: F,
}

impl<F> FnStrategy<F> {
    pub fn new<T>(process: F) -> Self
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self { process }
    }
}

impl<T, F> WorkerStrategy<T> for FnStrategy<F>
where
    F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
{
    type State = ();

    fn initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn process(&self, _state: &mut (), item: &T) -> anyhow::Result<()> {
        (self.process)(item)
    }
}

impl<F> fmt::Debug for FnStrategy<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStrategy").finish_non_exhaustive()
    }
}

/// Shorthand for [`FnStrategy::new`]
pub fn from_fn<T, F>(process: F) -> FnStrategy<F>
where
    F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
{
    FnStrategy::new(process)
}
