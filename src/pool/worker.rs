/*!
 * Worker Thread Loop
 *
 * initialize → take/process loop → cleanup, with per-item fault containment
 */

use super::config::QueueMode;
use super::strategy::WorkerStrategy;
use super::types::{Envelope, PoolStats};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Longest a blocked take goes without re-checking the terminate flag
const TAKE_POLL: Duration = Duration::from_millis(50);

/// Everything one worker thread needs
pub(super) struct WorkerContext<T, S> {
    pub index: usize,
    pub strategy: Arc<S>,
    pub mode: QueueMode,
    pub queue: flume::Receiver<Envelope<T>>,
    /// Set on forced termination; a pending take gives up within `TAKE_POLL`
    pub terminate: Arc<AtomicBool>,
    pub stats: Arc<PoolStats>,
    pub running: Arc<AtomicUsize>,
    pub done: flume::Sender<usize>,
}

/// Signals the pool when the worker thread exits, however it exits
struct ExitNotice {
    index: usize,
    running: Arc<AtomicUsize>,
    done: flume::Sender<usize>,
}

impl Drop for ExitNotice {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
        // The pool may have stopped listening after its grace period
        let _ = self.done.send(self.index);
    }
}

/// Worker thread body
pub(super) fn run<T, S>(ctx: WorkerContext<T, S>)
where
    S: WorkerStrategy<T>,
{
    let WorkerContext {
        index,
        strategy,
        mode,
        queue,
        terminate,
        stats,
        running,
        done,
    } = ctx;
    let _notice = ExitNotice {
        index,
        running,
        done,
    };

    let mut state = match panic::catch_unwind(AssertUnwindSafe(|| strategy.initialize())) {
        Ok(Ok(state)) => state,
        Ok(Err(e)) => {
            stats.record_init_failure();
            error!(worker = index, error = %e, "worker initialization failed");
            return;
        }
        Err(payload) => {
            stats.record_init_failure();
            error!(
                worker = index,
                panic = %panic_message(payload.as_ref()),
                "worker initialization panicked"
            );
            return;
        }
    };
    debug!(worker = index, ?mode, "worker started");

    let mut handled = 0u64;
    loop {
        if terminate.load(Ordering::Acquire) {
            debug!(worker = index, "worker terminated");
            break;
        }

        let next = match mode {
            QueueMode::Blocking => match queue.recv_timeout(TAKE_POLL) {
                Ok(envelope) => Some(envelope),
                Err(flume::RecvTimeoutError::Timeout) => continue,
                Err(flume::RecvTimeoutError::Disconnected) => None,
            },
            QueueMode::Draining => queue.try_recv().ok(),
        };

        let item = match next {
            Some(Envelope::Work(item)) => item,
            Some(Envelope::Shutdown) => {
                debug!(worker = index, "exit signal received");
                break;
            }
            None => break,
        };

        process_item(index, strategy.as_ref(), &mut state, &item, &stats);
        handled += 1;
    }

    if panic::catch_unwind(AssertUnwindSafe(|| strategy.cleanup(state))).is_err() {
        error!(worker = index, "worker cleanup panicked");
    }
    debug!(worker = index, handled, "worker exited");
}

fn process_item<T, S>(index: usize, strategy: &S, state: &mut S::State, item: &T, stats: &PoolStats)
where
    S: WorkerStrategy<T>,
{
    let error = match panic::catch_unwind(AssertUnwindSafe(|| strategy.process(state, item))) {
        Ok(Ok(())) => {
            stats.record_processed();
            return;
        }
        Ok(Err(e)) => e,
        Err(payload) => anyhow::anyhow!("process panicked: {}", panic_message(payload.as_ref())),
    };

    stats.record_failed();
    warn!(worker = index, error = %error, "work item failed");

    let hook = panic::catch_unwind(AssertUnwindSafe(|| strategy.handle_failure(state, item, &error)));
    if hook.is_err() {
        error!(worker = index, "failure hook panicked");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let payload = panic::catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload = panic::catch_unwind(|| panic!("formatted {}", 42)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 42");
    }
}
