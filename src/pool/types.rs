/*!
 * Worker Pool Types
 */

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Queue entry: real work or the signal telling one worker to exit
pub(crate) enum Envelope<T> {
    Work(T),
    Shutdown,
}

/// Pool lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    Idle,
    Running,
    ShuttingDown,
}

/// Per-run counters shared by all workers
#[derive(Debug, Default)]
pub(crate) struct PoolStats {
    processed: AtomicU64,
    failed: AtomicU64,
    init_failures: AtomicU64,
}

impl PoolStats {
    #[inline]
    pub(crate) fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_init_failure(&self) {
        self.init_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            init_failures: self.init_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the run counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStatsSnapshot {
    /// Items processed successfully
    pub processed: u64,
    /// Items whose processing failed or panicked
    pub failed: u64,
    /// Workers that never started because `initialize` failed
    pub init_failures: u64,
}

/// Outcome of `WorkerPool::wait_for_completion`
#[derive(Debug)]
pub struct CompletionReport<T> {
    /// Items still queued after the workers stopped, in queue order
    pub pending: Vec<T>,
    /// The wait was interrupted and workers were force-terminated
    pub interrupted: bool,
    /// Workers still alive after the grace period; their threads are detached
    pub stragglers: usize,
    /// Worker threads that ended in a panic outside item processing
    pub panicked: usize,
    /// Counters of the finished run
    pub stats: PoolStatsSnapshot,
}

impl<T> CompletionReport<T> {
    pub(crate) fn new(stats: PoolStatsSnapshot) -> Self {
        Self {
            pending: Vec::new(),
            interrupted: false,
            stragglers: 0,
            panicked: 0,
            stats,
        }
    }

    /// Every worker finished and nothing was left behind
    pub fn is_clean(&self) -> bool {
        self.pending.is_empty() && !self.interrupted && self.stragglers == 0 && self.panicked == 0
    }
}

/// Cloneable handle that interrupts a pending `wait_for_completion`
///
/// An interrupt raised while nobody is waiting is kept for the next wait;
/// `WorkerPool::start` discards stale ones.
#[derive(Debug, Clone)]
pub struct PoolInterrupt {
    pub(crate) tx: flume::Sender<()>,
}

impl PoolInterrupt {
    pub fn interrupt(&self) {
        // The pool owns the receiver; sending fails only after it is dropped
        let _ = self.tx.send(());
    }
}
