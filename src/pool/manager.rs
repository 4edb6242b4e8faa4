/*!
 * Worker Pool Manager
 *
 * Lifecycle, queue access and the graceful-shutdown protocol
 */

use super::config::PoolConfig;
use super::strategy::WorkerStrategy;
use super::types::{
    CompletionReport, Envelope, PoolInterrupt, PoolState, PoolStats, PoolStatsSnapshot,
};
use super::worker::{self, WorkerContext};
use crate::core::errors::{PoolError, PoolResult};
use crate::monitoring::span_operation;
use arc_swap::ArcSwap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Interval at which blocked shutdown steps re-check for interrupts and
/// live workers
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Shutdowns slower than this are logged at warn level
const SLOW_SHUTDOWN: Duration = Duration::from_secs(10);

/// Bookkeeping of one started run
struct RunState {
    config: PoolConfig,
    workers: Vec<JoinHandle<()>>,
    terminate: Arc<AtomicBool>,
    done: flume::Receiver<usize>,
    stats: Arc<PoolStats>,
    /// Live workers of this run only; stragglers of earlier runs keep their own
    running: Arc<AtomicUsize>,
}

enum Lifecycle {
    Idle,
    Running(RunState),
    ShuttingDown,
}

impl Lifecycle {
    fn state(&self) -> PoolState {
        match self {
            Lifecycle::Idle => PoolState::Idle,
            Lifecycle::Running(_) => PoolState::Running,
            Lifecycle::ShuttingDown => PoolState::ShuttingDown,
        }
    }
}

/// Puts the pool back to Idle when shutdown ends, even by panic
struct ResetToIdle<'a>(&'a RwLock<Lifecycle>);

impl Drop for ResetToIdle<'_> {
    fn drop(&mut self) {
        *self.0.write() = Lifecycle::Idle;
    }
}

/// What woke the completion wait
enum WaitEvent {
    Finished(usize),
    Interrupted,
    AllExited,
}

/// Fixed-size pool of worker threads consuming a shared queue
///
/// # Lifecycle
///
/// `Idle → Running → ShuttingDown → Idle`; a pool can be started again once
/// it is back to Idle. Items can be queued in any state.
///
/// # Locking
///
/// Run bookkeeping sits behind one `RwLock`: `start` and
/// `wait_for_completion` take it exclusively for structural changes,
/// inspection takes it shared. The queue itself is a channel and needs no
/// extra locking.
///
/// # Example
///
/// ```
/// use ai_os_sync::pool::{from_fn, PoolConfig, WorkerPool};
///
/// let pool = WorkerPool::unbounded(from_fn(|item: &u32| {
///     assert!(*item > 0);
///     Ok(())
/// }));
/// pool.start(PoolConfig::blocking(2)).unwrap();
/// for i in 1..=5 {
///     pool.add_work_item(i);
/// }
/// let report = pool.wait_for_completion();
/// assert!(report.is_clean());
/// assert_eq!(report.stats.processed, 5);
/// ```
pub struct WorkerPool<T, S>
where
    T: Send + 'static,
    S: WorkerStrategy<T>,
{
    strategy: Arc<S>,
    queue_tx: flume::Sender<Envelope<T>>,
    queue_rx: flume::Receiver<Envelope<T>>,
    capacity: Option<usize>,
    lifecycle: RwLock<Lifecycle>,
    running: ArcSwap<AtomicUsize>,
    stats: ArcSwap<PoolStats>,
    interrupt_tx: flume::Sender<()>,
    interrupt_rx: flume::Receiver<()>,
}

impl<T, S> WorkerPool<T, S>
where
    T: Send + 'static,
    S: WorkerStrategy<T>,
{
    /// Pool whose queue holds at most `capacity` items
    pub fn bounded(strategy: S, capacity: usize) -> Self {
        let (queue_tx, queue_rx) = flume::bounded(capacity);
        Self::with_queue(strategy, queue_tx, queue_rx, Some(capacity))
    }

    /// Pool with an unbounded queue
    pub fn unbounded(strategy: S) -> Self {
        let (queue_tx, queue_rx) = flume::unbounded();
        Self::with_queue(strategy, queue_tx, queue_rx, None)
    }

    fn with_queue(
        strategy: S,
        queue_tx: flume::Sender<Envelope<T>>,
        queue_rx: flume::Receiver<Envelope<T>>,
        capacity: Option<usize>,
    ) -> Self {
        let (interrupt_tx, interrupt_rx) = flume::unbounded();
        Self {
            strategy: Arc::new(strategy),
            queue_tx,
            queue_rx,
            capacity,
            lifecycle: RwLock::new(Lifecycle::Idle),
            running: ArcSwap::from_pointee(AtomicUsize::new(0)),
            stats: ArcSwap::from_pointee(PoolStats::default()),
            interrupt_tx,
            interrupt_rx,
        }
    }

    /// Start `config.threads` workers
    ///
    /// # Errors
    ///
    /// - [`PoolError::AlreadyRunning`] unless the pool is Idle
    /// - [`PoolError::MissingExitSignal`] for blocking mode without exit signals
    /// - [`PoolError::InvalidThreadCount`] for zero threads
    /// - [`PoolError::SpawnFailed`] if a thread cannot be created; workers
    ///   spawned so far are terminated and the pool stays Idle
    pub fn start(&self, config: PoolConfig) -> PoolResult<()> {
        let mut lifecycle = self.lifecycle.write();
        if !matches!(*lifecycle, Lifecycle::Idle) {
            return Err(PoolError::AlreadyRunning);
        }
        config.validate()?;

        // Interrupts aimed at an earlier run
        while self.interrupt_rx.try_recv().is_ok() {}

        let stats = Arc::new(PoolStats::default());
        self.stats.store(stats.clone());
        let running = Arc::new(AtomicUsize::new(0));
        self.running.store(running.clone());

        let (done_tx, done_rx) = flume::unbounded();
        let terminate = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(config.threads);

        for index in 0..config.threads {
            let ctx = WorkerContext {
                index,
                strategy: self.strategy.clone(),
                mode: config.mode,
                queue: self.queue_rx.clone(),
                terminate: terminate.clone(),
                stats: stats.clone(),
                running: running.clone(),
                done: done_tx.clone(),
            };

            running.fetch_add(1, Ordering::SeqCst);
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name, index))
                .spawn(move || worker::run(ctx));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    running.fetch_sub(1, Ordering::SeqCst);
                    error!(worker = index, error = %e, "failed to spawn worker thread");

                    terminate.store(true, Ordering::Release);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(PoolError::SpawnFailed(e.to_string()));
                }
            }
        }

        info!(
            threads = config.threads,
            mode = ?config.mode,
            exit_signal = config.exit_signal,
            capacity = ?self.capacity,
            "worker pool started"
        );

        *lifecycle = Lifecycle::Running(RunState {
            config,
            workers,
            terminate,
            done: done_rx,
            stats,
            running,
        });
        Ok(())
    }

    /// Queue an item, blocking while a bounded queue is full
    pub fn add_work_item(&self, item: T) {
        // The pool owns a receiver, so the channel never disconnects
        let _ = self.queue_tx.send(Envelope::Work(item));
    }

    /// Queue an item unless the queue is full; returns whether it was queued
    pub fn add_work_item_nonblock(&self, item: T) -> bool {
        self.queue_tx.try_send(Envelope::Work(item)).is_ok()
    }

    /// Remove and return every queued item
    ///
    /// Exit signals already queued for a shutdown in progress are put back.
    pub fn clear_work_items(&self) -> Vec<T> {
        let mut items = Vec::new();
        let mut exit_signals = 0;
        for envelope in self.queue_rx.drain() {
            match envelope {
                Envelope::Work(item) => items.push(item),
                Envelope::Shutdown => exit_signals += 1,
            }
        }

        for _ in 0..exit_signals {
            let _ = self.queue_tx.send(Envelope::Shutdown);
        }

        debug!(cleared = items.len(), "work queue cleared");
        items
    }

    /// Handle that interrupts a pending [`wait_for_completion`](Self::wait_for_completion)
    pub fn interrupt_handle(&self) -> PoolInterrupt {
        PoolInterrupt {
            tx: self.interrupt_tx.clone(),
        }
    }

    /// Graceful shutdown
    ///
    /// 1. Enqueue one exit signal per worker, if enabled
    /// 2. Wait for every worker; an interrupt during the wait force-terminates
    ///    the workers, then waits at most the grace period for them
    /// 3. Drain what is still queued and report it as pending
    /// 4. Return to Idle regardless of the outcome
    ///
    /// On an Idle pool this only drains the queue.
    pub fn wait_for_completion(&self) -> CompletionReport<T> {
        let run = {
            let mut lifecycle = self.lifecycle.write();
            match std::mem::replace(&mut *lifecycle, Lifecycle::ShuttingDown) {
                Lifecycle::Running(run) => Some(run),
                Lifecycle::Idle => None,
                Lifecycle::ShuttingDown => {
                    warn!("wait_for_completion called while another shutdown is in progress");
                    return CompletionReport::new(self.stats());
                }
            }
        };
        let _reset = ResetToIdle(&self.lifecycle);
        let span = span_operation("pool_shutdown").with_slow_threshold(SLOW_SHUTDOWN);
        let _entered = span.enter();

        let mut report = match run {
            Some(run) => self.shutdown(run),
            None => CompletionReport::new(self.stats()),
        };

        report.pending = self.drain_pending();
        span.record_items_processed(report.stats.processed);
        span.record_result(report.is_clean());
        info!(
            processed = report.stats.processed,
            failed = report.stats.failed,
            pending = report.pending.len(),
            interrupted = report.interrupted,
            "worker pool stopped"
        );
        report
    }

    fn shutdown(&self, run: RunState) -> CompletionReport<T> {
        let RunState {
            config,
            workers,
            terminate,
            done,
            stats,
            running,
        } = run;

        let mut finished = vec![false; workers.len()];
        let mut remaining = workers.len();
        let mut interrupted = false;

        if config.exit_signal {
            for _ in 0..config.threads {
                if !self.send_exit_signal(&running, &mut interrupted) {
                    break;
                }
            }
        }

        while remaining > 0 && !interrupted {
            match self.next_event(&done) {
                WaitEvent::Finished(index) => {
                    finished[index] = true;
                    remaining -= 1;
                }
                WaitEvent::Interrupted => interrupted = true,
                WaitEvent::AllExited => break,
            }
        }

        if interrupted {
            warn!(remaining, "interrupted while waiting for workers; forcing termination");
            // Blocked takes notice within one poll interval
            terminate.store(true, Ordering::Release);
        }

        if remaining > 0 {
            let deadline = Instant::now() + config.grace_period;
            while remaining > 0 {
                match done.recv_deadline(deadline) {
                    Ok(index) => {
                        finished[index] = true;
                        remaining -= 1;
                    }
                    Err(flume::RecvTimeoutError::Timeout) => {
                        warn!(
                            remaining,
                            grace_ms = config.grace_period.as_millis() as u64,
                            "workers still alive after grace period"
                        );
                        break;
                    }
                    Err(flume::RecvTimeoutError::Disconnected) => break,
                }
            }
        }

        let mut report = CompletionReport::new(stats.snapshot());
        report.interrupted = interrupted;

        for (index, handle) in workers.into_iter().enumerate() {
            if finished[index] || handle.is_finished() {
                if handle.join().is_err() {
                    error!(worker = index, "worker thread panicked");
                    report.panicked += 1;
                }
            } else {
                // Detached; the thread ends on its own once its item completes
                report.stragglers += 1;
            }
        }
        report
    }

    /// Next worker exit; an interrupt takes priority
    fn next_event(&self, done: &flume::Receiver<usize>) -> WaitEvent {
        loop {
            if self.interrupt_rx.try_recv().is_ok() {
                return WaitEvent::Interrupted;
            }
            match done.recv_timeout(SHUTDOWN_POLL) {
                Ok(index) => return WaitEvent::Finished(index),
                Err(flume::RecvTimeoutError::Timeout) => {}
                Err(flume::RecvTimeoutError::Disconnected) => return WaitEvent::AllExited,
            }
        }
    }

    /// Returns false once sending should stop: no live consumer or interrupted
    fn send_exit_signal(&self, running: &AtomicUsize, interrupted: &mut bool) -> bool {
        let mut envelope = Envelope::Shutdown;
        loop {
            match self.queue_tx.send_timeout(envelope, SHUTDOWN_POLL) {
                Ok(()) => return true,
                Err(flume::SendTimeoutError::Timeout(returned)) => {
                    if self.interrupt_rx.try_recv().is_ok() {
                        *interrupted = true;
                        return false;
                    }
                    if running.load(Ordering::SeqCst) == 0 {
                        debug!("no live workers to receive exit signals");
                        return false;
                    }
                    envelope = returned;
                }
                Err(flume::SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }

    fn drain_pending(&self) -> Vec<T> {
        let pending: Vec<T> = self
            .queue_rx
            .drain()
            .filter_map(|envelope| match envelope {
                Envelope::Work(item) => Some(item),
                Envelope::Shutdown => None,
            })
            .collect();

        for position in 0..pending.len() {
            warn!(position, total = pending.len(), "work item left pending");
        }
        pending
    }

    /// Items currently queued, exit signals included
    pub fn queue_size(&self) -> usize {
        self.queue_rx.len()
    }

    pub fn queue_capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Configured threads of the current run; 0 unless Running
    pub fn thread_count(&self) -> usize {
        match &*self.lifecycle.read() {
            Lifecycle::Running(run) => run.config.threads,
            _ => 0,
        }
    }

    /// Worker threads of the current or last run still alive
    ///
    /// Stragglers detached by an earlier run are not counted.
    pub fn running_workers(&self) -> usize {
        self.running.load().load(Ordering::SeqCst)
    }

    pub fn state(&self) -> PoolState {
        self.lifecycle.read().state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == PoolState::Running
    }

    /// Counters of the current run, or of the last one when Idle
    pub fn stats(&self) -> PoolStatsSnapshot {
        self.stats.load().snapshot()
    }
}

impl<T, S> fmt::Debug for WorkerPool<T, S>
where
    T: Send + 'static,
    S: WorkerStrategy<T>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("state", &self.state())
            .field("running_workers", &self.running_workers())
            .field("queue_size", &self.queue_size())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<T, S> Drop for WorkerPool<T, S>
where
    T: Send + 'static,
    S: WorkerStrategy<T>,
{
    fn drop(&mut self) {
        if let Lifecycle::Running(run) = std::mem::replace(self.lifecycle.get_mut(), Lifecycle::Idle) {
            warn!(
                workers = run.workers.len(),
                "worker pool dropped while running; terminating workers"
            );
            run.terminate.store(true, Ordering::Release);
            for handle in run.workers {
                let _ = handle.join();
            }
        }
    }
}
