/*!
 * Bounded Worker Pool
 *
 * Fixed-size thread pool consuming a blocking producer/consumer queue, with
 * pluggable per-worker business logic.
 *
 * # Architecture
 *
 * - **Queue**: `flume` channel, bounded or unbounded, shared by all producers
 *   and workers
 * - **Exit signals**: a tagged `Shutdown` envelope, one per worker, instead of
 *   a sentinel item
 * - **Forced termination**: a shared terminate flag that blocked takes poll
 *   between timed receives
 * - **Completion**: each worker reports its exit on a done channel, even when
 *   it panics
 *
 * # Failure Containment
 *
 * A failing item never stops its worker; a failing `initialize` stops only
 * that worker. Failures surface through logs, `WorkerStrategy::handle_failure`
 * and the run counters, not through a per-item return channel.
 */

mod config;
mod manager;
mod strategy;
mod types;
mod worker;

pub use config::{PoolConfig, QueueMode};
pub use manager::WorkerPool;
pub use strategy::{from_fn, FnStrategy, WorkerStrategy};
pub use types::{CompletionReport, PoolInterrupt, PoolState, PoolStatsSnapshot};
