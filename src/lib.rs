/*!
 * AI-OS Sync Library
 * In-process concurrency core: shared/exclusive locking with safe upgrade,
 * scoped lock handles, a per-key lock registry and a bounded worker pool
 */

pub mod core;
pub mod monitoring;
pub mod pool;

// Re-exports
pub use crate::core::errors::*;
pub use crate::core::guard::{ExclusiveHandle, Guard, HandleState, SharedHandle};
pub use crate::core::sync::{
    Condition, LockConfig, LockRegistry, Lockable, ReaperHandle, ReentrantRwLock, RegistryConfig,
};
pub use monitoring::init_tracing;
pub use pool::{
    from_fn, CompletionReport, FnStrategy, PoolConfig, PoolInterrupt, PoolState, PoolStatsSnapshot,
    QueueMode, WorkerPool, WorkerStrategy,
};
