/*!
 * Worker Pool Configuration
 *
 * Run parameters passed to `WorkerPool::start`
 */

use crate::core::errors::{PoolError, PoolResult};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::time::Duration;

/// How workers take items from the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueMode {
    /// Block until an item or exit signal arrives
    Blocking,
    /// Poll without blocking; a worker exits once the queue is empty
    Draining,
}

/// Worker pool run configuration
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct PoolConfig {
    /// Number of worker threads
    pub threads: usize,
    /// Dequeue behavior
    pub mode: QueueMode,
    /// Enqueue one exit signal per worker on graceful shutdown
    pub exit_signal: bool,
    /// How long to wait for workers after forced termination
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub grace_period: Duration,
    /// Worker thread name prefix; threads are named `{prefix}-{index}`
    pub thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            mode: QueueMode::Blocking,
            exit_signal: true,
            grace_period: Duration::from_secs(120),
            thread_name: "pool-worker".to_string(),
        }
    }
}

impl PoolConfig {
    /// Blocking workers stopped by exit signals
    pub fn blocking(threads: usize) -> Self {
        Self {
            threads,
            ..Default::default()
        }
    }

    /// Workers that exit once the queue runs dry
    pub fn draining(threads: usize) -> Self {
        Self {
            threads,
            mode: QueueMode::Draining,
            exit_signal: false,
            ..Default::default()
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = prefix.into();
        self
    }

    pub fn with_exit_signal(mut self, exit_signal: bool) -> Self {
        self.exit_signal = exit_signal;
        self
    }

    /// Reject configurations a pool cannot run
    pub fn validate(&self) -> PoolResult<()> {
        if self.threads == 0 {
            return Err(PoolError::InvalidThreadCount(self.threads));
        }
        if self.mode == QueueMode::Blocking && !self.exit_signal {
            return Err(PoolError::MissingExitSignal);
        }
        Ok(())
    }
}
