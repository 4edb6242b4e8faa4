/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for lock operations
pub type LockResult<T> = Result<T, LockError>;

/// Result type for worker pool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Result type for operations that may fail in any subsystem
pub type SyncResult<T> = Result<T, SyncError>;

/// Lock misuse and deadlock-avoidance errors
///
/// Neither variant is transient: retrying the same call from the same thread
/// produces the same error.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum LockError {
    #[error("Illegal upgrade state: {reason}")]
    #[diagnostic(
        code(lock::illegal_upgrade_state),
        help("A shared handle can be upgraded once, and only while it holds the shared lock.")
    )]
    IllegalUpgradeState { reason: String },

    #[error("Lock upgrade not permitted: thread holds {read_holds} shared hold(s) and no exclusive hold")]
    #[diagnostic(
        code(lock::upgrade_not_permitted),
        help("Release every shared hold before acquiring the exclusive lock, or use SharedHandle::upgrade.")
    )]
    LockUpgradeNotPermitted { read_holds: usize },
}

impl LockError {
    #[inline]
    pub(crate) fn illegal_upgrade(reason: impl Into<String>) -> Self {
        LockError::IllegalUpgradeState {
            reason: reason.into(),
        }
    }
}

/// Worker pool lifecycle errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum PoolError {
    #[error("Worker pool is already running")]
    #[diagnostic(
        code(pool::already_running),
        help("Call wait_for_completion before starting the pool again.")
    )]
    AlreadyRunning,

    #[error("Blocking mode requires an exit signal")]
    #[diagnostic(
        code(pool::missing_exit_signal),
        help("Workers in blocking mode only stop on an exit signal. Enable exit_signal or use draining mode.")
    )]
    MissingExitSignal,

    #[error("Invalid worker thread count: {0}")]
    #[diagnostic(
        code(pool::invalid_thread_count),
        help("A pool needs at least one worker thread.")
    )]
    InvalidThreadCount(usize),

    #[error("Failed to spawn worker thread: {0}")]
    #[diagnostic(
        code(pool::spawn_failed),
        help("The OS refused to create a thread. Check thread limits and available memory.")
    )]
    SpawnFailed(String),
}

/// Unified error type with miette diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum SyncError {
    #[error("Lock error: {0}")]
    #[diagnostic(transparent)]
    Lock(#[from] LockError),

    #[error("Pool error: {0}")]
    #[diagnostic(transparent)]
    Pool(#[from] PoolError),

    #[error("Internal error: {0}")]
    #[diagnostic(
        code(sync::internal_error),
        help("An unexpected internal error occurred. Please report this issue.")
    )]
    Internal(String),
}

impl From<String> for SyncError {
    fn from(msg: String) -> Self {
        SyncError::Internal(msg)
    }
}

impl From<&str> for SyncError {
    fn from(msg: &str) -> Self {
        SyncError::Internal(msg.to_string())
    }
}
