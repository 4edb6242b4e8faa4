/*!
 * Scoped Lock Handles
 *
 * RAII handles over a [`ReentrantRwLock`](crate::core::sync::ReentrantRwLock)
 * with guaranteed, idempotent release.
 *
 * ## Handle Types
 *
 * - **SharedHandle**: Holds one shared hold; may be upgraded once
 * - **ExclusiveHandle**: Holds one exclusive hold; when produced by an
 *   upgrade, restores the parent's shared hold on release
 *
 * ## Example
 *
 * ```rust
 * use ai_os_sync::core::sync::{Lockable, ReentrantRwLock};
 *
 * let lock = ReentrantRwLock::new();
 * let mut shared = lock.acquire_shared();
 * {
 *     let _exclusive = shared.upgrade().unwrap();
 *     // Exclusive section
 * } // Shared hold restored here
 * shared.release();
 * shared.release(); // No-op
 * ```
 */

mod lock;
mod traits;

pub use lock::{ExclusiveHandle, HandleState, SharedHandle};
pub use traits::Guard;

/// Guard metadata for observability
#[derive(Debug, Clone)]
pub struct GuardMetadata {
    pub resource_type: &'static str,
    pub creation_time: std::time::Instant,
}

impl GuardMetadata {
    #[inline]
    pub fn new(resource_type: &'static str) -> Self {
        Self {
            resource_type,
            creation_time: std::time::Instant::now(),
        }
    }

    #[inline]
    pub fn lifetime_micros(&self) -> u64 {
        self.creation_time.elapsed().as_micros() as u64
    }
}
