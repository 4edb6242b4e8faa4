/*!
 * Lockable Capability
 *
 * Locking helpers any type gains by exposing its ReentrantRwLock
 */

use super::rwlock::ReentrantRwLock;
use crate::core::errors::{LockError, LockResult};
use crate::core::guard::{ExclusiveHandle, SharedHandle};
use std::time::Duration;

/// Shared/exclusive locking helpers
///
/// Implementors only provide [`rw_lock`](Lockable::rw_lock); every helper
/// releases what it acquired on all exit paths, panics included.
///
/// Operations return `Result<R, E>` with `E: From<LockError>` so a refused
/// exclusive acquisition flows into the caller's own error type.
///
/// # Example
///
/// ```
/// use ai_os_sync::core::errors::LockError;
/// use ai_os_sync::core::sync::{Lockable, ReentrantRwLock};
/// use std::sync::atomic::{AtomicU64, Ordering};
///
/// struct Counter {
///     lock: ReentrantRwLock,
///     value: AtomicU64,
/// }
///
/// impl Lockable for Counter {
///     fn rw_lock(&self) -> &ReentrantRwLock {
///         &self.lock
///     }
/// }
///
/// let counter = Counter { lock: ReentrantRwLock::new(), value: AtomicU64::new(0) };
/// counter
///     .exclusive_locked(|| {
///         counter.value.fetch_add(1, Ordering::SeqCst);
///         Ok::<_, LockError>(())
///     })
///     .unwrap();
/// ```
pub trait Lockable {
    /// The primitive backing every helper
    fn rw_lock(&self) -> &ReentrantRwLock;

    /// Block until a shared hold is granted
    fn acquire_shared(&self) -> SharedHandle<'_> {
        SharedHandle::acquire(self.rw_lock())
    }

    /// Block until the exclusive lock is granted
    ///
    /// Fails fast with [`LockError::LockUpgradeNotPermitted`] if the calling
    /// thread holds shared holds but no exclusive hold.
    fn acquire_exclusive(&self) -> LockResult<ExclusiveHandle<'_>> {
        ExclusiveHandle::acquire(self.rw_lock())
    }

    /// Shared hold, or `None` once `timeout` elapses
    fn try_acquire_shared_for(&self, timeout: Duration) -> Option<SharedHandle<'_>> {
        SharedHandle::try_acquire_for(self.rw_lock(), timeout)
    }

    /// Exclusive hold, or `Ok(None)` once `timeout` elapses
    fn try_acquire_exclusive_for(
        &self,
        timeout: Duration,
    ) -> LockResult<Option<ExclusiveHandle<'_>>> {
        ExclusiveHandle::try_acquire_for(self.rw_lock(), timeout)
    }

    /// Run `op` under a shared hold
    fn shared_locked<R, E, F>(&self, op: F) -> Result<R, E>
    where
        F: FnOnce() -> Result<R, E>,
    {
        let _handle = self.acquire_shared();
        op()
    }

    /// Run `op` under the exclusive lock
    fn exclusive_locked<R, E, F>(&self, op: F) -> Result<R, E>
    where
        F: FnOnce() -> Result<R, E>,
        E: From<LockError>,
    {
        let _handle = self.acquire_exclusive()?;
        op()
    }

    /// Double-checked locking
    ///
    /// 1. Evaluate `check` under a shared hold
    /// 2. If `should_upgrade` rejects the value, return it
    /// 3. Otherwise upgrade, evaluate `check` again, and run `write_op` only
    ///    if `should_upgrade` still accepts the fresh value
    /// 4. Restore the shared hold, then release it
    ///
    /// `write_op` never runs concurrently with another `write_op` on the same
    /// lock; reads that need no upgrade stay fully concurrent.
    fn shared_upgradable<V, E, C, U, W>(
        &self,
        mut check: C,
        should_upgrade: U,
        write_op: W,
    ) -> Result<V, E>
    where
        C: FnMut() -> Result<V, E>,
        U: Fn(&V) -> bool,
        W: FnOnce(V) -> Result<V, E>,
        E: From<LockError>,
    {
        let mut shared = self.acquire_shared();
        let observed = check()?;
        if !should_upgrade(&observed) {
            return Ok(observed);
        }

        let exclusive = shared.upgrade()?;
        let current = check()?;
        let result = if should_upgrade(&current) {
            write_op(current)
        } else {
            Ok(current)
        };
        drop(exclusive);

        result
    }
}

impl Lockable for ReentrantRwLock {
    #[inline]
    fn rw_lock(&self) -> &ReentrantRwLock {
        self
    }
}
