/*!
 * Lock Handles
 *
 * Scoped shared/exclusive holds with a one-time upgrade path
 */

use super::traits::Guard;
use super::GuardMetadata;
use crate::core::errors::{LockError, LockResult};
use crate::core::sync::{Condition, ReentrantRwLock};
use std::marker::PhantomData;
use std::time::{Duration, Instant};
use tracing::trace;

/// Lifecycle of a [`SharedHandle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Holding the shared lock
    Active,
    /// Shared hold given up while an upgraded child holds the exclusive lock
    Suspended,
    /// Released for good
    Released,
}

/// Scoped shared hold
///
/// # States
///
/// - `Active` → `Released` on [`release`](SharedHandle::release) or drop
/// - `Active` → `Suspended` → `Active` across an [`upgrade`](SharedHandle::upgrade);
///   the child handle borrows the parent, so the parent cannot be touched
///   while suspended
///
/// Handles are bound to the acquiring thread and are not `Send`.
pub struct SharedHandle<'a> {
    lock: &'a ReentrantRwLock,
    state: HandleState,
    upgraded: bool,
    metadata: GuardMetadata,
    _not_send: PhantomData<*const ()>,
}

impl<'a> SharedHandle<'a> {
    pub(crate) fn acquire(lock: &'a ReentrantRwLock) -> Self {
        lock.lock_shared();
        Self::held(lock)
    }

    pub(crate) fn try_acquire_for(lock: &'a ReentrantRwLock, timeout: Duration) -> Option<Self> {
        lock.try_lock_shared_until(Instant::now() + timeout)
            .then(|| Self::held(lock))
    }

    fn held(lock: &'a ReentrantRwLock) -> Self {
        Self {
            lock,
            state: HandleState::Active,
            upgraded: false,
            metadata: GuardMetadata::new("shared_lock"),
            _not_send: PhantomData,
        }
    }

    #[inline]
    pub fn state(&self) -> HandleState {
        self.state
    }

    /// Whether [`upgrade`](Self::upgrade) already succeeded on this handle
    #[inline]
    pub fn is_upgraded(&self) -> bool {
        self.upgraded
    }

    /// Trade the shared hold for the exclusive lock
    ///
    /// The shared hold is released before the exclusive lock is requested, so
    /// other writers may run in between: re-check any condition observed
    /// under the shared hold. Releasing the returned handle re-acquires the
    /// shared hold on this one.
    ///
    /// # Errors
    ///
    /// - [`LockError::IllegalUpgradeState`] if the handle is not active or was
    ///   already upgraded
    /// - [`LockError::LockUpgradeNotPermitted`] if the thread still holds other
    ///   shared holds on the same lock; this handle stays active
    pub fn upgrade(&mut self) -> LockResult<ExclusiveHandle<'_>> {
        if self.upgraded {
            return Err(LockError::illegal_upgrade("handle was already upgraded"));
        }
        if self.state != HandleState::Active {
            return Err(LockError::illegal_upgrade(format!(
                "handle is {:?}, not active",
                self.state
            )));
        }

        let lock = self.lock;
        lock.unlock_shared();
        self.state = HandleState::Suspended;

        if let Err(err) = lock.lock_exclusive() {
            lock.lock_shared();
            self.state = HandleState::Active;
            return Err(err);
        }

        self.upgraded = true;
        trace!(lock = lock.config().display_name(), "shared handle upgraded");

        Ok(ExclusiveHandle {
            lock,
            held: true,
            parent: Some(&mut self.state),
            metadata: GuardMetadata::new("exclusive_lock"),
            _not_send: PhantomData,
        })
    }

    /// Give up the shared hold; later calls do nothing
    pub fn release(&mut self) {
        if self.state != HandleState::Active {
            return;
        }
        self.lock.unlock_shared();
        self.state = HandleState::Released;
        trace!(
            lock = self.lock.config().display_name(),
            held_us = self.metadata.lifetime_micros(),
            "shared hold released"
        );
    }
}

impl Guard for SharedHandle<'_> {
    fn resource_type(&self) -> &'static str {
        self.metadata.resource_type
    }

    fn metadata(&self) -> &GuardMetadata {
        &self.metadata
    }

    fn is_active(&self) -> bool {
        self.state == HandleState::Active
    }

    fn release(&mut self) {
        SharedHandle::release(self)
    }
}

impl Drop for SharedHandle<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Scoped exclusive hold
///
/// Either acquired directly or produced by [`SharedHandle::upgrade`]. In the
/// latter case it borrows the parent and, on release, re-acquires the parent's
/// shared hold before returning.
pub struct ExclusiveHandle<'a> {
    lock: &'a ReentrantRwLock,
    held: bool,
    parent: Option<&'a mut HandleState>,
    metadata: GuardMetadata,
    _not_send: PhantomData<*const ()>,
}

impl<'a> ExclusiveHandle<'a> {
    pub(crate) fn acquire(lock: &'a ReentrantRwLock) -> LockResult<Self> {
        lock.lock_exclusive()?;
        Ok(Self::held(lock))
    }

    pub(crate) fn try_acquire_for(
        lock: &'a ReentrantRwLock,
        timeout: Duration,
    ) -> LockResult<Option<Self>> {
        let acquired = lock.try_lock_exclusive_until(Instant::now() + timeout)?;
        Ok(acquired.then(|| Self::held(lock)))
    }

    fn held(lock: &'a ReentrantRwLock) -> Self {
        Self {
            lock,
            held: true,
            parent: None,
            metadata: GuardMetadata::new("exclusive_lock"),
            _not_send: PhantomData,
        }
    }

    /// Whether this handle came from [`SharedHandle::upgrade`]
    #[inline]
    pub fn is_upgrade(&self) -> bool {
        self.parent.is_some()
    }

    /// Release the lock and block until `condition` is signalled
    ///
    /// All exclusive holds of the thread are given up while waiting and
    /// restored before returning. Wakeups may be spurious; re-check the
    /// awaited state in a loop.
    pub fn wait(&mut self, condition: &Condition) -> LockResult<()> {
        self.ensure_held()?;
        condition.park(self.lock, None).map(|_| ())
    }

    /// Like [`wait`](Self::wait) with a timeout; returns false on timeout
    pub fn wait_for(&mut self, condition: &Condition, timeout: Duration) -> LockResult<bool> {
        self.ensure_held()?;
        condition.park(self.lock, Some(Instant::now() + timeout))
    }

    fn ensure_held(&self) -> LockResult<()> {
        if self.held {
            Ok(())
        } else {
            Err(LockError::illegal_upgrade("exclusive handle already released"))
        }
    }

    /// Give up the exclusive hold; later calls do nothing
    pub fn release(&mut self) {
        if !self.held {
            return;
        }
        self.held = false;
        self.lock.unlock_exclusive();

        if let Some(parent) = self.parent.as_deref_mut() {
            self.lock.lock_shared();
            *parent = HandleState::Active;
        }

        trace!(
            lock = self.lock.config().display_name(),
            held_us = self.metadata.lifetime_micros(),
            restored_shared = self.parent.is_some(),
            "exclusive hold released"
        );
    }
}

impl Guard for ExclusiveHandle<'_> {
    fn resource_type(&self) -> &'static str {
        self.metadata.resource_type
    }

    fn metadata(&self) -> &GuardMetadata {
        &self.metadata
    }

    fn is_active(&self) -> bool {
        self.held
    }

    fn release(&mut self) {
        ExclusiveHandle::release(self)
    }
}

impl Drop for ExclusiveHandle<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
