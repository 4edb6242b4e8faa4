/*!
 * Reentrant Read-Write Lock
 *
 * Shared/exclusive lock with per-thread hold counts, built on a
 * parking_lot mutex/condvar pair
 */

use super::config::LockConfig;
use crate::core::errors::{LockError, LockResult};
use ahash::RandomState;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::fmt;
use std::thread::{self, ThreadId};
use std::time::Instant;
use tracing::debug;

/// Bookkeeping guarded by the internal mutex
struct LockState {
    writer: Option<ThreadId>,
    write_holds: usize,
    readers: HashMap<ThreadId, usize, RandomState>,
    waiting_writers: usize,
}

impl LockState {
    fn new() -> Self {
        Self {
            writer: None,
            write_holds: 0,
            readers: HashMap::with_hasher(RandomState::new()),
            waiting_writers: 0,
        }
    }

    #[inline]
    fn read_holds(&self, id: ThreadId) -> usize {
        self.readers.get(&id).copied().unwrap_or(0)
    }

    /// Readers already inside (and the writer itself) re-enter freely;
    /// newcomers yield to queued writers
    #[inline]
    fn can_read(&self, id: ThreadId) -> bool {
        match self.writer {
            Some(owner) => owner == id,
            None => self.waiting_writers == 0 || self.readers.contains_key(&id),
        }
    }

    #[inline]
    fn can_write(&self) -> bool {
        self.writer.is_none() && self.readers.is_empty()
    }
}

/// Reentrant shared/exclusive lock
///
/// # Reentrancy
///
/// - The writer may re-acquire the exclusive lock and may take shared holds
/// - A reader may re-acquire shared holds even while writers are queued
/// - A reader with no exclusive hold asking for the exclusive lock is refused
///   with [`LockError::LockUpgradeNotPermitted`] instead of deadlocking
///
/// Acquisition and release go through the scoped handles returned by the
/// [`Lockable`](super::Lockable) helpers.
pub struct ReentrantRwLock {
    state: Mutex<LockState>,
    readers_cv: Condvar,
    writers_cv: Condvar,
    config: LockConfig,
}

impl ReentrantRwLock {
    pub fn new() -> Self {
        Self::with_config(LockConfig::default())
    }

    pub fn with_config(config: LockConfig) -> Self {
        Self {
            state: Mutex::new(LockState::new()),
            readers_cv: Condvar::new(),
            writers_cv: Condvar::new(),
            config,
        }
    }

    /// Named lock with default settings
    pub fn named(name: impl Into<String>) -> Self {
        Self::with_config(LockConfig::named(name))
    }

    #[inline]
    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Shared holds of the calling thread
    pub fn read_hold_count(&self) -> usize {
        self.state.lock().read_holds(thread::current().id())
    }

    /// Exclusive holds of the calling thread
    pub fn write_hold_count(&self) -> usize {
        let me = thread::current().id();
        let state = self.state.lock();
        if state.writer == Some(me) {
            state.write_holds
        } else {
            0
        }
    }

    /// Shared holds across all threads
    pub fn reader_count(&self) -> usize {
        self.state.lock().readers.values().sum()
    }

    pub fn is_write_locked(&self) -> bool {
        self.state.lock().writer.is_some()
    }

    pub fn is_write_locked_by_current_thread(&self) -> bool {
        self.state.lock().writer == Some(thread::current().id())
    }

    pub fn has_queued_writers(&self) -> bool {
        self.state.lock().waiting_writers > 0
    }

    /// Block until a shared hold is granted
    pub(crate) fn lock_shared(&self) {
        self.acquire_shared_until(None);
    }

    /// Returns false if the deadline passed first
    pub(crate) fn try_lock_shared_until(&self, deadline: Instant) -> bool {
        self.acquire_shared_until(Some(deadline))
    }

    /// Block until the exclusive lock is granted
    pub(crate) fn lock_exclusive(&self) -> LockResult<()> {
        self.acquire_exclusive_until(None).map(|_| ())
    }

    /// Returns `Ok(false)` if the deadline passed first
    pub(crate) fn try_lock_exclusive_until(&self, deadline: Instant) -> LockResult<bool> {
        self.acquire_exclusive_until(Some(deadline))
    }

    fn acquire_shared_until(&self, deadline: Option<Instant>) -> bool {
        let me = thread::current().id();
        let started = Instant::now();
        let mut state = self.state.lock();

        while !state.can_read(me) {
            match deadline {
                Some(deadline) => {
                    if self.readers_cv.wait_until(&mut state, deadline).timed_out()
                        && !state.can_read(me)
                    {
                        return false;
                    }
                }
                None => self.readers_cv.wait(&mut state),
            }
        }

        *state.readers.entry(me).or_insert(0) += 1;
        drop(state);

        self.note_wait("shared", started);
        true
    }

    fn acquire_exclusive_until(&self, deadline: Option<Instant>) -> LockResult<bool> {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if state.writer == Some(me) {
            state.write_holds += 1;
            return Ok(true);
        }

        let read_holds = state.read_holds(me);
        if read_holds > 0 {
            debug!(
                lock = self.config.display_name(),
                read_holds, "refusing exclusive acquisition from a shared holder"
            );
            return Err(LockError::LockUpgradeNotPermitted { read_holds });
        }

        let started = Instant::now();
        state.waiting_writers += 1;

        while !state.can_write() {
            match deadline {
                Some(deadline) => {
                    if self.writers_cv.wait_until(&mut state, deadline).timed_out()
                        && !state.can_write()
                    {
                        state.waiting_writers -= 1;
                        if state.waiting_writers == 0 {
                            // Readers parked behind us may proceed now
                            self.readers_cv.notify_all();
                        }
                        return Ok(false);
                    }
                }
                None => self.writers_cv.wait(&mut state),
            }
        }

        state.waiting_writers -= 1;
        state.writer = Some(me);
        state.write_holds = 1;
        drop(state);

        self.note_wait("exclusive", started);
        Ok(true)
    }

    /// Drop one shared hold of the calling thread
    pub(crate) fn unlock_shared(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();

        let remaining = match state.readers.get_mut(&me) {
            Some(holds) => {
                *holds -= 1;
                *holds
            }
            None => {
                debug_assert!(false, "unlock_shared without a shared hold");
                return;
            }
        };

        if remaining == 0 {
            state.readers.remove(&me);
            if state.readers.is_empty() && state.waiting_writers > 0 {
                self.writers_cv.notify_all();
            }
        }
    }

    /// Drop one exclusive hold of the calling thread
    pub(crate) fn unlock_exclusive(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if state.writer != Some(me) {
            debug_assert!(false, "unlock_exclusive by a thread that does not own the lock");
            return;
        }

        state.write_holds -= 1;
        if state.write_holds == 0 {
            state.writer = None;
            self.release_waiters(&state);
        }
    }

    /// Release every exclusive hold of the calling thread, returning the count
    ///
    /// Used by condition waits. Refused while the thread also holds shared
    /// holds: re-acquiring the exclusive lock afterwards would wait on itself.
    pub(crate) fn suspend_exclusive(&self) -> LockResult<usize> {
        let me = thread::current().id();
        let mut state = self.state.lock();

        let read_holds = state.read_holds(me);
        if read_holds > 0 {
            return Err(LockError::LockUpgradeNotPermitted { read_holds });
        }
        if state.writer != Some(me) {
            return Err(LockError::illegal_upgrade(
                "condition wait requires the exclusive lock",
            ));
        }

        let holds = state.write_holds;
        state.writer = None;
        state.write_holds = 0;
        self.release_waiters(&state);
        Ok(holds)
    }

    /// Re-acquire the exclusive lock with a saved hold count
    pub(crate) fn resume_exclusive(&self, holds: usize) {
        let me = thread::current().id();
        let mut state = self.state.lock();

        state.waiting_writers += 1;
        while !state.can_write() {
            self.writers_cv.wait(&mut state);
        }
        state.waiting_writers -= 1;
        state.writer = Some(me);
        state.write_holds = holds;
    }

    #[inline]
    fn release_waiters(&self, state: &LockState) {
        self.readers_cv.notify_all();
        if state.waiting_writers > 0 {
            self.writers_cv.notify_all();
        }
    }

    #[inline]
    fn note_wait(&self, mode: &'static str, started: Instant) {
        if let Some(threshold) = self.config.slow_acquire_threshold {
            let waited = started.elapsed();
            if waited >= threshold {
                debug!(
                    lock = self.config.display_name(),
                    mode,
                    waited_us = waited.as_micros() as u64,
                    "slow lock acquisition"
                );
            }
        }
    }
}

impl Default for ReentrantRwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReentrantRwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ReentrantRwLock")
            .field("name", &self.config.display_name())
            .field("write_locked", &state.writer.is_some())
            .field("write_holds", &state.write_holds)
            .field("readers", &state.readers.values().sum::<usize>())
            .field("waiting_writers", &state.waiting_writers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_reentrant_shared() {
        let lock = ReentrantRwLock::new();
        lock.lock_shared();
        lock.lock_shared();
        assert_eq!(lock.read_hold_count(), 2);
        assert_eq!(lock.reader_count(), 2);

        lock.unlock_shared();
        lock.unlock_shared();
        assert_eq!(lock.read_hold_count(), 0);
    }

    #[test]
    fn test_reentrant_exclusive_and_downgrade() {
        let lock = ReentrantRwLock::new();
        lock.lock_exclusive().unwrap();
        lock.lock_exclusive().unwrap();
        assert_eq!(lock.write_hold_count(), 2);

        // Writer may take shared holds
        lock.lock_shared();
        assert_eq!(lock.read_hold_count(), 1);

        lock.unlock_exclusive();
        lock.unlock_exclusive();
        assert!(!lock.is_write_locked());
        assert_eq!(lock.read_hold_count(), 1);
        lock.unlock_shared();
    }

    #[test]
    fn test_exclusive_refused_for_reader() {
        let lock = ReentrantRwLock::new();
        lock.lock_shared();

        let err = lock.lock_exclusive().unwrap_err();
        assert_eq!(err, LockError::LockUpgradeNotPermitted { read_holds: 1 });

        lock.unlock_shared();
        assert!(lock.lock_exclusive().is_ok());
        lock.unlock_exclusive();
    }

    #[test]
    fn test_timed_exclusive_gives_up() {
        let lock = Arc::new(ReentrantRwLock::new());
        lock.lock_exclusive().unwrap();

        let other = lock.clone();
        let acquired = std::thread::spawn(move || {
            other
                .try_lock_exclusive_until(Instant::now() + Duration::from_millis(50))
                .unwrap()
        })
        .join()
        .unwrap();

        assert!(!acquired);
        assert!(!lock.has_queued_writers());
        lock.unlock_exclusive();
    }

    #[test]
    fn test_suspend_and_resume() {
        let lock = ReentrantRwLock::new();
        lock.lock_exclusive().unwrap();
        lock.lock_exclusive().unwrap();

        let holds = lock.suspend_exclusive().unwrap();
        assert_eq!(holds, 2);
        assert!(!lock.is_write_locked());

        lock.resume_exclusive(holds);
        assert_eq!(lock.write_hold_count(), 2);
        lock.unlock_exclusive();
        lock.unlock_exclusive();
    }

    #[test]
    fn test_method_calls_resolve_to_lockable_helpers() {
        use crate::core::sync::Lockable;

        let lock = ReentrantRwLock::new();
        {
            let _shared = lock.acquire_shared();
            assert_eq!(lock.read_hold_count(), 1);
        }
        {
            let _exclusive = lock.acquire_exclusive().unwrap();
            assert!(lock.is_write_locked_by_current_thread());
        }
        assert_eq!(lock.reader_count(), 0);
        assert!(!lock.is_write_locked());
    }
}
