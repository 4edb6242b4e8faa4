/*!
 * Lock Conditions
 *
 * Wait/signal inside an exclusive section of a ReentrantRwLock
 */

use super::rwlock::ReentrantRwLock;
use crate::core::errors::LockResult;
use parking_lot::{Condvar, Mutex};
use std::time::Instant;

/// Condition variable bound to exclusive sections
///
/// Waiters register under the condition's own mutex before giving up the
/// exclusive lock, so a signal sent after the waiter released the lock is
/// never lost.
#[derive(Debug, Default)]
pub struct Condition {
    generation: Mutex<u64>,
    condvar: Condvar,
}

impl Condition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake one waiter
    pub fn signal_one(&self) {
        *self.generation.lock() += 1;
        self.condvar.notify_one();
    }

    /// Wake all waiters
    pub fn signal_all(&self) {
        *self.generation.lock() += 1;
        self.condvar.notify_all();
    }

    /// Suspend the caller's exclusive holds, wait, then restore them
    ///
    /// Returns false if the deadline passed without a signal.
    pub(crate) fn park(&self, lock: &ReentrantRwLock, deadline: Option<Instant>) -> LockResult<bool> {
        let mut generation = self.generation.lock();
        let observed = *generation;
        let holds = lock.suspend_exclusive()?;

        let mut signalled = true;
        while *generation == observed {
            match deadline {
                Some(deadline) => {
                    if self.condvar.wait_until(&mut generation, deadline).timed_out() {
                        signalled = *generation != observed;
                        break;
                    }
                }
                None => self.condvar.wait(&mut generation),
            }
        }
        drop(generation);

        lock.resume_exclusive(holds);
        Ok(signalled)
    }
}
