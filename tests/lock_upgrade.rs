/*!
 * Lock Upgrade Tests
 * Double-checked upgrade, deadlock avoidance and handle release semantics
 */

use ai_os_sync::{Guard, HandleState, LockError, Lockable, ReentrantRwLock, SyncError};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

/// Lazily filled slot protected by the Lockable helpers
struct LazySlot {
    lock: ReentrantRwLock,
    filled: AtomicBool,
    writers_inside: AtomicUsize,
    max_overlap: AtomicUsize,
    writes: AtomicUsize,
}

impl Lockable for LazySlot {
    fn rw_lock(&self) -> &ReentrantRwLock {
        &self.lock
    }
}

impl LazySlot {
    fn new() -> Self {
        Self {
            lock: ReentrantRwLock::named("lazy-slot"),
            filled: AtomicBool::new(false),
            writers_inside: AtomicUsize::new(0),
            max_overlap: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Upgrade whenever the slot is unfilled; `reset` empties it again after
    /// the write so every caller goes through the write path
    fn fill(&self, reset: bool) -> Result<bool, SyncError> {
        self.shared_upgradable(
            || Ok(self.filled.load(Ordering::SeqCst)),
            |filled| !filled,
            |_| {
                let inside = self.writers_inside.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_overlap.fetch_max(inside, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
                self.writes.fetch_add(1, Ordering::SeqCst);
                self.writers_inside.fetch_sub(1, Ordering::SeqCst);

                self.filled.store(!reset, Ordering::SeqCst);
                Ok(true)
            },
        )
    }
}

#[test]
#[serial]
fn test_upgrade_write_ops_never_overlap() {
    let slot = Arc::new(LazySlot::new());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let slot = slot.clone();
            thread::spawn(move || {
                for _ in 0..5 {
                    slot.fill(true).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(slot.max_overlap.load(Ordering::SeqCst), 1);
    assert_eq!(slot.writes.load(Ordering::SeqCst), 40);
}

#[test]
fn test_upgrade_runs_write_once_when_condition_settles() {
    let slot = Arc::new(LazySlot::new());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let slot = slot.clone();
            thread::spawn(move || slot.fill(false).unwrap())
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }

    // Second check under the exclusive lock skips the write for late comers
    assert_eq!(slot.writes.load(Ordering::SeqCst), 1);
    assert_eq!(slot.lock.reader_count(), 0);
    assert!(!slot.lock.is_write_locked());
}

#[test]
fn test_exclusive_from_shared_fails_fast() {
    let lock = Arc::new(ReentrantRwLock::new());
    let (tx, rx) = mpsc::channel();

    let worker = {
        let lock = lock.clone();
        thread::spawn(move || {
            let _shared = lock.acquire_shared();
            let started = Instant::now();
            let result = lock.acquire_exclusive().map(|_| ());
            tx.send((result, started.elapsed())).unwrap();
        })
    };

    let (result, elapsed) = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("exclusive acquisition hung");
    worker.join().unwrap();

    assert_eq!(result, Err(LockError::LockUpgradeNotPermitted { read_holds: 1 }));
    assert!(elapsed < Duration::from_secs(1));
}

#[test]
fn test_shared_holders_run_concurrently() {
    let lock = Arc::new(ReentrantRwLock::new());
    let barrier = Arc::new(std::sync::Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let lock = lock.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                lock.shared_locked(|| {
                    // Deadlocks unless all four hold the shared lock at once
                    barrier.wait();
                    Ok::<_, LockError>(())
                })
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap().is_ok());
    }
}

#[test]
fn test_writer_excludes_readers() {
    let lock = Arc::new(ReentrantRwLock::new());
    let exclusive = lock.acquire_exclusive().unwrap();

    let reader = {
        let lock = lock.clone();
        thread::spawn(move || lock.try_acquire_shared_for(Duration::from_millis(50)).is_some())
    };
    assert!(!reader.join().unwrap());

    drop(exclusive);

    let reader = {
        let lock = lock.clone();
        thread::spawn(move || lock.try_acquire_shared_for(Duration::from_millis(500)).is_some())
    };
    assert!(reader.join().unwrap());
}

#[test]
fn test_double_release_is_noop() {
    let lock = ReentrantRwLock::new();

    let mut shared = lock.acquire_shared();
    shared.release();
    shared.release();
    assert_eq!(shared.state(), HandleState::Released);
    assert!(!Guard::is_active(&shared));
    assert_eq!(lock.reader_count(), 0);

    let mut exclusive = lock.acquire_exclusive().unwrap();
    exclusive.release();
    exclusive.release();
    assert!(!lock.is_write_locked());

    // Still usable afterwards
    assert!(lock.exclusive_locked(|| Ok::<_, LockError>(())).is_ok());
}

#[test]
fn test_upgrade_twice_fails() {
    let lock = ReentrantRwLock::new();
    let mut shared = lock.acquire_shared();

    {
        let mut exclusive = shared.upgrade().unwrap();
        assert_eq!(exclusive.resource_type(), "exclusive_lock");
        exclusive.release();
        exclusive.release();
    }
    assert_eq!(shared.state(), HandleState::Active);
    assert_eq!(lock.read_hold_count(), 1);

    let err = shared.upgrade().err().unwrap();
    assert!(matches!(err, LockError::IllegalUpgradeState { .. }));
}

#[test]
fn test_lock_error_converts_into_sync_error() {
    let lock = ReentrantRwLock::new();
    let _shared = lock.acquire_shared();

    let result: Result<(), SyncError> = lock.exclusive_locked(|| Ok(()));
    assert!(matches!(
        result,
        Err(SyncError::Lock(LockError::LockUpgradeNotPermitted { read_holds: 1 }))
    ));
}
