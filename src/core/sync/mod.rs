/*!
 * Synchronization Primitives
 *
 * Shared/exclusive locking with safe upgrade and a per-key lock registry:
 * - Reentrant read-write lock with per-thread hold counts
 * - `Lockable` helpers (scoped sections, double-checked upgrade)
 * - Conditions for waiting inside exclusive sections
 * - Weakly retained per-key lock objects with explicit eviction
 *
 * # Deadlock Avoidance
 *
 * A thread holding only shared holds that asks for the exclusive lock is
 * refused with `LockError::LockUpgradeNotPermitted` instead of waiting on
 * itself forever. Upgrades go through `SharedHandle::upgrade`, which gives
 * up the shared hold first.
 */

mod condition;
mod config;
mod lockable;
mod registry;
mod rwlock;

pub use condition::Condition;
pub use config::LockConfig;
pub use lockable::Lockable;
pub use registry::{LockRegistry, ReaperHandle, RegistryConfig};
pub use rwlock::ReentrantRwLock;
