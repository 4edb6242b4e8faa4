/*!
 * Core Module
 * Locking primitives, scoped handles and error handling
 */

pub mod errors;
pub mod guard;
pub mod sync;

// Re-export for convenience
pub use errors::*;
pub use guard::{ExclusiveHandle, Guard, GuardMetadata, HandleState, SharedHandle};
pub use sync::{
    Condition, LockConfig, LockRegistry, Lockable, ReaperHandle, ReentrantRwLock, RegistryConfig,
};
