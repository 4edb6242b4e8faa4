/*!
 * Guard Traits
 *
 * Core abstraction for scoped lock handles
 */

use super::GuardMetadata;

/// Core guard trait
///
/// All handles implement this to provide:
/// - Resource type identification
/// - Metadata access
/// - Manual, idempotent release
pub trait Guard {
    /// Resource type name for logging/debugging
    fn resource_type(&self) -> &'static str;

    /// Get guard metadata
    fn metadata(&self) -> &GuardMetadata;

    /// Check if the guarded resource is currently held
    fn is_active(&self) -> bool;

    /// Manually release the resource
    ///
    /// Safe to call more than once; later calls do nothing. `Drop` calls it
    /// as well.
    fn release(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestGuard {
        metadata: GuardMetadata,
        active: bool,
        releases: usize,
    }

    impl Guard for TestGuard {
        fn resource_type(&self) -> &'static str {
            "test"
        }

        fn metadata(&self) -> &GuardMetadata {
            &self.metadata
        }

        fn is_active(&self) -> bool {
            self.active
        }

        fn release(&mut self) {
            if self.active {
                self.active = false;
                self.releases += 1;
            }
        }
    }

    #[test]
    fn test_guard_release_is_idempotent() {
        let mut guard = TestGuard {
            metadata: GuardMetadata::new("test"),
            active: true,
            releases: 0,
        };

        assert!(guard.is_active());
        guard.release();
        guard.release();
        assert!(!guard.is_active());
        assert_eq!(guard.releases, 1);
        assert_eq!(guard.metadata().resource_type, "test");
    }
}
