/*!
 * Lock Configuration
 *
 * Per-lock observability settings
 */

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::time::Duration;

const DEFAULT_SLOW_ACQUIRE_THRESHOLD: Duration = Duration::from_millis(100);

/// Configuration for a [`ReentrantRwLock`](super::ReentrantRwLock)
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct LockConfig {
    /// Name carried into log fields
    pub name: Option<String>,
    /// Acquisitions that wait at least this long are logged at debug level;
    /// an omitted field keeps the default, an explicit `null` disables it
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>", no_default)]
    #[serde(default = "default_slow_acquire_threshold")]
    pub slow_acquire_threshold: Option<Duration>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            name: None,
            slow_acquire_threshold: default_slow_acquire_threshold(),
        }
    }
}

fn default_slow_acquire_threshold() -> Option<Duration> {
    Some(DEFAULT_SLOW_ACQUIRE_THRESHOLD)
}

impl LockConfig {
    /// Named lock with the default slow-acquire threshold
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Lock that never logs acquisition waits
    pub const fn quiet() -> Self {
        Self {
            name: None,
            slow_acquire_threshold: None,
        }
    }

    /// Override the slow-acquire threshold
    pub fn with_slow_acquire_threshold(mut self, threshold: Duration) -> Self {
        self.slow_acquire_threshold = Some(threshold);
        self
    }

    #[inline]
    pub(crate) fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("anonymous")
    }
}
