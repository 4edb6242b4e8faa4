/*!
 * Per-Key Lock Registry
 *
 * Lazily builds one lock object per key and keeps only a weak reference to
 * it. Dead entries are evicted explicitly by `purge` or a reaper thread.
 */

use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::fmt;
use std::hash::Hash;
use std::io;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reaper settings
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RegistryConfig {
    /// Time between purge sweeps
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub reap_interval: Duration,
    /// Name of the reaper thread
    pub thread_name: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            reap_interval: Duration::from_secs(30),
            thread_name: "lock-registry-reaper".to_string(),
        }
    }
}

/// One registry entry
///
/// `retired` is set under the slot lock when `purge` unlinks the slot, so a
/// `get` that raced the purge and still holds the old `Arc` retries instead
/// of publishing an object nobody else can find.
struct Slot<C> {
    target: Weak<C>,
    retired: bool,
}

type SlotRef<C> = Arc<Mutex<Slot<C>>>;

/// Registry handing out one shared object per key
///
/// # Guarantees
///
/// - While any caller keeps the `Arc` returned for key K alive, every `get(K)`
///   returns that same instance
/// - Different keys never share an instance
/// - Once every strong reference is gone the next `get` builds a fresh one
///
/// # Example
///
/// ```
/// use ai_os_sync::core::sync::{LockRegistry, ReentrantRwLock};
/// use std::sync::Arc;
///
/// let registry = LockRegistry::<String, ReentrantRwLock>::with_default();
/// let a = registry.get(&"user:1".to_string());
/// let b = registry.get(&"user:1".to_string());
/// assert!(Arc::ptr_eq(&a, &b));
/// ```
pub struct LockRegistry<K, C>
where
    K: Eq + Hash + Clone,
{
    entries: DashMap<K, SlotRef<C>, RandomState>,
    factory: Box<dyn Fn(&K) -> C + Send + Sync>,
}

impl<K, C> LockRegistry<K, C>
where
    K: Eq + Hash + Clone,
{
    /// Create a registry building objects with `factory`
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&K) -> C + Send + Sync + 'static,
    {
        Self {
            entries: DashMap::with_hasher(RandomState::new()),
            factory: Box::new(factory),
        }
    }

    /// Registry building objects with `C::default()`
    pub fn with_default() -> Self
    where
        C: Default,
    {
        Self::new(|_| C::default())
    }

    /// Get the live object for `key`, building it if none is alive
    ///
    /// A panicking factory propagates to the caller and leaves the entry
    /// empty.
    pub fn get(&self, key: &K) -> Arc<C> {
        loop {
            let slot = self.slot_for(key);
            let mut entry = slot.lock();
            if entry.retired {
                continue;
            }

            if let Some(existing) = entry.target.upgrade() {
                return existing;
            }

            let built = Arc::new((self.factory)(key));
            entry.target = Arc::downgrade(&built);
            return built;
        }
    }

    /// Look up or create the slot; the map shard lock is released on return
    fn slot_for(&self, key: &K) -> SlotRef<C> {
        if let Some(slot) = self.entries.get(key) {
            return slot.value().clone();
        }

        self.entries
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Slot {
                    target: Weak::new(),
                    retired: false,
                }))
            })
            .value()
            .clone()
    }

    /// Remove every entry whose object is no longer alive
    ///
    /// Entries busy in a concurrent `get` are skipped. Returns the number of
    /// entries removed.
    pub fn purge(&self) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, slot| match slot.try_lock() {
            Some(mut entry) if entry.target.strong_count() == 0 => {
                entry.retired = true;
                removed += 1;
                false
            }
            _ => true,
        });

        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "purged dead registry entries");
        }
        removed
    }

    /// Number of entries, live or dead
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries whose object is still alive
    ///
    /// Entries busy in a concurrent `get` count as alive.
    pub fn live_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .try_lock()
                    .map(|slot| slot.target.strong_count() > 0)
                    .unwrap_or(true)
            })
            .count()
    }
}

impl<K, C> LockRegistry<K, C>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    /// Start a background thread calling [`purge`](Self::purge) periodically
    ///
    /// The thread holds only a weak reference to the registry and exits when
    /// the registry is dropped or the handle is stopped.
    pub fn spawn_reaper(self: &Arc<Self>, config: &RegistryConfig) -> io::Result<ReaperHandle> {
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);
        let registry = Arc::downgrade(self);
        let interval = config.reap_interval;

        let thread = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                info!(interval_ms = interval.as_millis() as u64, "registry reaper started");
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(flume::RecvTimeoutError::Timeout) => match registry.upgrade() {
                            Some(registry) => {
                                registry.purge();
                            }
                            None => break,
                        },
                        Ok(()) | Err(flume::RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("registry reaper stopped");
            })?;

        Ok(ReaperHandle {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

impl<K, C> fmt::Debug for LockRegistry<K, C>
where
    K: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockRegistry")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Handle to a running reaper thread; stops and joins it on drop
pub struct ReaperHandle {
    stop: Option<flume::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ReaperHandle {
    /// Stop the reaper and wait for it to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .map(|thread| !thread.is_finished())
            .unwrap_or(false)
    }

    fn shutdown(&mut self) {
        drop(self.stop.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("registry reaper panicked");
            }
        }
    }
}

impl Drop for ReaperHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_registry() -> (LockRegistry<u32, u32>, Arc<AtomicUsize>) {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = builds.clone();
        let registry = LockRegistry::new(move |key: &u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            *key
        });
        (registry, builds)
    }

    #[test]
    fn test_same_instance_while_alive() {
        let (registry, builds) = counting_registry();
        let first = registry.get(&1);
        let second = registry.get(&1);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_distinct_keys() {
        let (registry, _) = counting_registry();
        let a = registry.get(&1);
        let b = registry.get(&2);

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.live_count(), 2);
    }

    #[test]
    fn test_rebuilt_after_drop() {
        let (registry, builds) = counting_registry();
        drop(registry.get(&1));
        let _again = registry.get(&1);

        assert_eq!(builds.load(Ordering::SeqCst), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_purge_keeps_live_entries() {
        let (registry, _) = counting_registry();
        let kept = registry.get(&1);
        drop(registry.get(&2));
        drop(registry.get(&3));

        assert_eq!(registry.purge(), 2);
        assert_eq!(registry.len(), 1);

        let again = registry.get(&1);
        assert!(Arc::ptr_eq(&kept, &again));
    }

    #[test]
    fn test_reaper_stops() {
        let (registry, _) = counting_registry();
        let registry = Arc::new(registry);
        drop(registry.get(&9));

        let config = RegistryConfig {
            reap_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let reaper = registry.spawn_reaper(&config).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !registry.is_empty() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(registry.is_empty());

        assert!(reaper.is_running());
        reaper.stop();
    }
}
