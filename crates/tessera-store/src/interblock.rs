//! Inter-block read cache.
//!
//! A persistent cache around versioned substores that memoises reads across
//! commit boundaries. The multi-store installs it once; at every load each
//! versioned substore is given its per-name cache slot, so the memoised
//! entries survive reloads. Wrapping happens only at load time and only on
//! the primary substore — the cache is a slot inside the substore, so a
//! wrapped store can never be wrapped again, and the primary tree is always
//! reachable unwrapped via [`crate::VersionedStore::tree`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Default per-store entry capacity.
const DEFAULT_STORE_CAPACITY: usize = 10_000;

/// Read cache for a single versioned substore.
///
/// Caches both present values and confirmed absences. Capacity-capped, not
/// LRU: when full, an arbitrary entry is evicted.
pub struct StoreCache {
    entries: Mutex<HashMap<Vec<u8>, Option<Vec<u8>>>>,
    capacity: usize,
}

impl StoreCache {
    fn new(capacity: usize) -> Self {
        Self { entries: Mutex::new(HashMap::new()), capacity }
    }

    /// A cached read: `None` for a miss, `Some(None)` for a cached absence.
    pub fn get(&self, key: &[u8]) -> Option<Option<Vec<u8>>> {
        self.entries.lock().get(key).cloned()
    }

    /// Records a read or write result.
    pub fn put(&self, key: &[u8], value: Option<Vec<u8>>) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity && !entries.contains_key(key) {
            let evict = entries.keys().next().cloned();
            if let Some(evict) = evict {
                entries.remove(&evict);
            }
        }
        entries.insert(key.to_vec(), value);
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// The multi-store's persistent cache manager: one [`StoreCache`] per store
/// name, handed out at load time.
pub struct InterBlockCache {
    slots: Mutex<HashMap<String, Arc<StoreCache>>>,
    store_capacity: usize,
}

impl InterBlockCache {
    /// Creates a cache manager with the default per-store capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_STORE_CAPACITY)
    }

    /// Creates a cache manager with an explicit per-store entry capacity.
    pub fn with_capacity(store_capacity: usize) -> Self {
        Self { slots: Mutex::new(HashMap::new()), store_capacity }
    }

    /// The cache slot for a store name, created on first use.
    ///
    /// Subsequent loads receive the same slot, which is what lets memoised
    /// reads survive across loads and commits.
    pub fn store_cache(&self, name: &str) -> Arc<StoreCache> {
        let mut slots = self.slots.lock();
        slots
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(StoreCache::new(self.store_capacity)))
            .clone()
    }
}

impl Default for InterBlockCache {
    fn default() -> Self {
        Self::new()
    }
}
