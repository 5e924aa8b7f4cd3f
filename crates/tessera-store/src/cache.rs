//! Copy-on-write cache-wrap overlays.
//!
//! `cache_wrap()` snapshots the substore map into an overlay of buffered
//! stores sharing one write horizon: mutations stay in the overlay until
//! its `write()` flushes every buffer to the parents, and are discarded if
//! the overlay is dropped instead.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use tessera_kv::KvPair;
use tessera_tree::ImmutableTree;

use crate::error::{Result, StoreError};
use crate::substore::{KvStore, StoreKey};

/// A buffered copy-on-write overlay over one substore.
///
/// Reads fall through to the parent unless shadowed; writes and deletes
/// stay in the buffer until [`write`](Self::write).
pub struct CacheKvStore {
    parent: Arc<dyn KvStore>,
    buffer: RwLock<BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
}

impl CacheKvStore {
    /// Wraps a parent store.
    pub fn new(parent: Arc<dyn KvStore>) -> Self {
        Self { parent, buffer: RwLock::new(BTreeMap::new()) }
    }

    /// Flushes the buffered mutations to the parent, in key order, and
    /// clears the buffer.
    pub fn write(&self) -> Result<()> {
        let mut buffer = self.buffer.write();
        for (key, value) in buffer.iter() {
            match value {
                Some(value) => self.parent.set(key, value)?,
                None => self.parent.delete(key)?,
            }
        }
        buffer.clear();
        Ok(())
    }
}

impl KvStore for CacheKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(shadowed) = self.buffer.read().get(key) {
            return Ok(shadowed.clone());
        }
        self.parent.get(key)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.buffer.write().insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.buffer.write().insert(key.to_vec(), None);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>> {
        // Merge the parent snapshot with the overlay: buffered writes win,
        // buffered deletions hide parent pairs.
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.parent.scan_prefix(prefix)?.into_iter().collect();

        for (key, value) in self.buffer.read().iter() {
            if !key.starts_with(prefix) {
                continue;
            }
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        Ok(merged.into_iter().collect())
    }
}

/// Read-only adapter over an immutable historical tree view.
pub(crate) struct ImmutableKv {
    view: ImmutableTree,
}

impl ImmutableKv {
    pub(crate) fn new(view: ImmutableTree) -> Self {
        Self { view }
    }
}

impl KvStore for ImmutableKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.view.get(key))
    }

    fn set(&self, _key: &[u8], _value: &[u8]) -> Result<()> {
        Err(StoreError::ReadOnlyStore)
    }

    fn delete(&self, _key: &[u8]) -> Result<()> {
        Err(StoreError::ReadOnlyStore)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>> {
        Ok(self.view.scan_prefix(prefix))
    }
}

/// An ephemeral overlay of the whole multi-store.
///
/// Independent of the parent: nothing reaches the underlying substores
/// unless [`write`](Self::write) is called.
pub struct CacheMultiStore {
    stores: HashMap<StoreKey, Arc<CacheKvStore>>,
    keys_by_name: HashMap<String, StoreKey>,
}

impl CacheMultiStore {
    pub(crate) fn new(
        stores: HashMap<StoreKey, Arc<CacheKvStore>>,
        keys_by_name: HashMap<String, StoreKey>,
    ) -> Self {
        Self { stores, keys_by_name }
    }

    /// The overlay store for a key.
    ///
    /// # Panics
    ///
    /// Panics if the key was not part of the wrapped multi-store.
    pub fn get_kv_store(&self, key: &StoreKey) -> Arc<CacheKvStore> {
        match self.stores.get(key) {
            Some(store) => store.clone(),
            None => panic!("store does not exist for key: {}", key.name()),
        }
    }

    /// The overlay store for a mount name, if mounted.
    pub fn get_kv_store_by_name(&self, name: &str) -> Option<Arc<CacheKvStore>> {
        let key = self.keys_by_name.get(name)?;
        self.stores.get(key).cloned()
    }

    /// Flushes every overlay to its parent substore — the single write
    /// horizon shared by the wrapped stores.
    pub fn write(&self) -> Result<()> {
        for store in self.stores.values() {
            store.write()?;
        }
        Ok(())
    }
}
