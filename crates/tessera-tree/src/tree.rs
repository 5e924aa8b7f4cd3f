//! The live versioned tree.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use snafu::ResultExt;
use tracing::debug;

use tessera_kv::{KvBackend, KvPair, WriteBatch};
use tessera_types::{decode, encode, CommitId, MerkleProof, PruningStrategy};

use crate::{
    entries_root, CodecSnafu, ExportItem, ImmutableTree, KvSnafu, Result, TreeError, VersionRecord,
};

const RECORD_PREFIX: &[u8] = b"c/";
const ENTRY_PREFIX: &[u8] = b"v/";

fn record_key(version: i64) -> Vec<u8> {
    let mut key = RECORD_PREFIX.to_vec();
    key.extend_from_slice(&version.to_be_bytes());
    key
}

fn entry_prefix(version: i64) -> Vec<u8> {
    let mut prefix = ENTRY_PREFIX.to_vec();
    prefix.extend_from_slice(&version.to_be_bytes());
    prefix.push(b'/');
    prefix
}

fn entry_key(version: i64, key: &[u8]) -> Vec<u8> {
    let mut full = entry_prefix(version);
    full.extend_from_slice(key);
    full
}

struct TreeInner {
    /// Working entry set; `None` until first access under lazy loading.
    working: Option<BTreeMap<Vec<u8>, Vec<u8>>>,
    last_commit_id: CommitId,
    pruning: PruningStrategy,
}

/// A mutable key/value tree with per-version commitments.
///
/// All methods take `&self`; the working set lives behind a lock so the
/// multi-store's copy-on-write overlays can share the handle. Writers are
/// serialised by the caller.
pub struct VersionedTree {
    backend: Arc<dyn KvBackend>,
    inner: RwLock<TreeInner>,
}

impl VersionedTree {
    /// Opens the tree at a commit id.
    ///
    /// A zero commit id opens an empty tree. Otherwise the persisted
    /// version record must exist and, when the id carries a hash, agree
    /// with it. With `lazy`, entry loading is deferred to first access.
    ///
    /// # Errors
    ///
    /// Returns `VersionNotFound` for an unknown version, `RootMismatch`
    /// when the persisted root disagrees with the commit id.
    pub fn open(
        backend: Arc<dyn KvBackend>,
        commit_id: &CommitId,
        pruning: PruningStrategy,
        lazy: bool,
    ) -> Result<Self> {
        let (last_commit_id, working) = if commit_id.is_zero() {
            (CommitId::zero(), Some(BTreeMap::new()))
        } else {
            let record = read_record(&backend, commit_id.version)?;
            if !commit_id.hash.is_empty() && commit_id.hash != record.root {
                return Err(TreeError::RootMismatch { version: commit_id.version });
            }

            let working = if lazy {
                None
            } else {
                Some(load_entries(&backend, commit_id.version)?)
            };
            (CommitId { version: record.version, hash: record.root.to_vec() }, working)
        };

        Ok(Self {
            backend,
            inner: RwLock::new(TreeInner { working, last_commit_id, pruning }),
        })
    }

    /// The commit id of the last committed version.
    pub fn last_commit_id(&self) -> CommitId {
        self.inner.read().last_commit_id.clone()
    }

    /// Replaces the pruning strategy for subsequent commits.
    pub fn set_pruning(&self, pruning: PruningStrategy) {
        self.inner.write().pruning = pruning;
    }

    /// Reads a key from the working set.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.with_working(|working| working.get(key).cloned())
    }

    /// Writes a key into the working set.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.with_working(|working| {
            working.insert(key.to_vec(), value.to_vec());
        })
    }

    /// Removes a key from the working set.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.with_working(|working| {
            working.remove(key);
        })
    }

    /// All working pairs whose keys start with `prefix`, ascending.
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>> {
        let prefix = prefix.to_vec();
        self.with_working(|working| {
            working
                .range(prefix.clone()..)
                .take_while(|(k, _)| k.starts_with(&prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
    }

    /// Commits the working set as the next version.
    ///
    /// Persists the entry set and its commitment record, prunes retired
    /// versions per the configured strategy, and returns the new commit id.
    pub fn commit(&self) -> Result<CommitId> {
        let mut inner = self.inner.write();
        let version = inner.last_commit_id.version + 1;
        let pruning = inner.pruning;

        let working = Self::loaded(&self.backend, &mut inner)?;
        let root = entries_root(working.iter());

        let mut batch = WriteBatch::new();
        for (key, value) in working.iter() {
            batch.set(entry_key(version, key), value.clone());
        }
        let record = VersionRecord { version, root };
        batch.set(record_key(version), encode(&record).context(CodecSnafu)?);

        let interval = pruning.interval();
        if interval > 0 && version % interval == 0 {
            self.queue_pruned_versions(&pruning, version, &mut batch)?;
        }

        self.backend.write_batch(batch).context(KvSnafu)?;

        inner.last_commit_id = CommitId { version, hash: root.to_vec() };
        debug!(version, "committed tree version");
        Ok(inner.last_commit_id.clone())
    }

    /// Opens an immutable view of a retained version.
    ///
    /// # Errors
    ///
    /// Returns `VersionNotFound` if the version was never committed or has
    /// been pruned.
    pub fn get_immutable(&self, version: i64) -> Result<ImmutableTree> {
        let record = read_record(&self.backend, version)?;
        let entries = load_entries(&self.backend, version)?;
        Ok(ImmutableTree::new(version, record.root, entries))
    }

    /// Reads a key at a retained version.
    pub fn get_at(&self, version: i64, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.get_immutable(version)?.get(key))
    }

    /// Inclusion proof for a key at a retained version, with its value.
    ///
    /// `None` when the key is absent at that version.
    pub fn proof_at(&self, version: i64, key: &[u8]) -> Result<Option<(Vec<u8>, MerkleProof)>> {
        Ok(self.get_immutable(version)?.proof(key))
    }

    /// Exports a retained version as a finite item sequence.
    pub fn export(&self, version: i64) -> Result<Vec<ExportItem>> {
        Ok(self.get_immutable(version)?.export())
    }

    /// Imports an item sequence as the given version.
    ///
    /// Persists the entries and commitment record at `version`, replaces
    /// the working set, and makes `version` the last committed version.
    pub fn import(&self, version: i64, items: Vec<ExportItem>) -> Result<CommitId> {
        let entries: BTreeMap<Vec<u8>, Vec<u8>> =
            items.into_iter().map(|item| (item.key, item.value)).collect();
        let root = entries_root(entries.iter());

        let mut batch = WriteBatch::new();
        for (key, value) in &entries {
            batch.set(entry_key(version, key), value.clone());
        }
        let record = VersionRecord { version, root };
        batch.set(record_key(version), encode(&record).context(CodecSnafu)?);
        self.backend.write_batch(batch).context(KvSnafu)?;

        let mut inner = self.inner.write();
        inner.last_commit_id = CommitId { version, hash: root.to_vec() };
        inner.working = Some(entries);
        debug!(version, "imported tree version");
        Ok(inner.last_commit_id.clone())
    }

    /// Queues deletion of all record and entry keys for versions the
    /// strategy retires. Keys are collected before any delete is issued.
    fn queue_pruned_versions(
        &self,
        pruning: &PruningStrategy,
        latest: i64,
        batch: &mut WriteBatch,
    ) -> Result<()> {
        // Scans return full keys, so the collected keys feed the batch as-is.
        let records = self.backend.scan_prefix(RECORD_PREFIX).context(KvSnafu)?;

        for (key, value) in records {
            let record: VersionRecord = decode(&value).context(CodecSnafu)?;
            if !pruning.should_prune(record.version, latest) {
                continue;
            }

            batch.delete(key);
            for (stale_key, _) in
                self.backend.scan_prefix(&entry_prefix(record.version)).context(KvSnafu)?
            {
                batch.delete(stale_key);
            }
            debug!(version = record.version, "pruning tree version");
        }
        Ok(())
    }

    fn with_working<R>(&self, f: impl FnOnce(&mut BTreeMap<Vec<u8>, Vec<u8>>) -> R) -> Result<R> {
        let mut inner = self.inner.write();
        let working = Self::loaded(&self.backend, &mut inner)?;
        Ok(f(working))
    }

    fn loaded<'a>(
        backend: &Arc<dyn KvBackend>,
        inner: &'a mut TreeInner,
    ) -> Result<&'a mut BTreeMap<Vec<u8>, Vec<u8>>> {
        match &mut inner.working {
            Some(working) => Ok(working),
            slot @ None => {
                let entries = load_entries(backend, inner.last_commit_id.version)?;
                Ok(slot.insert(entries))
            }
        }
    }
}

fn read_record(backend: &Arc<dyn KvBackend>, version: i64) -> Result<VersionRecord> {
    let bytes = backend
        .get(&record_key(version))
        .context(KvSnafu)?
        .ok_or(TreeError::VersionNotFound { version })?;
    decode(&bytes).context(CodecSnafu)
}

fn load_entries(
    backend: &Arc<dyn KvBackend>,
    version: i64,
) -> Result<BTreeMap<Vec<u8>, Vec<u8>>> {
    if version == 0 {
        return Ok(BTreeMap::new());
    }
    let prefix = entry_prefix(version);
    let pairs = backend.scan_prefix(&prefix).context(KvSnafu)?;
    Ok(pairs.into_iter().map(|(k, v)| (k[prefix.len()..].to_vec(), v)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify_value;
    use tessera_kv::MemoryKv;
    use tessera_types::EMPTY_HASH;

    fn open_empty() -> VersionedTree {
        let backend: Arc<dyn KvBackend> = Arc::new(MemoryKv::new());
        VersionedTree::open(backend, &CommitId::zero(), PruningStrategy::Nothing, false)
            .expect("open empty tree")
    }

    #[test]
    fn test_empty_commit_has_empty_root() {
        let tree = open_empty();
        let id = tree.commit().unwrap();
        assert_eq!(id.version, 1);
        assert_eq!(id.hash, EMPTY_HASH.to_vec());
    }

    #[test]
    fn test_set_commit_get() {
        let tree = open_empty();
        tree.set(b"a", b"1").unwrap();
        let id = tree.commit().unwrap();

        assert_eq!(id.version, 1);
        assert_ne!(id.hash, EMPTY_HASH.to_vec());
        assert_eq!(tree.get(b"a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_versions_are_isolated() {
        let tree = open_empty();
        tree.set(b"a", b"1").unwrap();
        tree.commit().unwrap();
        tree.set(b"a", b"2").unwrap();
        tree.commit().unwrap();

        assert_eq!(tree.get_at(1, b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(tree.get_at(2, b"a").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_reopen_at_older_version() {
        let backend: Arc<dyn KvBackend> = Arc::new(MemoryKv::new());
        let tree = VersionedTree::open(
            backend.clone(),
            &CommitId::zero(),
            PruningStrategy::Nothing,
            false,
        )
        .unwrap();
        tree.set(b"a", b"1").unwrap();
        let v1 = tree.commit().unwrap();
        tree.set(b"a", b"2").unwrap();
        tree.commit().unwrap();

        let reopened =
            VersionedTree::open(backend, &v1, PruningStrategy::Nothing, false).unwrap();
        assert_eq!(reopened.last_commit_id(), v1);
        assert_eq!(reopened.get(b"a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_open_unknown_version_fails() {
        let backend: Arc<dyn KvBackend> = Arc::new(MemoryKv::new());
        let missing = CommitId { version: 9, hash: vec![] };
        let result =
            VersionedTree::open(backend, &missing, PruningStrategy::Nothing, false);
        assert!(matches!(result, Err(TreeError::VersionNotFound { version: 9 })));
    }

    #[test]
    fn test_open_with_wrong_hash_fails() {
        let backend: Arc<dyn KvBackend> = Arc::new(MemoryKv::new());
        let tree = VersionedTree::open(
            backend.clone(),
            &CommitId::zero(),
            PruningStrategy::Nothing,
            false,
        )
        .unwrap();
        tree.set(b"a", b"1").unwrap();
        tree.commit().unwrap();

        let wrong = CommitId { version: 1, hash: vec![0u8; 32] };
        let result = VersionedTree::open(backend, &wrong, PruningStrategy::Nothing, false);
        assert!(matches!(result, Err(TreeError::RootMismatch { version: 1 })));
    }

    #[test]
    fn test_lazy_open_defers_loading() {
        let backend: Arc<dyn KvBackend> = Arc::new(MemoryKv::new());
        let tree = VersionedTree::open(
            backend.clone(),
            &CommitId::zero(),
            PruningStrategy::Nothing,
            false,
        )
        .unwrap();
        tree.set(b"a", b"1").unwrap();
        let v1 = tree.commit().unwrap();

        let lazy = VersionedTree::open(backend, &v1, PruningStrategy::Nothing, true).unwrap();
        // First access loads the working set on demand.
        assert_eq!(lazy.get(b"a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_proofs_verify_at_any_retained_version() {
        let tree = open_empty();
        tree.set(b"a", b"1").unwrap();
        tree.set(b"b", b"2").unwrap();
        let v1 = tree.commit().unwrap();
        tree.set(b"b", b"3").unwrap();
        let v2 = tree.commit().unwrap();

        let (value, proof) = tree.proof_at(1, b"b").unwrap().expect("present");
        assert_eq!(value, b"2".to_vec());
        let root1: tessera_types::Hash = v1.hash.as_slice().try_into().unwrap();
        assert!(verify_value(b"b", &value, &proof, &root1));

        let (value, proof) = tree.proof_at(2, b"b").unwrap().expect("present");
        let root2: tessera_types::Hash = v2.hash.as_slice().try_into().unwrap();
        assert!(verify_value(b"b", &value, &proof, &root2));
    }

    #[test]
    fn test_export_import_roundtrip() {
        let tree = open_empty();
        tree.set(b"a", b"1").unwrap();
        tree.set(b"b", b"2").unwrap();
        let id = tree.commit().unwrap();

        let items = tree.export(1).unwrap();

        let other = open_empty();
        let imported = other.import(1, items).unwrap();
        assert_eq!(imported, id);
        assert_eq!(other.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(other.get_at(1, b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_everything_pruning_drops_old_versions() {
        let backend: Arc<dyn KvBackend> = Arc::new(MemoryKv::new());
        let tree = VersionedTree::open(
            backend,
            &CommitId::zero(),
            PruningStrategy::Everything,
            false,
        )
        .unwrap();
        tree.set(b"a", b"1").unwrap();
        tree.commit().unwrap();
        tree.set(b"a", b"2").unwrap();
        tree.commit().unwrap();

        assert!(matches!(
            tree.get_immutable(1),
            Err(TreeError::VersionNotFound { version: 1 })
        ));
        assert_eq!(tree.get_at(2, b"a").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_deleted_key_absent_after_commit() {
        let tree = open_empty();
        tree.set(b"a", b"1").unwrap();
        tree.commit().unwrap();
        tree.delete(b"a").unwrap();
        tree.commit().unwrap();

        assert_eq!(tree.get(b"a").unwrap(), None);
        assert_eq!(tree.get_at(2, b"a").unwrap(), None);
        assert_eq!(tree.get_at(1, b"a").unwrap(), Some(b"1".to_vec()));
    }

    mod proptest_determinism {
        use proptest::prelude::*;

        use super::*;

        fn arb_pairs() -> impl Strategy<Value = Vec<(Vec<u8>, Vec<u8>)>> {
            // Unique keys, so insertion order cannot change the final state.
            proptest::collection::btree_map(
                proptest::collection::vec(any::<u8>(), 1..8),
                proptest::collection::vec(any::<u8>(), 0..8),
                1..16,
            )
            .prop_map(|map| map.into_iter().collect())
        }

        proptest! {
            /// Two trees fed the same pairs commit to the same root.
            #[test]
            fn prop_same_writes_same_root(pairs in arb_pairs()) {
                let a = open_empty();
                let b = open_empty();
                for (key, value) in &pairs {
                    a.set(key, value).unwrap();
                    b.set(key, value).unwrap();
                }
                prop_assert_eq!(a.commit().unwrap(), b.commit().unwrap());
            }

            /// Write order does not affect the root.
            #[test]
            fn prop_write_order_irrelevant(pairs in arb_pairs()) {
                let a = open_empty();
                let b = open_empty();
                for (key, value) in &pairs {
                    a.set(key, value).unwrap();
                }
                for (key, value) in pairs.iter().rev() {
                    b.set(key, value).unwrap();
                }
                prop_assert_eq!(a.commit().unwrap(), b.commit().unwrap());
            }
        }
    }
}
