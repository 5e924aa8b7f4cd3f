//! Substore variants and their common operation set.
//!
//! Substores are modelled as a tagged variant with capability probes
//! (`as_queryable`, `as_versioned`) rather than per-site downcasts. Every
//! variant is internally synchronised, so handles are cheap clones that
//! cache-wrap overlays can share.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use snafu::ResultExt;

use tessera_kv::{KvBackend, KvPair};
use tessera_tree::VersionedTree;
use tessera_types::{
    encode, CommitId, ProofOp, QueryRequest, QueryResponse, PROOF_OP_TREE_VALUE,
};

use crate::error::{KvSnafu, Result, TreeSnafu};
use crate::interblock::StoreCache;

/// Substore variant tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Historical authenticated tree with proofs.
    Versioned,
    /// Plain KV adapter, versionless.
    Raw,
    /// In-memory store cleared on every commit.
    Transient,
    /// Reserved for nested multi-stores; unsupported.
    Nested,
}

struct StoreKeyInner {
    name: String,
    kind: StoreKind,
}

/// Opaque identity handle for one mount.
///
/// Keys are compared and hashed by identity, not by name: the same name
/// re-mounted after a swap is a distinct key. Clones share the identity.
#[derive(Clone)]
pub struct StoreKey(Arc<StoreKeyInner>);

impl StoreKey {
    /// A key for a versioned substore.
    pub fn versioned(name: impl Into<String>) -> Self {
        Self(Arc::new(StoreKeyInner { name: name.into(), kind: StoreKind::Versioned }))
    }

    /// A key for a raw substore.
    pub fn raw(name: impl Into<String>) -> Self {
        Self(Arc::new(StoreKeyInner { name: name.into(), kind: StoreKind::Raw }))
    }

    /// A key for a transient substore.
    pub fn transient(name: impl Into<String>) -> Self {
        Self(Arc::new(StoreKeyInner { name: name.into(), kind: StoreKind::Transient }))
    }

    /// The mount name.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// The variant this key was created for.
    pub fn kind(&self) -> StoreKind {
        self.0.kind
    }
}

impl PartialEq for StoreKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for StoreKey {}

impl std::hash::Hash for StoreKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreKey({:?}, {:?})", self.0.name, self.0.kind)
    }
}

/// Common KV operation set over substores and their wrappers.
pub trait KvStore: Send + Sync {
    /// Reads a key. `Ok(None)` if absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Writes a key.
    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Removes a key if present.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// All pairs whose keys start with `prefix`, ascending.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>>;
}

/// A substore backed by the versioned tree engine, optionally read-through
/// an inter-block cache slot.
pub struct VersionedStore {
    tree: VersionedTree,
    cache: Option<Arc<StoreCache>>,
}

impl VersionedStore {
    pub(crate) fn new(tree: VersionedTree, cache: Option<Arc<StoreCache>>) -> Self {
        Self { tree, cache }
    }

    /// The primary tree engine, unwrapped from any cache.
    pub fn tree(&self) -> &VersionedTree {
        &self.tree
    }

    /// Serves `/key` and `/subspace` queries at a requested height.
    ///
    /// Height 0 resolves to the latest committed version. Routing errors
    /// are returned as error responses, never panics.
    pub fn query(&self, req: &QueryRequest) -> QueryResponse {
        let height =
            if req.height == 0 { self.tree.last_commit_id().version } else { req.height };

        match req.path.as_str() {
            "/key" => self.query_key(req, height),
            "/subspace" => self.query_subspace(req, height),
            other => {
                QueryResponse::unknown_request(format!("unexpected query path: {other}"))
            }
        }
    }

    fn query_key(&self, req: &QueryRequest, height: i64) -> QueryResponse {
        let mut res =
            QueryResponse { height, key: req.data.clone(), ..Default::default() };

        if req.prove {
            match self.tree.proof_at(height, &req.data) {
                Ok(Some((value, proof))) => {
                    let data = match encode(&proof) {
                        Ok(data) => data,
                        Err(e) => return QueryResponse::invalid_request(e.to_string()),
                    };
                    res.value = value;
                    res.proof_ops.push(ProofOp {
                        op_type: PROOF_OP_TREE_VALUE.to_string(),
                        key: req.data.clone(),
                        data,
                    });
                }
                // Absent key: empty value, no proof (absence proofs are not
                // supported).
                Ok(None) => {}
                Err(e) => return QueryResponse::invalid_request(e.to_string()),
            }
        } else {
            match self.tree.get_at(height, &req.data) {
                Ok(value) => res.value = value.unwrap_or_default(),
                Err(e) => return QueryResponse::invalid_request(e.to_string()),
            }
        }

        res
    }

    fn query_subspace(&self, req: &QueryRequest, height: i64) -> QueryResponse {
        let view = match self.tree.get_immutable(height) {
            Ok(view) => view,
            Err(e) => return QueryResponse::invalid_request(e.to_string()),
        };

        let pairs = view.scan_prefix(&req.data);
        match encode(&pairs) {
            Ok(value) => QueryResponse {
                height,
                key: req.data.clone(),
                value,
                ..Default::default()
            },
            Err(e) => QueryResponse::invalid_request(e.to_string()),
        }
    }
}

impl KvStore for VersionedStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(key) {
                return Ok(hit);
            }
            let value = self.tree.get(key).context(TreeSnafu)?;
            cache.put(key, value.clone());
            return Ok(value);
        }
        self.tree.get(key).context(TreeSnafu)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.tree.set(key, value).context(TreeSnafu)?;
        if let Some(cache) = &self.cache {
            cache.put(key, Some(value.to_vec()));
        }
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.tree.delete(key).context(TreeSnafu)?;
        if let Some(cache) = &self.cache {
            cache.put(key, None);
        }
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>> {
        self.tree.scan_prefix(prefix).context(TreeSnafu)
    }
}

/// Trivial adapter exposing a backend view as a versionless substore.
///
/// Its commit is a no-op returning the zero commit id.
pub struct RawStore {
    backend: Arc<dyn KvBackend>,
}

impl RawStore {
    pub(crate) fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }
}

impl KvStore for RawStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.backend.get(key).context(KvSnafu)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.backend.set(key, value).context(KvSnafu)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.backend.delete(key).context(KvSnafu)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>> {
        self.backend.scan_prefix(prefix).context(KvSnafu)
    }
}

/// In-memory substore whose contents are discarded on every commit.
#[derive(Default)]
pub struct TransientStore {
    inner: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl TransientStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn clear(&self) {
        self.inner.write().clear();
    }
}

impl KvStore for TransientStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.read().get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.inner.write().remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>> {
        let map = self.inner.read();
        Ok(map
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// A mounted substore.
#[derive(Clone)]
pub enum Substore {
    /// Historical tree substore.
    Versioned(Arc<VersionedStore>),
    /// Plain KV adapter.
    Raw(Arc<RawStore>),
    /// In-memory, cleared on commit.
    Transient(Arc<TransientStore>),
}

impl Substore {
    /// The variant tag.
    pub fn kind(&self) -> StoreKind {
        match self {
            Self::Versioned(_) => StoreKind::Versioned,
            Self::Raw(_) => StoreKind::Raw,
            Self::Transient(_) => StoreKind::Transient,
        }
    }

    /// Advances the substore and returns its new commit id.
    ///
    /// Raw stores return the zero id; transient stores clear themselves and
    /// return the zero id.
    pub fn commit(&self) -> Result<CommitId> {
        match self {
            Self::Versioned(store) => store.tree.commit().context(TreeSnafu),
            Self::Raw(_) => Ok(CommitId::zero()),
            Self::Transient(store) => {
                store.clear();
                Ok(CommitId::zero())
            }
        }
    }

    /// The substore's last committed id.
    pub fn last_commit_id(&self) -> CommitId {
        match self {
            Self::Versioned(store) => store.tree.last_commit_id(),
            Self::Raw(_) | Self::Transient(_) => CommitId::zero(),
        }
    }

    /// The queryable capability, when the variant supports queries.
    pub fn as_queryable(&self) -> Option<&VersionedStore> {
        match self {
            Self::Versioned(store) => Some(store),
            _ => None,
        }
    }

    /// The versioned capability (historical views, export/import).
    pub fn as_versioned(&self) -> Option<&Arc<VersionedStore>> {
        match self {
            Self::Versioned(store) => Some(store),
            _ => None,
        }
    }

    fn as_kv(&self) -> &dyn KvStore {
        match self {
            Self::Versioned(store) => store.as_ref(),
            Self::Raw(store) => store.as_ref(),
            Self::Transient(store) => store.as_ref(),
        }
    }
}

impl KvStore for Substore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.as_kv().get(key)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.as_kv().set(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.as_kv().delete(key)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>> {
        self.as_kv().scan_prefix(prefix)
    }
}

/// Deletes every key of a substore, two-pass: keys are collected into an
/// owned sequence before any delete is issued.
pub(crate) fn delete_kv_contents(store: &dyn KvStore) -> Result<()> {
    let keys: Vec<Vec<u8>> =
        store.scan_prefix(&[])?.into_iter().map(|(key, _)| key).collect();

    for key in keys {
        store.delete(&key)?;
    }
    Ok(())
}

/// Moves all data from one substore to another: copy every pair, then
/// bulk-delete the source.
pub(crate) fn move_kv_contents(from: &dyn KvStore, to: &dyn KvStore) -> Result<()> {
    let pairs = from.scan_prefix(&[])?;
    for (key, value) in pairs {
        to.set(&key, &value)?;
    }

    delete_kv_contents(from)
}

/// Resolves a zero-or-recorded commit id by store name.
pub(crate) fn commit_id_for(
    infos: &std::collections::HashMap<String, tessera_types::StoreInfo>,
    name: &str,
) -> CommitId {
    infos.get(name).map(|info| info.core.commit_id.clone()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_keys_compare_by_identity() {
        let a = StoreKey::versioned("kv");
        let b = StoreKey::versioned("kv");

        assert_ne!(a, b, "same name, distinct identity");
        assert_eq!(a, a.clone(), "clones share identity");
        assert_eq!(a.name(), b.name());
    }

    #[test]
    fn test_transient_commit_clears_and_returns_zero() {
        let store = Substore::Transient(Arc::new(TransientStore::new()));
        store.set(b"k", b"v").unwrap();

        let id = store.commit().unwrap();
        assert!(id.is_zero());
        assert_eq!(store.get(b"k").unwrap(), None);
    }

    #[test]
    fn test_raw_commit_is_noop() {
        let backend: Arc<dyn KvBackend> = Arc::new(tessera_kv::MemoryKv::new());
        let store = Substore::Raw(Arc::new(RawStore::new(backend)));
        store.set(b"k", b"v").unwrap();

        assert!(store.commit().unwrap().is_zero());
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_capability_probes() {
        let transient = Substore::Transient(Arc::new(TransientStore::new()));
        assert!(transient.as_queryable().is_none());
        assert!(transient.as_versioned().is_none());
    }

    #[test]
    fn test_delete_and_move_contents() {
        let a = TransientStore::new();
        let b = TransientStore::new();
        a.set(b"x", b"1").unwrap();
        a.set(b"y", b"2").unwrap();

        move_kv_contents(&a, &b).unwrap();

        assert_eq!(a.scan_prefix(&[]).unwrap().len(), 0);
        assert_eq!(b.get(b"x").unwrap(), Some(b"1".to_vec()));
        assert_eq!(b.get(b"y").unwrap(), Some(b"2".to_vec()));
    }
}
