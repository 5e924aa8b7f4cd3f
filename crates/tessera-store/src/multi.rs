//! The multi-store façade: mounting, loading, upgrades and the commit
//! pipeline.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use snafu::ResultExt;
use tracing::{debug, info};

use tessera_kv::{KvBackend, PrefixedKv, WriteBatch};
use tessera_tree::VersionedTree;
use tessera_types::{
    decode, encode, CommitId, CommitInfo, PruningStrategy, StoreInfo, StoreUpgrades,
};

use crate::cache::{CacheKvStore, CacheMultiStore, ImmutableKv};
use crate::error::{CodecSnafu, KvSnafu, Result, StoreError, SubstoreLoadSnafu, TreeSnafu};
use crate::interblock::InterBlockCache;
use crate::substore::{
    commit_id_for, delete_kv_contents, move_kv_contents, KvStore, RawStore, StoreKey, StoreKind,
    Substore, TransientStore, VersionedStore,
};
use crate::trace::{TraceContext, TraceKvStore, TraceWriter};

/// Backend key of the latest-version pointer.
const LATEST_VERSION_KEY: &[u8] = b"s/latest";

/// Backend key of the commit info for a version: `s/<version>`.
fn commit_info_key(version: i64) -> Vec<u8> {
    format!("s/{version}").into_bytes()
}

/// Prefix for a substore mounted against the multi-store's own backend.
fn substore_prefix(name: &str) -> Vec<u8> {
    format!("s/k:{name}/").into_bytes()
}

/// Prefix for a substore mounted against a caller-supplied backend.
const EXTERNAL_SUBSTORE_PREFIX: &[u8] = b"s/_/";

/// Mount-time parameters for one substore.
struct StoreParams {
    key: StoreKey,
    kind: StoreKind,
    backend: Option<Arc<dyn KvBackend>>,
}

/// A versioned, Merkle-committed multi-store.
///
/// Mount substores first, then load a version (materialising every mount),
/// then read, write and commit. The writer-side methods take `&mut self`;
/// callers serialise them per the single-writer model.
pub struct MultiStore {
    backend: Arc<dyn KvBackend>,
    last_commit_id: CommitId,
    pruning: PruningStrategy,
    lazy_loading: bool,
    params: Vec<StoreParams>,
    stores: HashMap<StoreKey, Substore>,
    keys_by_name: HashMap<String, StoreKey>,
    trace_writer: Option<TraceWriter>,
    trace_context: TraceContext,
    inter_block_cache: Option<Arc<InterBlockCache>>,
}

impl MultiStore {
    /// Creates an empty multi-store over a backend, with a prune-nothing
    /// strategy and no mounts.
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            last_commit_id: CommitId::zero(),
            pruning: PruningStrategy::Nothing,
            lazy_loading: false,
            params: Vec::new(),
            stores: HashMap::new(),
            keys_by_name: HashMap::new(),
            trace_writer: None,
            trace_context: TraceContext::new(),
            inter_block_cache: None,
        }
    }

    // ------------------------------------------------------------------
    // Mounting and configuration

    /// Mounts a substore on the multi-store's own backend.
    ///
    /// Additive and pre-load; never touches disk.
    ///
    /// # Panics
    ///
    /// Panics on a duplicate key identity, a duplicate name, or a kind that
    /// disagrees with the key's.
    pub fn mount_store(&mut self, key: &StoreKey, kind: StoreKind) {
        self.mount_store_with_backend(key, kind, None);
    }

    /// Mounts a substore against a caller-supplied backend.
    ///
    /// # Panics
    ///
    /// Panics on a duplicate key identity, a duplicate name, or a kind that
    /// disagrees with the key's.
    pub fn mount_store_with_backend(
        &mut self,
        key: &StoreKey,
        kind: StoreKind,
        backend: Option<Arc<dyn KvBackend>>,
    ) {
        if kind != key.kind() {
            panic!(
                "store key '{}' was created for {:?}, mounted as {:?}",
                key.name(),
                key.kind(),
                kind
            );
        }
        if self.params.iter().any(|p| p.key == *key) {
            panic!("duplicate store key: {}", key.name());
        }
        if self.keys_by_name.contains_key(key.name()) {
            panic!("duplicate store key name: {}", key.name());
        }

        self.params.push(StoreParams { key: key.clone(), kind, backend });
        self.keys_by_name.insert(key.name().to_string(), key.clone());
    }

    /// Sets the pruning strategy, forwarding it to every already-mounted
    /// substore. Called before load it only records the strategy, which is
    /// then applied at load time.
    pub fn set_pruning(&mut self, pruning: PruningStrategy) {
        self.pruning = pruning;
        for store in self.stores.values() {
            if let Some(versioned) = store.as_versioned() {
                versioned.tree().set_pruning(pruning);
            }
        }
    }

    /// Toggles lazy opening of versioned substores at load.
    pub fn set_lazy_loading(&mut self, lazy_loading: bool) {
        self.lazy_loading = lazy_loading;
    }

    /// Installs the inter-block cache. Substores are wrapped at load time,
    /// never retroactively.
    pub fn set_inter_block_cache(&mut self, cache: Arc<InterBlockCache>) {
        self.inter_block_cache = Some(cache);
    }

    /// Sets the tracer all traced substores write to.
    pub fn set_tracer(&mut self, writer: Box<dyn Write + Send>) {
        self.trace_writer = Some(Arc::new(Mutex::new(writer)));
    }

    /// Merges keys into the tracing context; existing keys are overwritten.
    pub fn set_tracing_context(&mut self, context: TraceContext) {
        self.trace_context.extend(context);
    }

    /// Whether tracing is enabled.
    pub fn tracing_enabled(&self) -> bool {
        self.trace_writer.is_some()
    }

    // ------------------------------------------------------------------
    // Loading

    /// Loads the latest committed version.
    ///
    /// # Panics
    ///
    /// Panics if the latest-version pointer cannot be read — the store
    /// cannot be safely used.
    pub fn load_latest_version(&mut self) -> Result<()> {
        let version = latest_version(&self.backend);
        self.load_version_impl(version, None)
    }

    /// Loads the latest committed version, applying an upgrade manifest.
    pub fn load_latest_version_and_upgrade(&mut self, upgrades: &StoreUpgrades) -> Result<()> {
        let version = latest_version(&self.backend);
        self.load_version_impl(version, Some(upgrades))
    }

    /// Loads a specific version.
    pub fn load_version(&mut self, version: i64) -> Result<()> {
        self.load_version_impl(version, None)
    }

    /// Loads a specific version, applying an upgrade manifest.
    pub fn load_version_and_upgrade(
        &mut self,
        version: i64,
        upgrades: &StoreUpgrades,
    ) -> Result<()> {
        self.load_version_impl(version, Some(upgrades))
    }

    fn load_version_impl(&mut self, version: i64, upgrades: Option<&StoreUpgrades>) -> Result<()> {
        let mut infos = HashMap::new();
        let mut last_commit_id = CommitId::zero();

        // Load old data if we are not version 0.
        if version != 0 {
            let commit_info = get_commit_info(&self.backend, version)?;
            for info in &commit_info.store_infos {
                infos.insert(info.name.clone(), info.clone());
            }
            last_commit_id = commit_info.commit_id();
        }

        // Materialise every mounted substore into a fresh map; the live map
        // is replaced in one swap only after everything loaded.
        let mut new_stores = HashMap::new();
        for params in &self.params {
            let name = params.key.name();
            let commit_id = commit_id_for(&infos, name);
            let store = self.load_substore(&params.key, params, &commit_id)?;

            if let Some(upgrades) = upgrades {
                if upgrades.is_deleted(name) {
                    delete_kv_contents(&store)?;
                    debug!(store = name, "deleted substore contents on upgrade");
                } else if let Some(old_name) = upgrades.renamed_from(name) {
                    // Instantiate the outgoing substore at the old name's
                    // commit id and prefix, move everything across, then
                    // bulk-delete the old substore.
                    let old_key = match params.kind {
                        StoreKind::Versioned => StoreKey::versioned(old_name),
                        StoreKind::Raw => StoreKey::raw(old_name),
                        StoreKind::Transient => StoreKey::transient(old_name),
                        StoreKind::Nested => {
                            panic!("recursive multi-stores are not supported")
                        }
                    };
                    let old_commit_id = commit_id_for(&infos, old_name);
                    let old_params = StoreParams {
                        key: old_key.clone(),
                        kind: params.kind,
                        backend: params.backend.clone(),
                    };
                    let old_store =
                        self.load_substore(&old_key, &old_params, &old_commit_id)?;

                    move_kv_contents(&old_store, &store).map_err(|source| {
                        StoreError::UpgradeMove {
                            old_name: old_name.to_string(),
                            new_name: name.to_string(),
                            source: Box::new(source),
                        }
                    })?;
                    debug!(from = old_name, to = name, "moved substore contents on upgrade");
                }
            }

            new_stores.insert(params.key.clone(), store);
        }

        self.stores = new_stores;
        self.last_commit_id = last_commit_id;
        info!(version, stores = self.params.len(), "loaded multi-store version");
        Ok(())
    }

    /// Instantiates one substore at a commit id, dispatching on its kind.
    fn load_substore(
        &self,
        key: &StoreKey,
        params: &StoreParams,
        commit_id: &CommitId,
    ) -> Result<Substore> {
        let view: Arc<dyn KvBackend> = match &params.backend {
            Some(backend) => {
                Arc::new(PrefixedKv::new(backend.clone(), EXTERNAL_SUBSTORE_PREFIX.to_vec()))
            }
            None => Arc::new(PrefixedKv::new(self.backend.clone(), substore_prefix(key.name()))),
        };

        match params.kind {
            StoreKind::Versioned => {
                let tree = VersionedTree::open(view, commit_id, self.pruning, self.lazy_loading)
                    .context(SubstoreLoadSnafu { name: key.name() })?;

                // Wrap the primary substore with its inter-block cache slot.
                // Only primaries are ever wrapped, so a cached store is
                // never wrapped again.
                let cache =
                    self.inter_block_cache.as_ref().map(|c| c.store_cache(key.name()));
                Ok(Substore::Versioned(Arc::new(VersionedStore::new(tree, cache))))
            }
            StoreKind::Raw => Ok(Substore::Raw(Arc::new(RawStore::new(view)))),
            StoreKind::Transient => Ok(Substore::Transient(Arc::new(TransientStore::new()))),
            StoreKind::Nested => panic!("recursive multi-stores are not supported"),
        }
    }

    // ------------------------------------------------------------------
    // Committing

    /// The top-level commit id of the loaded version.
    pub fn last_commit_id(&self) -> CommitId {
        self.last_commit_id.clone()
    }

    /// Advances every mounted substore, persists the new commit info and
    /// latest-version pointer in one atomic batch, and returns the new
    /// top-level commit id.
    pub fn commit(&mut self) -> Result<CommitId> {
        let version = self.last_commit_id.version + 1;

        let mut store_infos = Vec::new();
        for params in &self.params {
            let Some(store) = self.stores.get(&params.key) else { continue };
            let commit_id = store.commit()?;

            // Transient substores commit (clearing themselves) but are
            // excluded from the aggregated commit info.
            if store.kind() == StoreKind::Transient {
                continue;
            }
            store_infos.push(StoreInfo::new(params.key.name(), commit_id));
        }

        let commit_info = CommitInfo { version, store_infos };

        // The single batch writing `s/<version>` and `s/latest` is the
        // atomicity boundary: readers that see the pointer see the record.
        let mut batch = WriteBatch::new();
        batch.set(commit_info_key(version), encode(&commit_info).context(CodecSnafu)?);
        batch.set(LATEST_VERSION_KEY, encode(&version).context(CodecSnafu)?);
        self.backend.write_batch(batch).context(KvSnafu)?;

        let commit_id = commit_info.commit_id();
        self.last_commit_id = commit_id.clone();
        info!(version, "committed multi-store version");
        Ok(commit_id)
    }

    // ------------------------------------------------------------------
    // Store access

    /// The mounted substore for a key, trace-wrapped when tracing is
    /// enabled.
    ///
    /// # Panics
    ///
    /// Panics if no substore is loaded for the key.
    pub fn get_kv_store(&self, key: &StoreKey) -> Arc<dyn KvStore> {
        let store = self.must_get(key);

        match &self.trace_writer {
            Some(writer) => Arc::new(TraceKvStore::new(
                Arc::new(store.clone()),
                writer.clone(),
                self.trace_context.clone(),
            )),
            None => Arc::new(store.clone()),
        }
    }

    /// The mounted substore for a key, without trace wrapping. The
    /// inter-block cache is internal to the substore; the primary tree is
    /// always reachable through it.
    ///
    /// # Panics
    ///
    /// Panics if no substore is loaded for the key.
    pub fn get_commit_kv_store(&self, key: &StoreKey) -> Substore {
        self.must_get(key).clone()
    }

    /// The mounted substore for a name, if any.
    pub(crate) fn store_by_name(&self, name: &str) -> Option<&Substore> {
        let key = self.keys_by_name.get(name)?;
        self.stores.get(key)
    }

    pub(crate) fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    pub(crate) fn mounted_stores(&self) -> impl Iterator<Item = (&StoreKey, &Substore)> {
        self.params
            .iter()
            .filter_map(|params| self.stores.get(&params.key).map(|s| (&params.key, s)))
    }

    fn must_get(&self, key: &StoreKey) -> &Substore {
        match self.stores.get(key) {
            Some(store) => store,
            None => panic!("store does not exist for key: {}", key.name()),
        }
    }

    // ------------------------------------------------------------------
    // Cache wrapping

    /// Snapshots the substore map into a copy-on-write overlay sharing one
    /// write horizon.
    pub fn cache_wrap(&self) -> CacheMultiStore {
        let stores = self
            .mounted_stores()
            .map(|(key, store)| {
                let parent: Arc<dyn KvStore> = Arc::new(store.clone());
                (key.clone(), Arc::new(CacheKvStore::new(parent)))
            })
            .collect();

        CacheMultiStore::new(stores, self.keys_by_name.clone())
    }

    /// Identical to [`cache_wrap`](Self::cache_wrap); the tracing
    /// parameters are ignored because the root store threads tracing
    /// internally.
    pub fn cache_wrap_with_trace(
        &self,
        _writer: Option<&TraceWriter>,
        _context: Option<&TraceContext>,
    ) -> CacheMultiStore {
        self.cache_wrap()
    }

    /// The historical cache-wrap variant: versioned substores are taken as
    /// immutable views at `version` (an error if pruned or never
    /// committed); other variants are cache-wrapped as-is. Strictly for
    /// read-only historical queries.
    pub fn cache_multi_store_at(&self, version: i64) -> Result<CacheMultiStore> {
        let mut stores = HashMap::new();
        for (key, store) in self.mounted_stores() {
            let parent: Arc<dyn KvStore> = match store.as_versioned() {
                Some(versioned) => {
                    let view = versioned.tree().get_immutable(version).context(TreeSnafu)?;
                    Arc::new(ImmutableKv::new(view))
                }
                None => Arc::new(store.clone()),
            };
            stores.insert(key.clone(), Arc::new(CacheKvStore::new(parent)));
        }

        Ok(CacheMultiStore::new(stores, self.keys_by_name.clone()))
    }
}

/// Reads the latest committed version from a backend.
///
/// # Panics
///
/// Panics if the backend read fails or the pointer is corrupt — the store
/// cannot be safely used.
fn latest_version(backend: &Arc<dyn KvBackend>) -> i64 {
    let bytes = match backend.get(LATEST_VERSION_KEY) {
        Ok(bytes) => bytes,
        Err(e) => panic!("failed to read latest version: {e}"),
    };

    match bytes {
        None => 0,
        Some(bytes) => match decode(&bytes) {
            Ok(version) => version,
            Err(e) => panic!("corrupt latest-version pointer: {e}"),
        },
    }
}

/// Reads and decodes the commit info for a version.
pub(crate) fn get_commit_info(
    backend: &Arc<dyn KvBackend>,
    version: i64,
) -> Result<CommitInfo> {
    let bytes = backend
        .get(&commit_info_key(version))
        .context(KvSnafu)?
        .ok_or(StoreError::CommitInfoNotFound { version })?;

    decode(&bytes).map_err(|source| StoreError::CommitInfoCorrupt { version, source })
}
