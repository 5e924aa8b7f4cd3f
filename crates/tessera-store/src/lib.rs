//! The Tessera multi-store.
//!
//! A façade aggregating a named collection of independently-committable
//! key/value substores into one logical store with a single monotonically
//! increasing version and one Merkle root per version. Each commit advances
//! every mounted substore in lock-step, folds the per-substore commit
//! hashes into a simple Merkle root over store names, and atomically
//! records the per-version commit metadata together with the latest-version
//! pointer.
//!
//! ```ignore
//! use std::sync::Arc;
//! use tessera_kv::MemoryKv;
//! use tessera_store::{MultiStore, StoreKey, StoreKind};
//!
//! let mut store = MultiStore::new(Arc::new(MemoryKv::new()));
//! let kv = StoreKey::versioned("kv");
//! store.mount_store(&kv, StoreKind::Versioned);
//! store.load_latest_version()?;
//!
//! store.get_kv_store(&kv).set(b"a", b"1")?;
//! let commit_id = store.commit()?;
//! ```
//!
//! Single-writer, multi-reader: callers serialise `commit`, `load`, `mount`
//! and the setters. Reads through separate cache-wrap overlays may proceed
//! concurrently against stable substores.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod error;
mod interblock;
mod multi;
mod query;
mod snapshot;
mod substore;
mod trace;

pub use cache::{CacheKvStore, CacheMultiStore};
pub use error::{Result, StoreError};
pub use interblock::{InterBlockCache, StoreCache};
pub use multi::MultiStore;
pub use query::requires_proof;
pub use snapshot::{SnapshotChunk, SnapshotError, SnapshotMetadata};
pub use substore::{
    KvStore, RawStore, StoreKey, StoreKind, Substore, TransientStore, VersionedStore,
};
pub use trace::{TraceContext, TraceKvStore, TraceWriter};
