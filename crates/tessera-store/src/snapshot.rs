//! Snapshot export and restore.
//!
//! A snapshot serialises every versioned substore at a given version into a
//! chunked on-disk format, one chunk per substore:
//!
//! ```text
//! <root>/<version>/1/
//!   metadata                  (empty record, format marker)
//!   <chunkIdx>/data           (zstd-compressed chunk record)
//!   <chunkIdx>/checksum       (hex SHA-1 of data)
//! ```
//!
//! Chunk indices follow mount order; consumers must rely on the store name
//! embedded in each chunk, not on the index.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use snafu::ResultExt;
use tracing::{debug, info};

use tessera_tree::{ExportItem, TreeError};
use tessera_types::{decode, encode, sha256, CodecError, CommitId, Hash};

use crate::multi::MultiStore;
use crate::substore::StoreKind;

/// Snapshot format tag: the `1` directory component.
const SNAPSHOT_FORMAT: u32 = 1;

/// Zstd level for chunk data, matching the recommended snapshot level.
const COMPRESSION_LEVEL: i32 = 3;

/// Error type for snapshot operations.
///
/// A partially written snapshot directory is not cleaned up automatically;
/// that is the caller's responsibility.
#[derive(Debug, snafu::Snafu)]
pub enum SnapshotError {
    /// No directory was given.
    #[snafu(display("Path to snapshot directory not given"))]
    EmptyPath,

    /// Creating a snapshot directory failed.
    #[snafu(display("Failed to create snapshot directory {path}: {source}"))]
    CreateDir {
        /// The directory that could not be created.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Writing a snapshot file failed.
    #[snafu(display("Failed to write {path}: {source}"))]
    WriteFile {
        /// The file that could not be written.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Encoding or decoding a snapshot record failed.
    #[snafu(display("Snapshot codec error: {source}"))]
    Codec {
        /// The underlying codec error.
        source: CodecError,
    },

    /// Compressing or decompressing chunk data failed.
    #[snafu(display("Snapshot compression error: {source}"))]
    Compression {
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A chunk names a store that is not mounted.
    #[snafu(display("No such store: {name}"))]
    UnknownStore {
        /// The unknown store name.
        name: String,
    },

    /// A chunk names a store that is not versioned.
    #[snafu(display("Store '{name}' does not support snapshot import"))]
    NotVersioned {
        /// The non-versioned store name.
        name: String,
    },

    /// Exporting or importing through the tree engine failed.
    #[snafu(display("Snapshot tree error: {source}"))]
    Tree {
        /// The underlying tree error.
        source: TreeError,
    },
}

/// One snapshot chunk: a versioned substore's full export at one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotChunk {
    /// Mount name of the exported substore.
    pub store: String,
    /// The exported version.
    pub version: i64,
    /// The exported entries.
    pub items: Vec<ExportItem>,
}

/// Empty metadata record written as the format marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {}

impl MultiStore {
    /// Exports every versioned substore at `commit_id.version` into `dir`.
    ///
    /// Non-versioned substores are silently skipped.
    pub fn snapshot(&self, commit_id: &CommitId, dir: &Path) -> Result<(), SnapshotError> {
        if dir.as_os_str().is_empty() {
            return Err(SnapshotError::EmptyPath);
        }

        let root = dir.join(commit_id.version.to_string()).join(SNAPSHOT_FORMAT.to_string());
        fs::create_dir_all(&root)
            .context(CreateDirSnafu { path: root.display().to_string() })?;

        let mut chunk = 0u32;
        for (key, store) in self.mounted_stores() {
            let Some(versioned) = store.as_versioned() else {
                debug!(store = key.name(), "skipping snapshot of non-versioned substore");
                continue;
            };

            let chunk_dir = root.join(chunk.to_string());
            fs::create_dir_all(&chunk_dir)
                .context(CreateDirSnafu { path: chunk_dir.display().to_string() })?;

            let items =
                versioned.tree().export(commit_id.version).context(TreeSnafu)?;
            let record = SnapshotChunk {
                store: key.name().to_string(),
                version: commit_id.version,
                items,
            };

            let encoded = encode(&record).context(CodecSnafu)?;
            let compressed = zstd::encode_all(encoded.as_slice(), COMPRESSION_LEVEL)
                .context(CompressionSnafu)?;

            let data_path = chunk_dir.join("data");
            fs::write(&data_path, &compressed)
                .context(WriteFileSnafu { path: data_path.display().to_string() })?;

            let mut hasher = Sha1::new();
            hasher.update(&compressed);
            let checksum = hex::encode(hasher.finalize());
            let checksum_path = chunk_dir.join("checksum");
            fs::write(&checksum_path, checksum)
                .context(WriteFileSnafu { path: checksum_path.display().to_string() })?;

            chunk += 1;
        }

        let metadata = encode(&SnapshotMetadata::default()).context(CodecSnafu)?;
        let metadata_path = root.join("metadata");
        fs::write(&metadata_path, metadata)
            .context(WriteFileSnafu { path: metadata_path.display().to_string() })?;

        info!(version = commit_id.version, chunks = chunk, "exported snapshot");
        Ok(())
    }

    /// Restores one chunk: imports its items into the named substore at the
    /// chunk's version, then returns a provisional root hash.
    ///
    /// The provisional root is recomputed from every substore's *current*
    /// in-memory commit id (transient stores excluded), the same way the
    /// commit-info hash is derived. With chunks still outstanding it
    /// reflects un-imported stores' stale state; it only equals the
    /// snapshot's root once every chunk has been restored.
    pub fn restore(&self, data: &[u8]) -> Result<Hash, SnapshotError> {
        let decompressed = zstd::decode_all(data).context(CompressionSnafu)?;
        let chunk: SnapshotChunk = decode(&decompressed).context(CodecSnafu)?;

        let store = self
            .store_by_name(&chunk.store)
            .ok_or_else(|| SnapshotError::UnknownStore { name: chunk.store.clone() })?;
        let versioned = store
            .as_versioned()
            .ok_or_else(|| SnapshotError::NotVersioned { name: chunk.store.clone() })?;

        versioned.tree().import(chunk.version, chunk.items).context(TreeSnafu)?;
        debug!(store = chunk.store, version = chunk.version, "restored snapshot chunk");

        let mut leaves = std::collections::BTreeMap::new();
        for (key, store) in self.mounted_stores() {
            if store.kind() == StoreKind::Transient {
                continue;
            }
            leaves.insert(key.name().to_string(), sha256(&store.last_commit_id().hash));
        }

        Ok(tessera_types::simple_hash_from_map(&leaves))
    }
}
