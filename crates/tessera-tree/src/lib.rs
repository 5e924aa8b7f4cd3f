//! Versioned authenticated tree engine.
//!
//! Backs the multi-store's versioned substores. Every commit persists the
//! full entry set under a new version together with a commitment root, so
//! any retained version can be reopened as an immutable view, proven
//! against, exported and re-imported. The engine exposes exactly the
//! contract the multi-store depends on: `commit`, `last_commit_id`,
//! `get_immutable(version)`, `export(version)`, `import(version, items)`.
//!
//! The commitment is a Merkle root over the sorted entry set; each leaf is
//! a streaming hash of the length-prefixed key and value. Point proofs go
//! from an entry leaf to the tree root and compose with the multi-store's
//! own inclusion proof above.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod immutable;
mod tree;

pub use immutable::ImmutableTree;
pub use tree::VersionedTree;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use snafu::Snafu;

use tessera_types::{CodecError, Hash, MerkleProof, MerkleTree, EMPTY_HASH};

/// Error type for tree operations.
#[derive(Debug, Snafu)]
pub enum TreeError {
    /// Underlying backend operation failed.
    #[snafu(display("Backend error: {source}"))]
    Kv {
        /// The underlying backend error.
        source: tessera_kv::KvError,
    },

    /// A persisted record failed to decode.
    #[snafu(display("Codec error: {source}"))]
    Codec {
        /// The underlying codec error.
        source: CodecError,
    },

    /// The requested version was never committed or has been pruned.
    #[snafu(display("Version {version} does not exist or has been pruned"))]
    VersionNotFound {
        /// The missing version.
        version: i64,
    },

    /// The opening commit id does not match the persisted root at that
    /// version.
    #[snafu(display("Commit hash mismatch at version {version}"))]
    RootMismatch {
        /// The version whose persisted root disagreed.
        version: i64,
    },
}

/// Result type for tree operations.
pub type Result<T> = std::result::Result<T, TreeError>;

/// One exported entry: an owned key/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportItem {
    /// Entry key.
    pub key: Vec<u8>,
    /// Entry value.
    pub value: Vec<u8>,
}

/// Per-version commitment record persisted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct VersionRecord {
    pub version: i64,
    pub root: Hash,
}

/// Leaf hash of one entry: a streaming hash of the length-prefixed key and
/// value. Part of the proof contract.
pub fn entry_leaf(key: &[u8], value: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update((key.len() as u32).to_le_bytes());
    hasher.update(key);
    hasher.update((value.len() as u32).to_le_bytes());
    hasher.update(value);
    hasher.finalize().into()
}

/// Computes the tree root over a sorted entry sequence.
///
/// Returns `EMPTY_HASH` for an empty tree.
pub(crate) fn entries_root<'a, I>(entries: I) -> Hash
where
    I: Iterator<Item = (&'a Vec<u8>, &'a Vec<u8>)>,
{
    let leaves: Vec<Hash> = entries.map(|(k, v)| entry_leaf(k, v)).collect();
    if leaves.is_empty() {
        return EMPTY_HASH;
    }
    MerkleTree::from_leaves(&leaves).root()
}

/// Verifies a value proof: recomputes the entry leaf and checks the Merkle
/// path against the expected tree root.
pub fn verify_value(key: &[u8], value: &[u8], proof: &MerkleProof, root: &Hash) -> bool {
    proof.leaf_hash == entry_leaf(key, value) && proof.verify(root)
}
