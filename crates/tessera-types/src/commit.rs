//! Commit records: per-substore commit identifiers and the aggregated
//! per-version commit info.
//!
//! `CommitInfo` is what the multi-store persists for every version; its hash
//! is the multi-store root for that version. Keep these simple immutable
//! records — the commit pipeline builds them, nothing mutates them after.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hash::{sha256, Hash};
use crate::merkle::{simple_hash_from_map, simple_proof_from_map, MerkleProof};

/// Identifies one store's state at one commit: `(version, hash)`.
///
/// The zero value `(0, empty)` means "never committed".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitId {
    /// Committed version, starting at 1; 0 means never committed.
    pub version: i64,
    /// Commitment hash at that version; empty when never committed.
    pub hash: Vec<u8>,
}

impl CommitId {
    /// The empty commit id `(0, empty)`.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Whether this is the never-committed id.
    pub fn is_zero(&self) -> bool {
        self.version == 0 && self.hash.is_empty()
    }
}

/// Core commitment state of one substore.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCore {
    /// The substore's commit id at this version.
    pub commit_id: CommitId,
}

/// One substore's entry in the per-version commit record.
///
/// The leaf of the top-level simple Merkle tree. The name is not part of the
/// leaf hash — the map construction incorporates names as keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreInfo {
    /// Mount name of the substore.
    pub name: String,
    /// Commitment state.
    pub core: StoreCore,
}

impl StoreInfo {
    /// Creates a store info from a name and commit id.
    pub fn new(name: impl Into<String>, commit_id: CommitId) -> Self {
        Self { name: name.into(), core: StoreCore { commit_id } }
    }

    /// Leaf hash: a single SHA-256 of the substore's commit-id hash.
    ///
    /// The extra hash over the raw commit-id hash is part of the wire
    /// contract and must be preserved verbatim.
    pub fn hash(&self) -> Hash {
        sha256(&self.core.commit_id.hash)
    }
}

/// The aggregated commit record for one multi-store version.
///
/// `store_infos` is kept in mount order; transient substores are excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// The multi-store version this record describes.
    pub version: i64,
    /// Per-substore commitment entries, in mount order.
    pub store_infos: Vec<StoreInfo>,
}

impl CommitInfo {
    /// The multi-store root hash: simple Merkle root of the per-store leaf
    /// hashes keyed by store name, sorted by name.
    pub fn hash(&self) -> Hash {
        simple_hash_from_map(&self.leaf_map())
    }

    /// The top-level commit id `(version, hash)`.
    pub fn commit_id(&self) -> CommitId {
        CommitId { version: self.version, hash: self.hash().to_vec() }
    }

    /// Inclusion proof for one named substore against this record's root.
    ///
    /// Returns `None` if the name has no entry.
    pub fn proof_for(&self, name: &str) -> Option<(Hash, MerkleProof)> {
        simple_proof_from_map(&self.leaf_map(), name)
    }

    fn leaf_map(&self) -> BTreeMap<String, Hash> {
        self.store_infos.iter().map(|info| (info.name.clone(), info.hash())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::EMPTY_HASH;

    fn info(name: &str, version: i64, hash: &[u8]) -> StoreInfo {
        StoreInfo::new(name, CommitId { version, hash: hash.to_vec() })
    }

    #[test]
    fn test_zero_commit_id() {
        let id = CommitId::zero();
        assert!(id.is_zero());
        assert!(!CommitId { version: 1, hash: vec![1] }.is_zero());
    }

    #[test]
    fn test_store_info_hash_is_single_rehash() {
        let si = info("kv", 3, b"abc");
        assert_eq!(si.hash(), sha256(b"abc"));
    }

    #[test]
    fn test_commit_info_hash_order_free() {
        let a = CommitInfo {
            version: 5,
            store_infos: vec![info("kv", 5, b"one"), info("acc", 5, b"two")],
        };
        let b = CommitInfo {
            version: 5,
            store_infos: vec![info("acc", 5, b"two"), info("kv", 5, b"one")],
        };
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_empty_commit_info_hash() {
        let ci = CommitInfo { version: 1, store_infos: vec![] };
        assert_eq!(ci.hash(), EMPTY_HASH);
    }

    #[test]
    fn test_commit_id_carries_version_and_hash() {
        let ci = CommitInfo { version: 9, store_infos: vec![info("kv", 9, b"h")] };
        let id = ci.commit_id();
        assert_eq!(id.version, 9);
        assert_eq!(id.hash, ci.hash().to_vec());
    }

    #[test]
    fn test_proof_for_store() {
        let ci = CommitInfo {
            version: 2,
            store_infos: vec![info("acc", 2, b"a"), info("gov", 2, b"g"), info("kv", 2, b"k")],
        };
        let (root, proof) = ci.proof_for("gov").expect("gov is present");
        assert_eq!(root, ci.hash());
        assert!(proof.verify(&root));
        assert!(ci.proof_for("missing").is_none());
    }

    #[test]
    fn test_codec_roundtrip() {
        let ci = CommitInfo {
            version: 7,
            store_infos: vec![info("kv", 7, b"hash-bytes")],
        };
        let bytes = crate::encode(&ci).expect("encode");
        let back: CommitInfo = crate::decode(&bytes).expect("decode");
        assert_eq!(ci, back);
    }
}
