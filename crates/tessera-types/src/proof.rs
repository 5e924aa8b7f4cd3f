//! Proof operations.
//!
//! A query response carries a chain of proof ops. The substore appends its
//! own op proving `key -> substore root`; the multi-store router appends a
//! second op proving `substore root -> multi-store root`. A verifier replays
//! the chain bottom-up.

use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::commit::StoreInfo;
use crate::hash::Hash;
use crate::merkle::simple_proof_from_map;

/// Op type for the multi-store inclusion step.
pub const PROOF_OP_MULTISTORE: &str = "multistore";

/// Op type for a versioned tree's key/value inclusion step.
pub const PROOF_OP_TREE_VALUE: &str = "tree:v";

/// One step in a proof chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOp {
    /// Kind of the op, e.g. [`PROOF_OP_MULTISTORE`].
    pub op_type: String,
    /// Key the op proves; for the multi-store op, the store name as bytes.
    pub key: Vec<u8>,
    /// Op payload, canonical-codec encoded.
    pub data: Vec<u8>,
}

/// Errors verifying a multi-store proof op.
#[derive(Debug, Snafu)]
pub enum ProofError {
    /// The op names a store absent from the store-info list.
    #[snafu(display("No store info for '{name}' in multi-store proof"))]
    UnknownStore {
        /// The missing store name.
        name: String,
    },

    /// The child root does not match the named store's recorded commit hash.
    #[snafu(display("Commit hash mismatch for store '{name}'"))]
    HashMismatch {
        /// The mismatched store name.
        name: String,
    },
}

/// Payload of the multi-store proof op: the full per-store commitment list
/// at the queried height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiStoreProof {
    /// Store infos present in the commit record at that height.
    pub store_infos: Vec<StoreInfo>,
}

impl MultiStoreProof {
    /// Replays the op: checks that `child_root` is the named store's commit
    /// hash, then recomputes the multi-store root over the embedded list.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is absent or its recorded hash does
    /// not equal `child_root`.
    pub fn compute_root(&self, name: &str, child_root: &[u8]) -> Result<Hash, ProofError> {
        let info = self
            .store_infos
            .iter()
            .find(|info| info.name == name)
            .ok_or_else(|| ProofError::UnknownStore { name: name.to_string() })?;

        if info.core.commit_id.hash != child_root {
            return Err(ProofError::HashMismatch { name: name.to_string() });
        }

        let map = self.store_infos.iter().map(|i| (i.name.clone(), i.hash())).collect();
        // The named entry is present, so the proof always exists.
        let (root, proof) = simple_proof_from_map(&map, name)
            .ok_or_else(|| ProofError::UnknownStore { name: name.to_string() })?;
        debug_assert!(proof.verify(&root));

        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::{CommitId, CommitInfo};

    fn infos() -> Vec<StoreInfo> {
        vec![
            StoreInfo::new("acc", CommitId { version: 4, hash: b"acc-root".to_vec() }),
            StoreInfo::new("kv", CommitId { version: 4, hash: b"kv-root".to_vec() }),
        ]
    }

    #[test]
    fn test_compute_root_matches_commit_info_hash() {
        let ci = CommitInfo { version: 4, store_infos: infos() };
        let proof = MultiStoreProof { store_infos: infos() };

        let root = proof.compute_root("kv", b"kv-root").expect("valid");
        assert_eq!(root, ci.hash());
    }

    #[test]
    fn test_compute_root_rejects_wrong_child() {
        let proof = MultiStoreProof { store_infos: infos() };
        assert!(matches!(
            proof.compute_root("kv", b"tampered"),
            Err(ProofError::HashMismatch { .. })
        ));
    }

    #[test]
    fn test_compute_root_rejects_unknown_store() {
        let proof = MultiStoreProof { store_infos: infos() };
        assert!(matches!(
            proof.compute_root("gov", b"anything"),
            Err(ProofError::UnknownStore { .. })
        ));
    }
}
