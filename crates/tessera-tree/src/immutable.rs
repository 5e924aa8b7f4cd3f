//! Immutable historical views.

use std::collections::BTreeMap;

use tessera_types::{Hash, MerkleProof, MerkleTree};

use crate::{entry_leaf, ExportItem};

/// A read-only view of one committed version.
///
/// Holds an owned copy of the version's entries; it stays valid regardless
/// of later commits or pruning of the live tree.
#[derive(Debug, Clone)]
pub struct ImmutableTree {
    version: i64,
    root: Hash,
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl ImmutableTree {
    pub(crate) fn new(version: i64, root: Hash, entries: BTreeMap<Vec<u8>, Vec<u8>>) -> Self {
        Self { version, root, entries }
    }

    /// The version this view was taken at.
    pub fn version(&self) -> i64 {
        self.version
    }

    /// The commitment root of this version.
    pub fn root(&self) -> Hash {
        self.root
    }

    /// Reads a key.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    /// All pairs whose keys start with `prefix`, ascending.
    pub fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.entries
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of entries in the view.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the view holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inclusion proof for a key, with its value.
    ///
    /// Returns `None` if the key is absent (absence proofs are not
    /// supported).
    pub fn proof(&self, key: &[u8]) -> Option<(Vec<u8>, MerkleProof)> {
        let index = self.entries.keys().position(|k| k.as_slice() == key)?;
        let value = self.entries.get(key)?.clone();

        let leaves: Vec<Hash> =
            self.entries.iter().map(|(k, v)| entry_leaf(k, v)).collect();
        let proof = MerkleTree::from_leaves(&leaves).proof(index)?;

        Some((value, proof))
    }

    /// The view's entries as export items, in key order.
    pub fn export(&self) -> Vec<ExportItem> {
        self.entries
            .iter()
            .map(|(k, v)| ExportItem { key: k.clone(), value: v.clone() })
            .collect()
    }
}
