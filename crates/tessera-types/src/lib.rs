//! Core types for the Tessera multi-store.
//!
//! This crate holds everything the storage layers agree on:
//!
//! - Cryptographic hashing (SHA-256, 32-byte commitments)
//! - The canonical binary codec used for all persisted records
//! - The simple Merkle construction over name-keyed maps, with proofs
//! - Commit records (`CommitId`, `StoreInfo`, `CommitInfo`)
//! - Proof operations for multi-store inclusion
//! - The store upgrade manifest applied at load time
//! - Pruning and store configuration
//! - The query request/response envelope

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod commit;
mod config;
mod hash;
mod merkle;
mod proof;
mod query;
mod upgrade;

pub use codec::{decode, encode, CodecError};
pub use commit::{CommitId, CommitInfo, StoreCore, StoreInfo};
pub use config::{PruningStrategy, StoreOptions};
pub use hash::{sha256, sha256_concat, Hash, EMPTY_HASH};
pub use merkle::{
    map_leaf, simple_hash_from_map, simple_proof_from_map, MerkleProof, MerkleTree,
};
pub use proof::{MultiStoreProof, ProofError, ProofOp, PROOF_OP_MULTISTORE, PROOF_OP_TREE_VALUE};
pub use query::{code, QueryRequest, QueryResponse};
pub use upgrade::{StoreRename, StoreUpgrades};
