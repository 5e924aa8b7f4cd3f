//! Query request/response envelope.
//!
//! The outer RPC layer is out of scope; these are the concrete types the
//! query router consumes and produces. Routing failures become error
//! responses, never panics.

use serde::{Deserialize, Serialize};

use crate::proof::ProofOp;

/// Response codes.
pub mod code {
    /// Success.
    pub const OK: u32 = 0;
    /// The request could not be routed (bad path, unknown store, store not
    /// queryable, unknown subpath).
    pub const UNKNOWN_REQUEST: u32 = 6;
    /// The request was understood but cannot be served (e.g. proof expected
    /// but unavailable).
    pub const INVALID_REQUEST: u32 = 18;
}

/// A query addressed to `/<store-name>[/<subpath>]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Slash-separated address; the router strips the store segment before
    /// delegating.
    pub path: String,
    /// Opaque request payload (e.g. the key for `/key` queries).
    pub data: Vec<u8>,
    /// Version to query; 0 means latest committed.
    pub height: i64,
    /// Whether the caller wants a Merkle proof.
    pub prove: bool,
}

/// Result of a routed query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Response code; 0 is success.
    pub code: u32,
    /// Human-readable error description when `code != 0`.
    pub log: String,
    /// Echo of the queried key, when applicable.
    pub key: Vec<u8>,
    /// Result payload.
    pub value: Vec<u8>,
    /// Version the response was served at.
    pub height: i64,
    /// Proof chain, bottom-up, when requested.
    pub proof_ops: Vec<ProofOp>,
}

impl QueryResponse {
    /// Whether the query succeeded.
    pub fn is_ok(&self) -> bool {
        self.code == code::OK
    }

    /// An `UnknownRequest` error response.
    pub fn unknown_request(log: impl Into<String>) -> Self {
        Self { code: code::UNKNOWN_REQUEST, log: log.into(), ..Default::default() }
    }

    /// An `InvalidRequest` error response.
    pub fn invalid_request(log: impl Into<String>) -> Self {
        Self { code: code::INVALID_REQUEST, log: log.into(), ..Default::default() }
    }
}
