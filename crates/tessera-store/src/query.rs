//! Query routing and proof augmentation.
//!
//! A query addresses `/<store-name>[/<subpath>]`. The router resolves the
//! store by name, rewrites the path to the subpath and delegates to the
//! substore's queryable capability. When a proof was requested on a
//! proof-requiring subpath, the substore's own proof is augmented with a
//! multi-store inclusion op so a verifier can replay from the key all the
//! way to the top-level root.

use tessera_types::{encode, MultiStoreProof, ProofOp, QueryRequest, QueryResponse, PROOF_OP_MULTISTORE};

use crate::multi::{get_commit_info, MultiStore};

/// Whether a subpath mandates a proof when the caller requested one.
///
/// Policy predicate: paths ending in `/key` require proof.
pub fn requires_proof(subpath: &str) -> bool {
    subpath.ends_with("/key")
}

/// Splits `/<store-name>[/<subpath>]` into the store name and the subpath
/// (with its leading slash; empty when absent).
fn parse_path(path: &str) -> Option<(&str, String)> {
    let rest = path.strip_prefix('/')?;
    match rest.split_once('/') {
        Some((store_name, subpath)) => Some((store_name, format!("/{subpath}"))),
        None => Some((rest, String::new())),
    }
}

impl MultiStore {
    /// Routes a query to the addressed substore and, when asked, augments
    /// the returned proof with the multi-store inclusion op.
    ///
    /// Routing failures are returned as error responses, never panics.
    pub fn query(&self, req: &QueryRequest) -> QueryResponse {
        let Some((store_name, subpath)) = parse_path(&req.path) else {
            return QueryResponse::unknown_request(format!("invalid path: {}", req.path));
        };

        let Some(store) = self.store_by_name(store_name) else {
            return QueryResponse::unknown_request(format!("no such store: {store_name}"));
        };

        let Some(queryable) = store.as_queryable() else {
            return QueryResponse::unknown_request(format!(
                "store {store_name} doesn't support queries"
            ));
        };

        // Trim the path and make the query.
        let mut sub_req = req.clone();
        sub_req.path = subpath.clone();
        let mut res = queryable.query(&sub_req);

        if !req.prove || !requires_proof(&subpath) {
            return res;
        }

        if res.proof_ops.is_empty() {
            return QueryResponse::invalid_request(
                "proof is unexpectedly empty; ensure height has not been pruned",
            );
        }

        let commit_info = match get_commit_info(self.backend(), res.height) {
            Ok(commit_info) => commit_info,
            Err(e) => return QueryResponse::invalid_request(e.to_string()),
        };

        let proof = MultiStoreProof { store_infos: commit_info.store_infos };
        let data = match encode(&proof) {
            Ok(data) => data,
            Err(e) => return QueryResponse::invalid_request(e.to_string()),
        };

        res.proof_ops.push(ProofOp {
            op_type: PROOF_OP_MULTISTORE.to_string(),
            key: store_name.as_bytes().to_vec(),
            data,
        });
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_path() {
        assert_eq!(parse_path("/kv/key"), Some(("kv", "/key".to_string())));
        assert_eq!(parse_path("/kv"), Some(("kv", String::new())));
        assert_eq!(
            parse_path("/kv/deep/subpath"),
            Some(("kv", "/deep/subpath".to_string()))
        );
        assert_eq!(parse_path("kv/key"), None);
        assert_eq!(parse_path(""), None);
    }

    #[test]
    fn test_requires_proof_policy() {
        assert!(requires_proof("/key"));
        assert!(requires_proof("/store/key"));
        assert!(!requires_proof("/subspace"));
        assert!(!requires_proof(""));
    }
}
