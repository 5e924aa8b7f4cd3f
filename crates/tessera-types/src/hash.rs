//! Cryptographic hashing for Tessera.
//!
//! All commitment hashes use SHA-256. The multi-store root, per-substore
//! roots and proof leaves are all 32-byte SHA-256 digests.

use sha2::{Digest, Sha256};

/// SHA-256 hash output (32 bytes).
pub type Hash = [u8; 32];

/// Hash of empty input: SHA-256("").
///
/// Used as the root of an empty tree. NOT zero bytes — this is critical for
/// cross-node consistency.
pub const EMPTY_HASH: Hash = [
    0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f, 0xb9, 0x24,
    0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95, 0x99, 0x1b, 0x78, 0x52, 0xb8, 0x55,
];

/// Compute SHA-256 of arbitrary data.
#[inline]
pub fn sha256(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute SHA-256 over the concatenation of multiple hashes.
pub fn sha256_concat(hashes: &[Hash]) -> Hash {
    let mut hasher = Sha256::new();
    for h in hashes {
        hasher.update(h);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_hash_is_sha256_of_empty() {
        assert_eq!(sha256(&[]), EMPTY_HASH);
    }

    #[test]
    fn test_sha256_concat() {
        let h1 = sha256(b"a");
        let h2 = sha256(b"b");

        let mut joined = Vec::new();
        joined.extend_from_slice(&h1);
        joined.extend_from_slice(&h2);

        assert_eq!(sha256_concat(&[h1, h2]), sha256(&joined));
    }
}
