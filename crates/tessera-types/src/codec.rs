//! Canonical serialization for persisted records.
//!
//! Every record Tessera durably writes (commit info, the latest-version
//! pointer, snapshot chunks) goes through this module, which wraps postcard
//! serialization with consistent error handling via snafu. Postcard
//! length-prefixes all variable-size fields, which is what makes the
//! persisted encoding self-delimiting.

use serde::{de::DeserializeOwned, Serialize};
use snafu::Snafu;

/// Error type for codec operations.
#[derive(Debug, Snafu)]
pub enum CodecError {
    /// Encoding failed.
    #[snafu(display("Encoding failed: {source}"))]
    Encode {
        /// The underlying postcard error.
        source: postcard::Error,
    },

    /// Decoding failed.
    #[snafu(display("Decoding failed: {source}"))]
    Decode {
        /// The underlying postcard error.
        source: postcard::Error,
    },
}

/// Encodes a value with the canonical binary codec.
///
/// # Errors
///
/// Returns `CodecError::Encode` if serialization fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(value).map_err(|source| CodecError::Encode { source })
}

/// Decodes a value with the canonical binary codec.
///
/// # Errors
///
/// Returns `CodecError::Decode` if deserialization fails.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    postcard::from_bytes(bytes).map_err(|source| CodecError::Decode { source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_version_integer() {
        let version: i64 = 42;
        let bytes = encode(&version).expect("encode");
        let decoded: i64 = decode(&bytes).expect("decode");
        assert_eq!(version, decoded);
    }

    #[test]
    fn test_decode_malformed_input() {
        let result: Result<String, _> = decode(&[0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(matches!(result, Err(CodecError::Decode { .. })));
    }

    #[test]
    fn test_decode_empty_input() {
        let result: Result<i64, _> = decode(&[]);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_truncated_record() {
        let bytes = encode(&(7i64, "store".to_string())).expect("encode");
        let truncated = &bytes[..bytes.len() - 2];
        let result: Result<(i64, String), _> = decode(truncated);
        assert!(result.is_err());
    }
}
