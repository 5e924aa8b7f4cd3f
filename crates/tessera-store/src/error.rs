//! Error types for multi-store operations.

use snafu::Snafu;

use tessera_kv::KvError;
use tessera_tree::TreeError;
use tessera_types::CodecError;

/// Error type for multi-store operations.
///
/// Programmer errors (duplicate mounts, unknown variants, recursive
/// multi-stores) panic instead — they indicate misconfiguration at startup.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// Underlying backend operation failed.
    #[snafu(display("Backend error: {source}"))]
    Kv {
        /// The underlying backend error.
        source: KvError,
    },

    /// A persisted record failed to encode or decode.
    #[snafu(display("Codec error: {source}"))]
    Codec {
        /// The underlying codec error.
        source: CodecError,
    },

    /// A tree-engine operation failed.
    #[snafu(display("Tree error: {source}"))]
    Tree {
        /// The underlying tree error.
        source: TreeError,
    },

    /// No commit info is recorded at the requested version.
    #[snafu(display("No commit info found for version {version}"))]
    CommitInfoNotFound {
        /// The missing version.
        version: i64,
    },

    /// The commit info at the requested version failed to decode.
    #[snafu(display("Corrupt commit info at version {version}: {source}"))]
    CommitInfoCorrupt {
        /// The version whose record is corrupt.
        version: i64,
        /// The decode failure.
        source: CodecError,
    },

    /// A substore could not be instantiated at load.
    #[snafu(display("Failed to load substore '{name}': {source}"))]
    SubstoreLoad {
        /// Mount name of the failing substore.
        name: String,
        /// The underlying tree error.
        source: TreeError,
    },

    /// Copying data during a rename upgrade failed.
    #[snafu(display("Failed to move store '{old_name}' -> '{new_name}': {source}"))]
    UpgradeMove {
        /// The name the data moves from.
        old_name: String,
        /// The name the data moves to.
        new_name: String,
        /// The failing store operation.
        #[snafu(source(from(StoreError, Box::new)))]
        source: Box<StoreError>,
    },

    /// A mutation was issued against a read-only historical view.
    #[snafu(display("Store view is read-only"))]
    ReadOnlyStore,

    /// Writing a trace record failed.
    #[snafu(display("Failed to write trace record: {source}"))]
    TraceWrite {
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

/// Result type for multi-store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
