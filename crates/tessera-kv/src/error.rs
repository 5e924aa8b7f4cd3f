//! Error types for KV backends.

use snafu::Snafu;

/// Error type for backend operations.
///
/// The in-memory backend never fails; the variants exist for durable
/// implementations of the trait.
#[derive(Debug, Snafu)]
pub enum KvError {
    /// The backend rejected or failed an operation.
    #[snafu(display("Backend error: {message}"))]
    Backend {
        /// Backend-specific description.
        message: String,
    },

    /// An I/O error from a durable backend.
    #[snafu(display("I/O error: {source}"))]
    Io {
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, KvError>;
