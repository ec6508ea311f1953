//! Error types for butterfly-ch
//!
//! Input problems surface as `Result` errors at the call that introduced
//! them. Internal inconsistencies (enumerator misuse, arena corruption) are
//! panics instead, since they can only come from a bug in this crate.

use thiserror::Error;

/// Main error type for butterfly-ch operations
#[derive(Debug, Error)]
pub enum Error {
    /// Rejected input: empty restriction, distance above the network
    /// maximum, unknown vertex or attribute id, invalid index mode.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not allowed in the current state, e.g. mutating a
    /// read-only attribute collection.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Serialized data written by a newer version.
    #[error("Unsupported {format} version {found} (supported: {supported})")]
    UnsupportedVersion {
        format: &'static str,
        found: u32,
        supported: u32,
    },

    /// Serialized data that fails validation (magic, checksum, payload).
    #[error("Corrupt data: {0}")]
    Corrupt(String),

    /// Graph handed to the hierarchy builder violates its preconditions.
    #[error("Malformed graph: {0}")]
    MalformedGraph(String),

    /// Configuration could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub(crate) fn invalid_operation(msg: impl Into<String>) -> Self {
        Error::InvalidOperation(msg.into())
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Error::Corrupt(msg.into())
    }
}

/// Convenience result type for butterfly-ch operations
pub type Result<T> = std::result::Result<T, Error>;
