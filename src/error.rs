//! Error types for index operations.

use thiserror::Error;

/// Errors that can occur while opening, mutating or searching an index.
#[derive(Debug, Error)]
pub enum GannoyError {
    /// A requested resource does not exist (meta file, node id, item key).
    #[error("not found: {0}")]
    NotFound(String),

    /// A caller-supplied argument is invalid (dimension mismatch, duplicate key).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error (file operations, lock acquisition).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error for the meta document.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A structural invariant was violated. This indicates a corrupt tree
    /// file or a bug; it should never surface during correct operation.
    #[error("integrity violation: {0}")]
    Integrity(String),
}

impl From<serde_json::Error> for GannoyError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for index operations.
pub type Result<T> = std::result::Result<T, GannoyError>;
