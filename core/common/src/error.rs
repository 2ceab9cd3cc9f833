//! Common error types for chunksync.

use thiserror::Error;

/// Top-level error type for chunksync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage backend operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation is not valid in the current lifecycle state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Remote endpoint could not be reached or answered with a failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Remote rejected the credentials.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Remote refused access to the resource.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A remote operation exceeded its deadline.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Payload does not match its declared checksum, or a document is malformed.
    #[error("Corrupted data: {0}")]
    Corrupted(String),

    /// A sync cycle is already running.
    #[error("Sync already in progress")]
    SyncInProgress,

    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Timeout(_) | Error::Io(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
