//! Identifier types used throughout chunksync.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable opaque identifier of one installation.
///
/// Written into every chunk's metadata to attribute the most recent local
/// write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a DeviceId from a string.
    ///
    /// # Errors
    /// - Returns error if id is empty or only whitespace
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(crate::Error::InvalidInput(
                "DeviceId cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Check that a chunk id can be used as a key in both stores.
///
/// Ids are opaque, but must be non-empty and free of control characters so
/// they can be mapped to a remote object name and back.
pub fn validate_chunk_id(id: &str) -> crate::Result<()> {
    if id.is_empty() {
        return Err(crate::Error::InvalidInput(
            "Chunk id cannot be empty".to_string(),
        ));
    }
    if id.chars().any(char::is_control) {
        return Err(crate::Error::InvalidInput(format!(
            "Chunk id contains control characters: {:?}",
            id
        )));
    }
    Ok(())
}
