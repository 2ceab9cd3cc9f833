//! Remote transport trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chunksync_common::Result;

/// Information about one object stored under the sync path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Object name, relative to the sync path.
    pub name: String,
    /// Size in bytes, when the backend reports it.
    pub size: Option<u64>,
    /// Last modification time, when the backend reports it.
    pub modified: Option<DateTime<Utc>>,
    /// ETag or revision ID.
    pub etag: Option<String>,
}

impl ObjectInfo {
    /// Create info carrying only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
            modified: None,
            etag: None,
        }
    }
}

/// Remote transport for a flat namespace of named objects.
///
/// The sync engine treats a transport as an unordered key to blob store
/// rooted at a configured sync path. Names never contain `/`.
/// Implementations must handle their own authentication and timeouts.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Get the transport name (e.g., "webdav", "local", "memory").
    fn name(&self) -> &str;

    /// Verify the remote is reachable and the sync path exists.
    ///
    /// # Postconditions
    /// - The sync path collection exists (created if it was missing)
    ///
    /// # Errors
    /// - Network/I/O errors
    /// - Authentication errors
    async fn check_connection(&self) -> Result<()>;

    /// Enumerate all objects under the sync path.
    async fn list(&self) -> Result<Vec<ObjectInfo>>;

    /// Fetch the content of an object.
    ///
    /// # Errors
    /// - Object not found
    /// - Network/I/O errors
    async fn get(&self, name: &str) -> Result<Vec<u8>>;

    /// Create or replace an object.
    async fn put(&self, name: &str, data: Vec<u8>) -> Result<ObjectInfo>;

    /// Delete an object.
    ///
    /// # Errors
    /// - Object not found
    async fn delete(&self, name: &str) -> Result<()>;

    /// Check if an object exists.
    async fn exists(&self, name: &str) -> Result<bool>;
}

/// Reject names that would escape the flat namespace.
pub(crate) fn check_object_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(chunksync_common::Error::InvalidInput(format!(
            "Invalid object name: {:?}",
            name
        )));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(chunksync_common::Error::InvalidInput(format!(
            "Object name cannot contain separators: {}",
            name
        )));
    }
    Ok(())
}
