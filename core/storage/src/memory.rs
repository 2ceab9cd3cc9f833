//! In-memory transport for testing.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use chunksync_common::{Error, Result};

use crate::transport::{check_object_name, ObjectInfo, RemoteTransport};

/// In-memory storage entry.
#[derive(Debug, Clone)]
struct Entry {
    data: Vec<u8>,
    info: ObjectInfo,
}

/// In-memory transport.
///
/// Useful for testing and development. All objects are stored in memory and
/// lost on drop. Clones share the same underlying namespace, which lets a test
/// play two devices against one "remote".
#[derive(Clone, Default)]
pub struct MemoryTransport {
    objects: Arc<RwLock<BTreeMap<String, Entry>>>,
}

impl MemoryTransport {
    /// Create a new empty memory transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    /// Check if no objects are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, Entry>>> {
        self.objects
            .read()
            .map_err(|_| Error::Storage("Memory transport lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, Entry>>> {
        self.objects
            .write()
            .map_err(|_| Error::Storage("Memory transport lock poisoned".to_string()))
    }
}

#[async_trait]
impl RemoteTransport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    async fn check_connection(&self) -> Result<()> {
        self.read().map(|_| ())
    }

    async fn list(&self) -> Result<Vec<ObjectInfo>> {
        Ok(self.read()?.values().map(|e| e.info.clone()).collect())
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>> {
        check_object_name(name)?;
        self.read()?
            .get(name)
            .map(|e| e.data.clone())
            .ok_or_else(|| Error::NotFound(format!("Object not found: {}", name)))
    }

    async fn put(&self, name: &str, data: Vec<u8>) -> Result<ObjectInfo> {
        check_object_name(name)?;

        let info = ObjectInfo {
            name: name.to_string(),
            size: Some(data.len() as u64),
            modified: Some(Utc::now()),
            etag: Some(Uuid::new_v4().to_string()),
        };

        self.write()?.insert(
            name.to_string(),
            Entry {
                data,
                info: info.clone(),
            },
        );

        Ok(info)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        check_object_name(name)?;
        self.write()?
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("Object not found: {}", name)))
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        check_object_name(name)?;
        Ok(self.read()?.contains_key(name))
    }
}
