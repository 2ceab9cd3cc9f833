//! Local directory transport.
//!
//! Treats a directory (typically a network share or a folder mirrored by
//! another tool) as the remote namespace.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;

use chunksync_common::{Error, Result};

use crate::transport::{check_object_name, ObjectInfo, RemoteTransport};

/// Suffix of in-flight writes; such files are never listed.
const PARTIAL_SUFFIX: &str = ".partial";

/// Local directory transport.
///
/// Objects are plain files directly under the sync directory.
pub struct LocalTransport {
    root: PathBuf,
}

impl LocalTransport {
    /// Create a new local transport rooted at `root/sync_path`.
    ///
    /// The directory is created on `check_connection`, not here.
    pub fn new(root: impl AsRef<Path>, sync_path: &str) -> Self {
        let mut root = root.as_ref().to_path_buf();
        for component in sync_path.split('/').filter(|c| !c.is_empty()) {
            root.push(component);
        }
        Self { root }
    }

    /// Directory holding the objects.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, name: &str) -> Result<PathBuf> {
        check_object_name(name)?;
        Ok(self.root.join(name))
    }

    /// Create object info from filesystem metadata.
    fn create_info(name: &str, fs_meta: &std::fs::Metadata) -> ObjectInfo {
        let modified: Option<DateTime<Utc>> = fs_meta.modified().ok().map(|t| t.into());

        ObjectInfo {
            name: name.to_string(),
            size: Some(fs_meta.len()),
            modified,
            etag: modified.map(|m| format!("{}-{}", m.timestamp_millis(), fs_meta.len())),
        }
    }
}

#[async_trait]
impl RemoteTransport for LocalTransport {
    fn name(&self) -> &str {
        "local"
    }

    async fn check_connection(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        let meta = fs::metadata(&self.root).await?;
        if !meta.is_dir() {
            return Err(Error::InvalidInput(format!(
                "Sync path is not a directory: {}",
                self.root.display()
            )));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ObjectInfo>> {
        if !fs::try_exists(&self.root).await? {
            return Err(Error::NotFound(format!(
                "Sync directory not found: {}",
                self.root.display()
            )));
        }

        let mut results = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let fs_meta = entry.metadata().await?;
            if !fs_meta.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(String::from) else {
                continue;
            };
            if name.ends_with(PARTIAL_SUFFIX) {
                continue;
            }
            results.push(Self::create_info(&name, &fs_meta));
        }

        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.object_path(name)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Object not found: {}", name)))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn put(&self, name: &str, data: Vec<u8>) -> Result<ObjectInfo> {
        let path = self.object_path(name)?;
        let partial = self.root.join(format!("{}{}", name, PARTIAL_SUFFIX));

        // Write then rename so readers never observe a half-written object
        fs::write(&partial, &data).await?;
        fs::rename(&partial, &path).await?;

        let fs_meta = fs::metadata(&path).await?;
        Ok(Self::create_info(name, &fs_meta))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let path = self.object_path(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Object not found: {}", name)))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.object_path(name)?;
        Ok(fs::try_exists(&path).await?)
    }
}
