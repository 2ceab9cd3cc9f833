//! Directory-backed chunk store.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use chunksync_common::{Error, Result};

use crate::chunk::{chunk_id_from_object, object_name, Catalog, ChunkData, ChunkMetadata, Payload};
use crate::store::{check_tombstone, ChunkStore};

/// Suffix of in-flight writes.
const TMP_SUFFIX: &str = ".tmp";

/// Chunk store keeping one JSON document per chunk in a directory.
///
/// Documents use the same encoding and naming as remote objects. The catalog
/// is indexed in memory when the store is opened; writes replace documents
/// atomically, so a crash leaves either the old or the new version.
pub struct FileChunkStore {
    dir: PathBuf,
    index: RwLock<Catalog>,
}

impl FileChunkStore {
    /// Open (creating if needed) a store in `dir`.
    ///
    /// Leftover temporary files are removed and unreadable documents are
    /// logged and left out of the catalog.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;

        let mut index = Catalog::new();
        let mut entries = fs::read_dir(&dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = entry.file_name().to_str().map(String::from) else {
                continue;
            };

            if name.ends_with(TMP_SUFFIX) {
                debug!("Removing interrupted write {}", path.display());
                fs::remove_file(&path).await?;
                continue;
            }

            let Some(id) = chunk_id_from_object(&name) else {
                continue;
            };

            match Self::read_document(&path).await {
                Ok(chunk) if chunk.meta.id == id => {
                    index.insert(id, chunk.meta);
                }
                Ok(chunk) => warn!(
                    "Ignoring {}: document belongs to chunk '{}'",
                    path.display(),
                    chunk.meta.id
                ),
                Err(e) => warn!("Ignoring unreadable chunk document {}: {}", path.display(), e),
            }
        }

        debug!("Opened chunk store {} with {} entries", dir.display(), index.len());
        Ok(Self {
            dir,
            index: RwLock::new(index),
        })
    }

    /// Directory holding the documents.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(object_name(id))
    }

    async fn read_document(path: &Path) -> Result<ChunkData> {
        let bytes = fs::read(path).await?;
        ChunkData::from_document(&bytes)
    }

    async fn persist(&self, chunk: &ChunkData) -> Result<()> {
        let path = self.path_for(&chunk.meta.id);
        let tmp = self
            .dir
            .join(format!("{}{}", object_name(&chunk.meta.id), TMP_SUFFIX));

        fs::write(&tmp, chunk.to_document(false)?).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl ChunkStore for FileChunkStore {
    async fn catalog(&self) -> Result<Catalog> {
        Ok(self.index.read().await.clone())
    }

    async fn read(&self, id: &str) -> Result<ChunkData> {
        if !self.index.read().await.contains_key(id) {
            return Err(Error::NotFound(format!("Chunk not found: {}", id)));
        }
        Self::read_document(&self.path_for(id)).await
    }

    async fn write(&self, chunk: ChunkData) -> Result<()> {
        let mut index = self.index.write().await;
        self.persist(&chunk).await?;
        index.insert(chunk.meta.id.clone(), chunk.meta);
        Ok(())
    }

    async fn delete(&self, tombstone: ChunkMetadata) -> Result<()> {
        check_tombstone(&tombstone)?;
        let chunk = ChunkData {
            meta: tombstone,
            data: Payload::Null,
        };

        let mut index = self.index.write().await;
        self.persist(&chunk).await?;
        index.insert(chunk.meta.id.clone(), chunk.meta);
        Ok(())
    }
}
