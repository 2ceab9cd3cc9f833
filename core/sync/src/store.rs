//! Local chunk store abstraction.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use chunksync_common::{Error, Result};

use crate::chunk::{Catalog, ChunkData, ChunkMetadata, Payload};

/// Local side of the sync: the application's chunk storage.
///
/// Tombstones are part of the store. A deleted chunk keeps its metadata
/// (with `deleted` set) so the deletion can propagate; only its payload goes.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Metadata of every chunk, tombstones included.
    async fn catalog(&self) -> Result<Catalog>;

    /// Read one chunk.
    ///
    /// # Errors
    /// - `Error::NotFound` when the id is unknown
    async fn read(&self, id: &str) -> Result<ChunkData>;

    /// Insert or replace a chunk.
    async fn write(&self, chunk: ChunkData) -> Result<()>;

    /// Drop a chunk's payload and record the given tombstone in its place.
    ///
    /// # Errors
    /// - `Error::InvalidInput` when `tombstone` is not marked deleted
    async fn delete(&self, tombstone: ChunkMetadata) -> Result<()>;
}

pub(crate) fn check_tombstone(meta: &ChunkMetadata) -> Result<()> {
    if !meta.is_tombstone() {
        return Err(Error::InvalidInput(format!(
            "Chunk '{}' delete requires tombstone metadata",
            meta.id
        )));
    }
    Ok(())
}

/// In-memory chunk store.
///
/// Clones share the same contents.
#[derive(Clone, Default)]
pub struct MemoryChunkStore {
    chunks: Arc<RwLock<BTreeMap<String, ChunkData>>>,
}

impl MemoryChunkStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, tombstones included.
    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn catalog(&self) -> Result<Catalog> {
        Ok(self
            .chunks
            .read()
            .await
            .iter()
            .map(|(id, chunk)| (id.clone(), chunk.meta.clone()))
            .collect())
    }

    async fn read(&self, id: &str) -> Result<ChunkData> {
        self.chunks
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Chunk not found: {}", id)))
    }

    async fn write(&self, chunk: ChunkData) -> Result<()> {
        self.chunks
            .write()
            .await
            .insert(chunk.meta.id.clone(), chunk);
        Ok(())
    }

    async fn delete(&self, tombstone: ChunkMetadata) -> Result<()> {
        check_tombstone(&tombstone)?;
        self.chunks.write().await.insert(
            tombstone.id.clone(),
            ChunkData {
                meta: tombstone,
                data: Payload::Null,
            },
        );
        Ok(())
    }
}
