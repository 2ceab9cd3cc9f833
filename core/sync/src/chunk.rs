//! Chunk model and remote document encoding.

use chrono::{DateTime, TimeDelta, Utc};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use chunksync_common::{validate_chunk_id, DeviceId, Error, Result};

use crate::checksum;

/// Opaque chunk payload as stored and transferred.
pub type Payload = serde_json::Value;

/// Full set of a store's chunk metadata, keyed by chunk id.
pub type Catalog = BTreeMap<String, ChunkMetadata>;

/// Extension of every remote chunk object.
pub const OBJECT_SUFFIX: &str = ".json";

/// Header marking a zstd-compressed chunk document.
///
/// Plain documents are JSON and always start with `{` or whitespace.
const COMPRESSED_MAGIC: [u8; 2] = [0xC5, 0xD0];

/// zstd level for compressed documents.
const COMPRESSION_LEVEL: i32 = 3;

/// Characters left unescaped in object names.
const OBJECT_NAME: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Metadata describing one version of a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    /// Chunk id, unique within the synced namespace.
    pub id: String,
    /// Incremented on every local write of this id.
    pub version: u64,
    /// Digest of the current payload.
    pub checksum: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    /// Byte length of the canonical payload encoding.
    pub size: u64,
    /// Free-form tag describing the payload shape.
    pub data_type: String,
    /// Device that produced this version.
    pub device_id: DeviceId,
    /// Tombstone marker.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

impl ChunkMetadata {
    /// Whether this version records a deletion.
    pub fn is_tombstone(&self) -> bool {
        self.deleted
    }

    /// Whether both versions carry the same payload.
    pub fn same_content(&self, other: &ChunkMetadata) -> bool {
        self.checksum == other.checksum && self.deleted == other.deleted
    }
}

/// A chunk version together with its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkData<T = Payload> {
    pub meta: ChunkMetadata,
    pub data: T,
}

impl ChunkData<Payload> {
    /// Build the next version of a chunk.
    ///
    /// The version continues from `previous` (tombstones included) and the
    /// checksum is computed from `data`.
    pub fn next_version(
        previous: Option<&ChunkMetadata>,
        id: &str,
        data: Payload,
        data_type: &str,
        device_id: &DeviceId,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        validate_chunk_id(id)?;
        let digest = checksum::of_payload(&data)?;

        let updated_at = successor_time(previous, now);
        let (version, created_at) = match previous {
            Some(prev) if !prev.deleted => (prev.version + 1, prev.created_at),
            Some(prev) => (prev.version + 1, updated_at),
            None => (1, updated_at),
        };

        Ok(Self {
            meta: ChunkMetadata {
                id: id.to_string(),
                version,
                checksum: digest.checksum,
                created_at,
                updated_at,
                size: digest.size,
                data_type: data_type.to_string(),
                device_id: device_id.clone(),
                deleted: false,
            },
            data,
        })
    }

    /// Build a tombstone superseding `previous`.
    pub fn tombstone(previous: &ChunkMetadata, device_id: &DeviceId, now: DateTime<Utc>) -> Result<Self> {
        let data = Payload::Null;
        let digest = checksum::of_payload(&data)?;

        Ok(Self {
            meta: ChunkMetadata {
                id: previous.id.clone(),
                version: previous.version + 1,
                checksum: digest.checksum,
                created_at: previous.created_at,
                updated_at: successor_time(Some(previous), now),
                size: digest.size,
                data_type: previous.data_type.clone(),
                device_id: device_id.clone(),
                deleted: true,
            },
            data,
        })
    }

    /// Check the payload against the declared checksum.
    pub fn verify(&self) -> Result<()> {
        checksum::verify(&self.meta.id, &self.meta.checksum, &self.data)
    }

    /// Encode as a document: compact JSON, zstd-compressed behind
    /// [`COMPRESSED_MAGIC`] when `compress` is set.
    pub fn to_document(&self, compress: bool) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        if !compress {
            return Ok(json);
        }

        let compressed = zstd::encode_all(&json[..], COMPRESSION_LEVEL)?;
        let mut document = Vec::with_capacity(COMPRESSED_MAGIC.len() + compressed.len());
        document.extend_from_slice(&COMPRESSED_MAGIC);
        document.extend_from_slice(&compressed);
        Ok(document)
    }

    /// Decode a document, compressed or not.
    ///
    /// # Errors
    /// - `Error::Corrupted` when the document is not a chunk document
    pub fn from_document(bytes: &[u8]) -> Result<Self> {
        let json = match bytes.strip_prefix(&COMPRESSED_MAGIC[..]) {
            Some(compressed) => zstd::decode_all(compressed)
                .map_err(|e| Error::Corrupted(format!("Undecodable chunk document: {}", e)))?,
            None => bytes.to_vec(),
        };
        serde_json::from_slice(&json)
            .map_err(|e| Error::Corrupted(format!("Malformed chunk document: {}", e)))
    }

    /// Convert the payload into a concrete type.
    pub fn decode<T: DeserializeOwned>(self) -> Result<ChunkData<T>> {
        Ok(ChunkData {
            data: serde_json::from_value(self.data)?,
            meta: self.meta,
        })
    }
}

/// Timestamp for a version superseding `previous`.
///
/// Truncated to the millisecond precision of the wire format, and never
/// earlier than one millisecond after the previous version, so a local edit
/// always reads as newer than the version it replaced.
fn successor_time(previous: Option<&ChunkMetadata>, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
    match previous {
        Some(prev) if now <= prev.updated_at => prev.updated_at + TimeDelta::milliseconds(1),
        _ => now,
    }
}

/// Remote object name for a chunk id.
pub fn object_name(id: &str) -> String {
    format!("{}{}", utf8_percent_encode(id, OBJECT_NAME), OBJECT_SUFFIX)
}

/// Chunk id encoded in a remote object name, if it is a chunk object.
pub fn chunk_id_from_object(name: &str) -> Option<String> {
    let encoded = name.strip_suffix(OBJECT_SUFFIX)?;
    if encoded.is_empty() {
        return None;
    }
    let id = percent_decode_str(encoded).decode_utf8().ok()?.into_owned();
    validate_chunk_id(&id).ok()?;
    Some(id)
}

/// Catalog view over a set of chunks.
pub fn catalog_of<'a>(chunks: impl IntoIterator<Item = &'a ChunkData>) -> Catalog {
    chunks
        .into_iter()
        .map(|c| (c.meta.id.clone(), c.meta.clone()))
        .collect()
}
