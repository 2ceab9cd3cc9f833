//! Sync configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::fs;

use chunksync_common::{Error, Result};
use chunksync_storage::TransportConfig;

use crate::conflict::ConflictStrategy;

/// Which way chunks are allowed to flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncDirection {
    #[default]
    Bidirectional,
    /// Never download; remote-only chunks are ignored.
    UploadOnly,
    /// Never upload; local-only chunks are ignored.
    DownloadOnly,
}

impl SyncDirection {
    pub fn allows_upload(self) -> bool {
        self != SyncDirection::DownloadOnly
    }

    pub fn allows_download(self) -> bool {
        self != SyncDirection::UploadOnly
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncDirection::Bidirectional => "bidirectional",
            SyncDirection::UploadOnly => "upload-only",
            SyncDirection::DownloadOnly => "download-only",
        };
        f.write_str(name)
    }
}

impl FromStr for SyncDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bidirectional" => Ok(SyncDirection::Bidirectional),
            "upload-only" => Ok(SyncDirection::UploadOnly),
            "download-only" => Ok(SyncDirection::DownloadOnly),
            other => Err(Error::InvalidInput(format!("Unknown sync direction: {}", other))),
        }
    }
}

/// Default payload ceiling: 5 MiB.
pub const DEFAULT_MAX_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Default auto-sync period: five minutes.
pub const DEFAULT_AUTO_SYNC_INTERVAL_SECS: u64 = 300;

/// Longest accepted auto-sync period: one week.
pub const MAX_AUTO_SYNC_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

/// Configuration for the sync orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Remote endpoint settings.
    pub transport: TransportConfig,
    pub direction: SyncDirection,
    /// Strategy applied to version mismatches with diverged content.
    pub conflict_resolution: ConflictStrategy,
    pub auto_sync: bool,
    pub auto_sync_interval_secs: u64,
    /// Largest payload, in canonical bytes, that will be saved or uploaded.
    pub max_chunk_size: u64,
    /// zstd-compress remote documents.
    pub enable_compression: bool,
    /// Retries for a failed per-chunk remote operation.
    pub max_retries: u32,
    /// Chunk transfers in flight at once.
    pub max_concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            direction: SyncDirection::default(),
            conflict_resolution: ConflictStrategy::default(),
            auto_sync: false,
            auto_sync_interval_secs: DEFAULT_AUTO_SYNC_INTERVAL_SECS,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            enable_compression: true,
            max_retries: 3,
            max_concurrency: 4,
        }
    }
}

impl SyncConfig {
    /// Create a configuration for the given transport, other fields defaulted.
    pub fn new(transport: TransportConfig) -> Self {
        Self {
            transport,
            ..Self::default()
        }
    }

    /// Read a JSON configuration file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::Config(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as indented JSON.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).await?;
        Ok(())
    }

    /// Reject settings the orchestrator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.auto_sync && self.auto_sync_interval_secs == 0 {
            return Err(Error::Config(
                "autoSyncIntervalSecs must be positive when autoSync is enabled".to_string(),
            ));
        }
        if self.auto_sync_interval_secs > MAX_AUTO_SYNC_INTERVAL_SECS {
            return Err(Error::Config(format!(
                "autoSyncIntervalSecs must be at most {}",
                MAX_AUTO_SYNC_INTERVAL_SECS
            )));
        }
        if self.max_chunk_size == 0 {
            return Err(Error::Config("maxChunkSize must be positive".to_string()));
        }
        if self.max_concurrency == 0 {
            return Err(Error::Config("maxConcurrency must be positive".to_string()));
        }
        self.transport.validate()
    }

    /// Auto-sync period.
    pub fn auto_sync_interval(&self) -> Duration {
        Duration::from_secs(self.auto_sync_interval_secs)
    }
}
