//! Sync state, progress and cycle results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tokio::fs;

use chunksync_common::{Error, Result};

/// Lifecycle status of the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// No cycle has run, or the last result was acknowledged.
    #[default]
    Idle,
    /// A cycle is running.
    Syncing,
    /// Last cycle completed without conflicts.
    Success,
    /// Last cycle hit a fatal error.
    Error,
    /// Last cycle completed with unresolved conflicts.
    Conflict,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Success => "success",
            SyncStatus::Error => "error",
            SyncStatus::Conflict => "conflict",
        };
        f.write_str(name)
    }
}

/// Phase of a running cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Connecting,
    Listing,
    Downloading,
    Uploading,
    Merging,
    Completed,
}

/// Observable state of the orchestrator.
///
/// Replaced wholesale on every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub status: SyncStatus,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_sync_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub pending_uploads: usize,
    #[serde(default)]
    pub pending_downloads: usize,
    /// Chunk ids with unresolved conflicts from the last cycle.
    #[serde(default)]
    pub conflicts: Vec<String>,
}

impl SyncState {
    /// Create a new idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a cycle is running.
    pub fn is_syncing(&self) -> bool {
        self.status == SyncStatus::Syncing
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from JSON.
    ///
    /// A state persisted mid-cycle comes back as `Idle`; no cycle survives a restart.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut state: Self =
            serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;
        if state.status == SyncStatus::Syncing {
            state.status = SyncStatus::Idle;
        }
        Ok(state)
    }

    /// Load persisted state, or a fresh state if the file does not exist.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !fs::try_exists(path).await? {
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path).await?;
        Self::from_json(&content)
    }

    /// Persist state, replacing the file atomically.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, self.to_json()?).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

/// Progress snapshot emitted after every processed item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    pub phase: SyncPhase,
    /// Percentage in `0.0..=100.0`.
    pub total_progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_chunk: Option<String>,
    pub processed_chunks: usize,
    pub total_chunks: usize,
}

impl SyncProgress {
    /// Build a snapshot, deriving the percentage from the counts.
    pub fn new(
        phase: SyncPhase,
        current_chunk: Option<String>,
        processed_chunks: usize,
        total_chunks: usize,
    ) -> Self {
        let total_progress = if total_chunks == 0 {
            100.0
        } else {
            processed_chunks as f64 * 100.0 / total_chunks as f64
        };
        Self {
            phase,
            total_progress,
            current_chunk,
            processed_chunks,
            total_chunks,
        }
    }
}

/// Outcome of one sync cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    /// False only when the cycle hit a fatal error.
    pub success: bool,
    pub status: SyncStatus,
    pub uploaded_chunks: usize,
    pub downloaded_chunks: usize,
    /// Tombstones transferred in either direction.
    pub deleted_chunks: usize,
    pub skipped_chunks: usize,
    pub conflicts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub end_time: DateTime<Utc>,
}

impl SyncResult {
    /// Empty result for a cycle starting now.
    pub fn started(start_time: DateTime<Utc>) -> Self {
        Self {
            success: true,
            status: SyncStatus::Syncing,
            uploaded_chunks: 0,
            downloaded_chunks: 0,
            deleted_chunks: 0,
            skipped_chunks: 0,
            conflicts: Vec::new(),
            error: None,
            start_time,
            end_time: start_time,
        }
    }

    /// Number of chunks transferred in either direction.
    pub fn transferred(&self) -> usize {
        self.uploaded_chunks + self.downloaded_chunks + self.deleted_chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_progress_percentage() {
        let p = SyncProgress::new(SyncPhase::Uploading, Some("a".to_string()), 1, 4);
        assert_eq!(p.total_progress, 25.0);

        let done = SyncProgress::new(SyncPhase::Completed, None, 0, 0);
        assert_eq!(done.total_progress, 100.0);
    }

    #[test]
    fn test_progress_wire_format() {
        let p = SyncProgress::new(SyncPhase::Downloading, Some("x".to_string()), 1, 2);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["phase"], "downloading");
        assert_eq!(json["currentChunk"], "x");
        assert_eq!(json["processedChunks"], 1);
        assert_eq!(json["totalChunks"], 2);
        assert_eq!(json["totalProgress"], 50.0);
    }

    #[test]
    fn test_state_serialization() {
        let state = SyncState {
            status: SyncStatus::Conflict,
            last_sync_time: DateTime::from_timestamp_millis(1_700_000_000_000),
            last_error: None,
            pending_uploads: 0,
            pending_downloads: 0,
            conflicts: vec!["X".to_string()],
        };

        let json = state.to_json().unwrap();
        assert!(json.contains("\"lastSyncTime\": 1700000000000"));
        assert_eq!(SyncState::from_json(&json).unwrap(), state);
    }

    #[test]
    fn test_restored_syncing_becomes_idle() {
        let state = SyncState::from_json(r#"{"status":"syncing"}"#).unwrap();
        assert_eq!(state.status, SyncStatus::Idle);
        assert!(state.last_sync_time.is_none());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("state.json");

        assert_eq!(SyncState::load(&path).await.unwrap(), SyncState::new());

        let state = SyncState {
            status: SyncStatus::Error,
            last_error: Some("unreachable".to_string()),
            ..SyncState::new()
        };
        state.save(&path).await.unwrap();

        assert_eq!(SyncState::load(&path).await.unwrap(), state);
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_load_garbage_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            SyncState::load(&path).await,
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_result_counts() {
        let mut result = SyncResult::started(Utc::now());
        result.uploaded_chunks = 2;
        result.deleted_chunks = 1;
        assert_eq!(result.transferred(), 3);
        assert!(result.success);
    }
}
