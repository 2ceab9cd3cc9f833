//! Catalog comparison.

use serde::{Deserialize, Serialize};

use crate::chunk::Catalog;

/// A chunk present on both sides with diverging versions or content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionMismatch {
    pub id: String,
    pub local_version: u64,
    pub remote_version: u64,
}

/// Classification of every chunk id that needs work.
///
/// All lists are in ascending id order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkDiff {
    pub local_only: Vec<String>,
    pub remote_only: Vec<String>,
    pub version_mismatch: Vec<VersionMismatch>,
}

impl ChunkDiff {
    /// Number of ids needing any action.
    pub fn total(&self) -> usize {
        self.local_only.len() + self.remote_only.len() + self.version_mismatch.len()
    }

    /// Check if both catalogs already agree.
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Compare a local catalog against a remote catalog.
///
/// Ids on one side only are classified by side. Ids on both sides are a
/// mismatch when the versions differ, or when the versions are equal but the
/// checksums are not (a reused version counter). Pure and deterministic.
pub fn compute_diff(local: &Catalog, remote: &Catalog) -> ChunkDiff {
    let mut diff = ChunkDiff::default();

    for (id, local_meta) in local {
        match remote.get(id) {
            None => diff.local_only.push(id.clone()),
            Some(remote_meta) => {
                if local_meta.version != remote_meta.version
                    || local_meta.checksum != remote_meta.checksum
                {
                    diff.version_mismatch.push(VersionMismatch {
                        id: id.clone(),
                        local_version: local_meta.version,
                        remote_version: remote_meta.version,
                    });
                }
            }
        }
    }

    diff.remote_only = remote
        .keys()
        .filter(|id| !local.contains_key(*id))
        .cloned()
        .collect();

    diff
}
