//! Conflict resolution between diverged chunk versions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use chunksync_common::Error;

use crate::chunk::ChunkMetadata;

/// Conflict resolution strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    /// Push the local version over the remote one.
    Local,
    /// Take the remote version.
    Remote,
    /// Leave the chunk untouched and report it.
    Manual,
    /// Keep whichever side was updated later.
    #[default]
    Timestamp,
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConflictStrategy::Local => "local",
            ConflictStrategy::Remote => "remote",
            ConflictStrategy::Manual => "manual",
            ConflictStrategy::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

impl FromStr for ConflictStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(ConflictStrategy::Local),
            "remote" => Ok(ConflictStrategy::Remote),
            "manual" => Ok(ConflictStrategy::Manual),
            "timestamp" => Ok(ConflictStrategy::Timestamp),
            other => Err(Error::InvalidInput(format!(
                "Unknown conflict strategy: {}",
                other
            ))),
        }
    }
}

/// Outcome of resolving one conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Upload the local version.
    KeepLocal,
    /// Download the remote version.
    KeepRemote,
    /// Transfer nothing; the conflict stays pending.
    Unresolved,
}

/// Decide which version of a chunk survives.
///
/// Pure. Under `Timestamp` the strictly newer `updated_at` wins and an exact
/// tie goes to the remote side.
pub fn resolve(
    id: &str,
    local: &ChunkMetadata,
    remote: &ChunkMetadata,
    strategy: ConflictStrategy,
) -> Decision {
    debug_assert_eq!(local.id, id);
    debug_assert_eq!(remote.id, id);

    match strategy {
        ConflictStrategy::Local => Decision::KeepLocal,
        ConflictStrategy::Remote => Decision::KeepRemote,
        ConflictStrategy::Manual => Decision::Unresolved,
        ConflictStrategy::Timestamp => {
            if local.updated_at > remote.updated_at {
                Decision::KeepLocal
            } else {
                Decision::KeepRemote
            }
        }
    }
}

/// Resolver bound to a configured strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver {
    strategy: ConflictStrategy,
}

impl ConflictResolver {
    /// Create a new conflict resolver.
    pub fn new(strategy: ConflictStrategy) -> Self {
        Self { strategy }
    }

    /// Get the configured strategy.
    pub fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    /// Resolve a conflict with the configured strategy.
    pub fn resolve(&self, id: &str, local: &ChunkMetadata, remote: &ChunkMetadata) -> Decision {
        resolve(id, local, remote, self.strategy)
    }
}
