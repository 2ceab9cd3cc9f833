//! chunksync sync engine
//!
//! Reconciles a local chunk store with a flat remote namespace of chunk
//! documents:
//! - Chunk model, checksums and per-installation device identity
//! - Catalog diffing and conflict resolution strategies
//! - A single-owner orchestrator running one cycle at a time
//! - Event delivery, retry with backoff and an auto-sync timer

pub mod checksum;
pub mod chunk;
pub mod config;
pub mod conflict;
pub mod device;
pub mod diff;
pub mod engine;
pub mod events;
pub mod file_store;
pub mod retry;
pub mod scheduler;
pub mod state;
pub mod store;

// Re-export main types
pub use chunk::{Catalog, ChunkData, ChunkMetadata, Payload};
pub use config::{SyncConfig, SyncDirection};
pub use conflict::{resolve, ConflictResolver, ConflictStrategy, Decision};
pub use device::DeviceIdentity;
pub use diff::{compute_diff, ChunkDiff, VersionMismatch};
pub use engine::SyncOrchestrator;
pub use events::{EventBus, Subscription, SyncEvent};
pub use file_store::FileChunkStore;
pub use retry::{RetryConfig, RetryExecutor};
pub use scheduler::{AutoSyncTimer, TickOutcome};
pub use state::{SyncPhase, SyncProgress, SyncResult, SyncState, SyncStatus};
pub use store::{ChunkStore, MemoryChunkStore};
