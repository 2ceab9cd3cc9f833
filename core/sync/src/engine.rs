//! Sync orchestrator: drives one reconciliation cycle at a time between a
//! local chunk store and a remote transport.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, error, info, warn};

use chunksync_common::{validate_chunk_id, DeviceId, Error, Result};
use chunksync_storage::RemoteTransport;

use crate::chunk::{chunk_id_from_object, object_name, Catalog, ChunkData, ChunkMetadata};
use crate::config::SyncConfig;
use crate::conflict::{ConflictResolver, Decision};
use crate::device::DeviceIdentity;
use crate::diff::compute_diff;
use crate::events::{EventBus, SyncEvent, Subscription};
use crate::retry::{RetryConfig, RetryExecutor};
use crate::scheduler::{AutoSyncTimer, TickOutcome};
use crate::state::{SyncPhase, SyncProgress, SyncResult, SyncState, SyncStatus};
use crate::store::ChunkStore;

/// Error text of a cycle cut short by `destroy()`.
const ABORTED: &str = "aborted";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Upload,
    Download,
    /// Unresolved conflict, left as is on both sides.
    Hold,
}

/// One planned transfer.
#[derive(Debug, Clone)]
struct WorkItem {
    id: String,
    action: Action,
    phase: SyncPhase,
    /// Remote version to supersede when pushing local content over it.
    rebase_over: Option<u64>,
}

#[derive(Debug)]
enum Outcome {
    Transferred { tombstone: bool },
    Held,
    Skipped(Error),
    Aborted,
}

/// Everything a cycle learned during listing.
struct Snapshot {
    local: Catalog,
    remote: Catalog,
    /// Parsed remote documents, fetched once per cycle.
    documents: BTreeMap<String, ChunkData>,
    skipped: usize,
}

/// Resets the in-progress flag when a cycle ends, however it ends.
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct Inner {
    config: RwLock<SyncConfig>,
    state: Mutex<SyncState>,
    state_file: Mutex<Option<PathBuf>>,
    store: Arc<dyn ChunkStore>,
    transport: Arc<dyn RemoteTransport>,
    device: DeviceIdentity,
    events: EventBus,
    timer: Mutex<Option<AutoSyncTimer>>,
    /// Held by a cycle and by local writes so the store has one writer.
    store_lock: tokio::sync::Mutex<()>,
    syncing: AtomicBool,
    abort: AtomicBool,
    started: AtomicBool,
    destroyed: AtomicBool,
}

/// Single-owner sync engine.
///
/// Constructed once with its collaborators, optionally armed for automatic
/// sync with [`start`](Self::start), and torn down with
/// [`destroy`](Self::destroy). At most one cycle runs at a time.
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl SyncOrchestrator {
    /// Create an orchestrator.
    ///
    /// # Errors
    /// - `Error::Config` when `config` does not validate
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn ChunkStore>,
        transport: Arc<dyn RemoteTransport>,
        device: DeviceIdentity,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            "Sync orchestrator created (transport: {}, device: {})",
            transport.name(),
            device.id()
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config: RwLock::new(config),
                state: Mutex::new(SyncState::new()),
                state_file: Mutex::new(None),
                store,
                transport,
                device,
                events: EventBus::new(),
                timer: Mutex::new(None),
                store_lock: tokio::sync::Mutex::new(()),
                syncing: AtomicBool::new(false),
                abort: AtomicBool::new(false),
                started: AtomicBool::new(false),
                destroyed: AtomicBool::new(false),
            }),
        })
    }

    /// Restore state from `path` and persist it there after every cycle.
    ///
    /// The file keeps the outcome of the last cycle; the restored state is
    /// `Idle` since no cycle is running.
    pub async fn with_state_file(self, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = SyncState::load(&path).await?;
        debug!("Restored sync state from {}: {}", path.display(), state.status);
        *lock(&self.inner.state) = SyncState {
            status: SyncStatus::Idle,
            ..state
        };
        *lock(&self.inner.state_file) = Some(path);
        Ok(self)
    }

    /// Arm the auto-sync timer if enabled.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        self.inner.ensure_alive()?;
        self.inner.started.store(true, Ordering::SeqCst);
        Inner::rearm_timer(&self.inner);
        Ok(())
    }

    /// Run one sync cycle.
    ///
    /// Fatal cycle failures (unreachable remote, failed listing) come back as
    /// `Ok` with `success == false`; `Err` means the cycle never started.
    ///
    /// # Errors
    /// - `Error::SyncInProgress` when a cycle is already running
    /// - `Error::InvalidState` after `destroy()`
    pub async fn sync(&self) -> Result<SyncResult> {
        self.inner.sync().await
    }

    /// Save a new version of a chunk to the local store.
    ///
    /// # Errors
    /// - `Error::InvalidInput` for an invalid id or a payload over `max_chunk_size`
    pub async fn save_chunk<T: Serialize + ?Sized>(
        &self,
        id: &str,
        data: &T,
        data_type: &str,
    ) -> Result<ChunkMetadata> {
        self.inner.ensure_alive()?;
        validate_chunk_id(id)?;
        let payload = serde_json::to_value(data)?;
        let max = self.inner.config().max_chunk_size;

        let _store = self.inner.store_lock.lock().await;
        let previous = self.inner.read_local(id).await?.map(|c| c.meta);
        let chunk = ChunkData::next_version(
            previous.as_ref(),
            id,
            payload,
            data_type,
            self.inner.device.id(),
            Utc::now(),
        )?;

        if chunk.meta.size > max {
            return Err(Error::InvalidInput(format!(
                "Chunk '{}' is {} bytes, limit is {}",
                id, chunk.meta.size, max
            )));
        }

        let meta = chunk.meta.clone();
        self.inner.store.write(chunk).await?;
        debug!("Saved chunk {} v{}", id, meta.version);
        Ok(meta)
    }

    /// Read a live chunk from the local store.
    ///
    /// Returns `None` for unknown and deleted ids.
    pub async fn get_chunk<T: DeserializeOwned>(&self, id: &str) -> Result<Option<ChunkData<T>>> {
        match self.inner.read_local(id).await? {
            Some(chunk) if !chunk.meta.is_tombstone() => Ok(Some(chunk.decode()?)),
            _ => Ok(None),
        }
    }

    /// Delete a chunk by recording a tombstone.
    ///
    /// # Errors
    /// - `Error::NotFound` when the id is unknown or already deleted
    pub async fn delete_chunk(&self, id: &str) -> Result<ChunkMetadata> {
        self.inner.ensure_alive()?;
        let _store = self.inner.store_lock.lock().await;

        let current = match self.inner.read_local(id).await? {
            Some(chunk) if !chunk.meta.is_tombstone() => chunk.meta,
            _ => return Err(Error::NotFound(format!("Chunk not found: {}", id))),
        };

        let tombstone = ChunkData::tombstone(&current, self.inner.device.id(), Utc::now())?;
        self.inner.store.delete(tombstone.meta.clone()).await?;
        debug!("Deleted chunk {} (tombstone v{})", id, tombstone.meta.version);
        Ok(tombstone.meta)
    }

    /// Metadata of every live local chunk, in id order.
    pub async fn list_chunks(&self) -> Result<Vec<ChunkMetadata>> {
        Ok(self
            .inner
            .store
            .catalog()
            .await?
            .into_values()
            .filter(|m| !m.is_tombstone())
            .collect())
    }

    /// Current state snapshot.
    pub fn state(&self) -> SyncState {
        lock(&self.inner.state).clone()
    }

    /// Current configuration.
    pub fn config(&self) -> SyncConfig {
        self.inner.config()
    }

    /// This installation's device id.
    pub fn device_id(&self) -> &DeviceId {
        self.inner.device.id()
    }

    /// Replace the configuration.
    ///
    /// The auto-sync timer is re-armed (or stopped) to match.
    ///
    /// # Errors
    /// - `Error::SyncInProgress` while a cycle is running
    /// - `Error::Config` when `config` does not validate
    pub fn update_config(&self, config: SyncConfig) -> Result<()> {
        self.inner.ensure_alive()?;
        config.validate()?;
        if self.inner.syncing.load(Ordering::SeqCst) {
            return Err(Error::SyncInProgress);
        }

        *self
            .inner
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner) = config;
        Inner::rearm_timer(&self.inner);
        Ok(())
    }

    /// Enable or disable automatic sync.
    pub fn set_auto_sync(&self, enabled: bool) -> Result<()> {
        let config = SyncConfig {
            auto_sync: enabled,
            ..self.config()
        };
        self.update_config(config)
    }

    /// Whether the auto-sync timer is armed.
    pub fn is_auto_syncing(&self) -> bool {
        lock(&self.inner.timer)
            .as_ref()
            .map(|t| t.is_running())
            .unwrap_or(false)
    }

    /// Register an event listener.
    ///
    /// The listener stays registered while the returned subscription lives.
    #[must_use = "dropping the subscription unregisters the listener"]
    pub fn add_event_listener<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(listener)
    }

    /// Tear down: stop the timer, abort a running cycle between items, and
    /// reject further cycles.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.abort.store(true, Ordering::SeqCst);
        if let Some(mut timer) = lock(&self.inner.timer).take() {
            timer.stop();
        }
        info!("Sync orchestrator destroyed");
    }

    /// Whether `destroy()` was called.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }
}

impl Drop for SyncOrchestrator {
    fn drop(&mut self) {
        if let Some(mut timer) = lock(&self.inner.timer).take() {
            timer.stop();
        }
    }
}

impl Inner {
    fn config(&self) -> SyncConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(Error::InvalidState("Sync orchestrator destroyed".to_string()));
        }
        Ok(())
    }

    async fn read_local(&self, id: &str) -> Result<Option<ChunkData>> {
        match self.store.read(id).await {
            Ok(chunk) => Ok(Some(chunk)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn rearm_timer(this: &Arc<Self>) {
        let mut timer = lock(&this.timer);
        if let Some(mut previous) = timer.take() {
            previous.stop();
        }

        let config = this.config();
        if !this.started.load(Ordering::SeqCst) || !config.auto_sync {
            return;
        }

        let weak = Arc::downgrade(this);
        *timer = Some(AutoSyncTimer::start(config.auto_sync_interval(), move || {
            let weak = weak.clone();
            async move {
                let Some(inner) = weak.upgrade() else {
                    return TickOutcome::Stop;
                };
                if inner.destroyed.load(Ordering::SeqCst) {
                    return TickOutcome::Stop;
                }
                if inner.syncing.load(Ordering::SeqCst) {
                    debug!("Auto-sync tick skipped: cycle in progress");
                    return TickOutcome::Continue;
                }
                match inner.sync().await {
                    Ok(result) => debug!("Auto-sync finished: {}", result.status),
                    Err(Error::SyncInProgress) => debug!("Auto-sync tick lost the race to a manual sync"),
                    Err(e) => warn!("Auto-sync failed to start: {}", e),
                }
                TickOutcome::Continue
            }
        }));
    }

    fn emit(&self, event: SyncEvent) {
        self.events.emit(&event);
    }

    fn set_state(&self, state: SyncState) {
        let status = state.status;
        *lock(&self.state) = state;
        self.emit(SyncEvent::StatusChanged { status });
    }

    fn progress(&self, phase: SyncPhase, current: Option<String>, processed: usize, total: usize) {
        self.emit(SyncEvent::Progress(SyncProgress::new(phase, current, processed, total)));
    }

    async fn sync(&self) -> Result<SyncResult> {
        self.ensure_alive()?;
        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::SyncInProgress);
        }
        let _guard = CycleGuard(&self.syncing);
        let _store = self.store_lock.lock().await;

        let config = self.config();
        let mut result = SyncResult::started(Utc::now());
        info!(
            "Sync started ({}, {} conflicts)",
            config.direction, config.conflict_resolution
        );

        let previous = lock(&self.state).clone();
        self.set_state(SyncState {
            status: SyncStatus::Syncing,
            ..previous
        });

        let pending = match self.run_cycle(&config, &mut result).await {
            Ok(pending) => pending,
            Err(e) => {
                error!("Sync failed: {}", e);
                result.success = false;
                result.error = Some(e.to_string());
                self.emit(SyncEvent::Error {
                    error: e.to_string(),
                });
                (0, 0)
            }
        };

        // A cycle that only skipped is a failure
        if result.success
            && result.skipped_chunks > 0
            && result.transferred() == 0
            && result.conflicts.is_empty()
        {
            let error = format!("all {} chunks skipped", result.skipped_chunks);
            warn!("Sync made no progress: {}", error);
            result.success = false;
            result.error = Some(error.clone());
            self.emit(SyncEvent::Error { error });
        }

        result.end_time = Utc::now();
        result.status = if !result.success {
            SyncStatus::Error
        } else if !result.conflicts.is_empty() {
            SyncStatus::Conflict
        } else {
            SyncStatus::Success
        };

        let previous = lock(&self.state).clone();
        let state = SyncState {
            status: result.status,
            last_sync_time: if result.success {
                Some(result.end_time)
            } else {
                previous.last_sync_time
            },
            last_error: result.error.clone(),
            pending_uploads: pending.0,
            pending_downloads: pending.1,
            conflicts: result.conflicts.clone(),
        };
        self.persist_state(&state).await;
        self.set_state(state.clone());
        self.emit(SyncEvent::Completed(result.clone()));
        self.set_state(SyncState {
            status: SyncStatus::Idle,
            ..state
        });

        info!(
            "Sync finished: {} ({} up, {} down, {} deleted, {} skipped, {} conflicts)",
            result.status,
            result.uploaded_chunks,
            result.downloaded_chunks,
            result.deleted_chunks,
            result.skipped_chunks,
            result.conflicts.len()
        );
        Ok(result)
    }

    async fn persist_state(&self, state: &SyncState) {
        let path = lock(&self.state_file).clone();
        if let Some(path) = path {
            if let Err(e) = state.save(&path).await {
                warn!("Failed to persist sync state to {}: {}", path.display(), e);
            }
        }
    }

    /// Run the phases of one cycle, filling `result`.
    ///
    /// Returns the uploads and downloads left pending. `Err` is fatal.
    async fn run_cycle(&self, config: &SyncConfig, result: &mut SyncResult) -> Result<(usize, usize)> {
        let op_timeout = config.transport.timeout();
        let connect = RetryExecutor::new(RetryConfig::new(0)).with_attempt_timeout(op_timeout);
        let transfer =
            RetryExecutor::new(RetryConfig::new(config.max_retries)).with_attempt_timeout(op_timeout);

        self.progress(SyncPhase::Connecting, None, 0, 0);
        connect
            .execute("connect", || self.transport.check_connection())
            .await?;

        self.progress(SyncPhase::Listing, None, 0, 0);
        let snapshot = self.list(config, &connect, &transfer).await?;
        result.skipped_chunks += snapshot.skipped;

        let items = self.plan(config, &snapshot, result);
        let total = items.len();
        let mut pending_up = items.iter().filter(|i| i.action == Action::Upload).count();
        let mut pending_down = items.iter().filter(|i| i.action == Action::Download).count();
        debug!(
            "Planned {} uploads and {} downloads",
            pending_up, pending_down
        );

        let mut processed = 0;
        let mut aborted = false;
        let mut outcomes = stream::iter(items)
            .map(|item| self.process(item, config, &snapshot, &transfer))
            .buffer_unordered(config.max_concurrency);

        while let Some((item, outcome)) = outcomes.next().await {
            match outcome {
                Outcome::Transferred { tombstone } => {
                    match item.action {
                        Action::Upload => pending_up -= 1,
                        Action::Download => pending_down -= 1,
                        Action::Hold => {}
                    }
                    if tombstone {
                        result.deleted_chunks += 1;
                    } else if item.action == Action::Upload {
                        result.uploaded_chunks += 1;
                    } else {
                        result.downloaded_chunks += 1;
                    }
                }
                Outcome::Held => {}
                Outcome::Skipped(e) => {
                    warn!("Skipping chunk {}: {}", item.id, e);
                    result.skipped_chunks += 1;
                }
                Outcome::Aborted => {
                    aborted = true;
                    continue;
                }
            }

            processed += 1;
            self.progress(item.phase, Some(item.id), processed, total);
        }

        if aborted {
            warn!("Sync aborted after {} of {} chunks", processed, total);
            result.success = false;
            result.error = Some(ABORTED.to_string());
        }

        self.progress(SyncPhase::Completed, None, processed, total);
        Ok((pending_up, pending_down))
    }

    /// Fetch both catalogs and every remote chunk document.
    async fn list(
        &self,
        config: &SyncConfig,
        connect: &RetryExecutor,
        transfer: &RetryExecutor,
    ) -> Result<Snapshot> {
        let local = self.store.catalog().await?;
        let objects = connect.execute("list", || self.transport.list()).await?;

        let names: Vec<(String, String)> = objects
            .into_iter()
            .filter_map(|o| match chunk_id_from_object(&o.name) {
                Some(id) => Some((id, o.name)),
                None => {
                    debug!("Ignoring non-chunk object {}", o.name);
                    None
                }
            })
            .collect();

        let fetched: Vec<(String, Result<ChunkData>)> = stream::iter(names)
            .map(|(id, name)| async move {
                let doc = transfer
                    .execute(&format!("get {}", name), || self.transport.get(&name))
                    .await
                    .and_then(|bytes| ChunkData::from_document(&bytes));
                (id, doc)
            })
            .buffer_unordered(config.max_concurrency)
            .collect()
            .await;

        let mut documents = BTreeMap::new();
        let mut unreadable = BTreeSet::new();
        for (id, doc) in fetched {
            match doc {
                Ok(doc) if doc.meta.id == id => {
                    documents.insert(id, doc);
                }
                Ok(doc) => {
                    warn!(
                        "Remote object for '{}' holds chunk '{}'; skipping",
                        id, doc.meta.id
                    );
                    unreadable.insert(id);
                }
                Err(e) => {
                    warn!("Cannot read remote chunk '{}': {}", id, e);
                    unreadable.insert(id);
                }
            }
        }

        // Unreadable ids sit out the cycle on both sides
        let local: Catalog = local
            .into_iter()
            .filter(|(id, _)| !unreadable.contains(id))
            .collect();
        let remote: Catalog = documents
            .iter()
            .map(|(id, doc)| (id.clone(), doc.meta.clone()))
            .collect();

        debug!(
            "Listed {} local and {} remote chunks ({} unreadable)",
            local.len(),
            remote.len(),
            unreadable.len()
        );

        Ok(Snapshot {
            local,
            remote,
            documents,
            skipped: unreadable.len(),
        })
    }

    /// Turn the catalog diff into transfers, recording unresolved conflicts.
    fn plan(&self, config: &SyncConfig, snapshot: &Snapshot, result: &mut SyncResult) -> Vec<WorkItem> {
        let diff = compute_diff(&snapshot.local, &snapshot.remote);
        let direction = config.direction;
        let resolver = ConflictResolver::new(config.conflict_resolution);
        let mut items = Vec::with_capacity(diff.total());

        if direction.allows_download() {
            items.extend(diff.remote_only.into_iter().map(|id| WorkItem {
                id,
                action: Action::Download,
                phase: SyncPhase::Downloading,
                rebase_over: None,
            }));
        }

        if direction.allows_upload() {
            items.extend(diff.local_only.into_iter().map(|id| WorkItem {
                id,
                action: Action::Upload,
                phase: SyncPhase::Uploading,
                rebase_over: None,
            }));
        }

        for mismatch in diff.version_mismatch {
            let (Some(local), Some(remote)) = (
                snapshot.local.get(&mismatch.id),
                snapshot.remote.get(&mismatch.id),
            ) else {
                continue;
            };

            let (action, rebase_over) = if local.same_content(remote) {
                // Same payload under different versions: fast-forward the lower side
                if remote.version > local.version {
                    (Action::Download, None)
                } else {
                    (Action::Upload, None)
                }
            } else {
                match resolver.resolve(&mismatch.id, local, remote) {
                    Decision::KeepLocal => (Action::Upload, Some(remote.version)),
                    Decision::KeepRemote => (Action::Download, None),
                    Decision::Unresolved => {
                        info!(
                            "Conflict on chunk {} (local v{}, remote v{})",
                            mismatch.id, mismatch.local_version, mismatch.remote_version
                        );
                        self.emit(SyncEvent::Conflict {
                            id: mismatch.id.clone(),
                        });
                        result.conflicts.push(mismatch.id.clone());
                        (Action::Hold, None)
                    }
                }
            };

            let allowed = match action {
                Action::Upload => direction.allows_upload(),
                Action::Download => direction.allows_download(),
                Action::Hold => true,
            };
            if allowed {
                items.push(WorkItem {
                    id: mismatch.id,
                    action,
                    phase: SyncPhase::Merging,
                    rebase_over,
                });
            }
        }

        items
    }

    async fn process(
        &self,
        item: WorkItem,
        config: &SyncConfig,
        snapshot: &Snapshot,
        transfer: &RetryExecutor,
    ) -> (WorkItem, Outcome) {
        if self.abort.load(Ordering::SeqCst) {
            return (item, Outcome::Aborted);
        }

        let outcome = match item.action {
            Action::Download => self.download(&item.id, snapshot).await,
            Action::Upload => self.upload(&item, config, transfer).await,
            Action::Hold => return (item, Outcome::Held),
        };

        let outcome = match outcome {
            Ok(tombstone) => Outcome::Transferred { tombstone },
            Err(e) => Outcome::Skipped(e),
        };
        (item, outcome)
    }

    /// Apply a cached remote document locally. Returns whether it was a tombstone.
    async fn download(&self, id: &str, snapshot: &Snapshot) -> Result<bool> {
        let doc = snapshot
            .documents
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Remote chunk not found: {}", id)))?;

        doc.verify()?;
        let tombstone = doc.meta.is_tombstone();
        debug!("Downloading chunk {} v{}", id, doc.meta.version);

        if tombstone {
            self.store.delete(doc.meta).await?;
        } else {
            self.store.write(doc).await?;
        }
        Ok(tombstone)
    }

    /// Push the local version of a chunk. Returns whether it was a tombstone.
    async fn upload(&self, item: &WorkItem, config: &SyncConfig, transfer: &RetryExecutor) -> Result<bool> {
        let mut chunk = self.store.read(&item.id).await?;
        chunk.verify()?;

        if chunk.meta.size > config.max_chunk_size {
            return Err(Error::InvalidInput(format!(
                "Chunk '{}' is {} bytes, limit is {}",
                item.id, chunk.meta.size, config.max_chunk_size
            )));
        }

        let rebased = match item.rebase_over {
            Some(remote_version) if chunk.meta.version <= remote_version => {
                chunk.meta.version = remote_version + 1;
                true
            }
            _ => false,
        };

        let name = object_name(&item.id);
        let document = chunk.to_document(config.enable_compression)?;
        debug!("Uploading chunk {} v{}", item.id, chunk.meta.version);

        transfer
            .execute(&format!("put {}", name), || {
                self.transport.put(&name, document.clone())
            })
            .await?;

        let tombstone = chunk.meta.is_tombstone();
        if rebased {
            // Keep the local copy on the version now published
            if tombstone {
                self.store.delete(chunk.meta).await?;
            } else {
                self.store.write(chunk).await?;
            }
        }
        Ok(tombstone)
    }
}
