use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use chunksync_common::{DeviceId, Error, Result};
use chunksync_storage::{LocalTransport, MemoryTransport, ObjectInfo, RemoteTransport};
use chunksync_sync::chunk::object_name;
use chunksync_sync::{
    ChunkData, ChunkStore, ConflictStrategy, DeviceIdentity, FileChunkStore, MemoryChunkStore,
    SyncConfig, SyncDirection, SyncEvent, SyncOrchestrator, SyncPhase, SyncState, SyncStatus,
};

/// Memory transport with switchable failures.
#[derive(Clone, Default)]
struct FaultyTransport {
    inner: MemoryTransport,
    failing_puts: Arc<Mutex<HashSet<String>>>,
    down: Arc<AtomicBool>,
    connect_delay: Arc<Mutex<Option<Duration>>>,
    put_delay: Arc<Mutex<Option<Duration>>>,
    puts: Arc<AtomicUsize>,
}

impl FaultyTransport {
    fn fail_put(&self, id: &str) {
        self.failing_puts.lock().unwrap().insert(object_name(id));
    }

    fn heal(&self) {
        self.failing_puts.lock().unwrap().clear();
        self.down.store(false, Ordering::SeqCst);
    }

    fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteTransport for FaultyTransport {
    fn name(&self) -> &str {
        "faulty"
    }

    async fn check_connection(&self) -> Result<()> {
        let delay = *self.connect_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.down.load(Ordering::SeqCst) {
            return Err(Error::Network("connection refused".to_string()));
        }
        self.inner.check_connection().await
    }

    async fn list(&self) -> Result<Vec<ObjectInfo>> {
        self.inner.list().await
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>> {
        self.inner.get(name).await
    }

    async fn put(&self, name: &str, data: Vec<u8>) -> Result<ObjectInfo> {
        let delay = *self.put_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_puts.lock().unwrap().contains(name) {
            return Err(Error::Network(format!("upload of {} failed", name)));
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(name, data).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.inner.delete(name).await
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        self.inner.exists(name).await
    }
}

struct Device {
    orch: SyncOrchestrator,
    store: MemoryChunkStore,
}

fn config() -> SyncConfig {
    SyncConfig {
        max_retries: 0,
        ..SyncConfig::default()
    }
}

fn device(name: &str, config: SyncConfig, remote: &FaultyTransport) -> Device {
    let store = MemoryChunkStore::new();
    let identity = DeviceIdentity::fixed(DeviceId::new(name).unwrap());
    let orch = SyncOrchestrator::new(
        config,
        Arc::new(store.clone()),
        Arc::new(remote.clone()),
        identity,
    )
    .unwrap();
    Device { orch, store }
}

fn record_events(orch: &SyncOrchestrator) -> (Arc<Mutex<Vec<SyncEvent>>>, chunksync_sync::Subscription) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let sub = orch.add_event_listener(move |e| sink.lock().unwrap().push(e.clone()));
    (events, sub)
}

/// Id, version and checksum of every chunk in a store.
async fn fingerprint(store: &dyn ChunkStore) -> Vec<(String, u64, String)> {
    store
        .catalog()
        .await
        .unwrap()
        .into_values()
        .map(|m| (m.id, m.version, m.checksum))
        .collect()
}

async fn remote_fingerprint(remote: &FaultyTransport) -> Vec<(String, u64, String)> {
    let mut out = Vec::new();
    for object in remote.inner.list().await.unwrap() {
        let doc = ChunkData::from_document(&remote.inner.get(&object.name).await.unwrap()).unwrap();
        out.push((doc.meta.id, doc.meta.version, doc.meta.checksum));
    }
    out.sort();
    out
}

async fn tick() {
    // Millisecond timestamps need a visible gap between edits
    tokio::time::sleep(Duration::from_millis(5)).await;
}

// --- Basic cycles ---

#[tokio::test]
async fn profile_scenario_uploads_each_version() {
    let remote = FaultyTransport::default();
    let a = device("device-a", config(), &remote);

    a.orch.save_chunk("profile", &json!({"name": "a"}), "settings").await.unwrap();
    let first = a.orch.sync().await.unwrap();
    assert!(first.success);
    assert_eq!(first.status, SyncStatus::Success);
    assert_eq!(first.uploaded_chunks, 1);

    let doc = ChunkData::from_document(&remote.inner.get("profile.json").await.unwrap()).unwrap();
    assert_eq!(doc.meta.version, 1);
    let first_checksum = doc.meta.checksum;

    a.orch.save_chunk("profile", &json!({"name": "b"}), "settings").await.unwrap();
    let second = a.orch.sync().await.unwrap();
    assert_eq!(second.uploaded_chunks, 1);
    assert!(second.conflicts.is_empty());

    let doc = ChunkData::from_document(&remote.inner.get("profile.json").await.unwrap()).unwrap();
    assert_eq!(doc.meta.version, 2);
    assert_ne!(doc.meta.checksum, first_checksum);
    assert_eq!(doc.data, json!({"name": "b"}));
}

#[tokio::test]
async fn second_sync_is_idempotent() {
    let remote = FaultyTransport::default();
    let a = device("device-a", config(), &remote);
    let b = device("device-b", config(), &remote);

    a.orch.save_chunk("x", &json!(1), "n").await.unwrap();
    a.orch.save_chunk("y", &json!(2), "n").await.unwrap();
    b.orch.save_chunk("z", &json!(3), "n").await.unwrap();
    b.orch.sync().await.unwrap();

    let first = a.orch.sync().await.unwrap();
    assert_eq!(first.uploaded_chunks, 2);
    assert_eq!(first.downloaded_chunks, 1);

    let second = a.orch.sync().await.unwrap();
    assert_eq!(second.uploaded_chunks, 0);
    assert_eq!(second.downloaded_chunks, 0);
    assert_eq!(second.deleted_chunks, 0);
    assert!(second.conflicts.is_empty());
    assert_eq!(second.status, SyncStatus::Success);
}

#[tokio::test]
async fn bidirectional_cycles_converge() {
    let remote = FaultyTransport::default();
    let a = device("device-a", config(), &remote);
    let b = device("device-b", config(), &remote);

    a.orch.save_chunk("notes/1", &json!({"t": "a"}), "note").await.unwrap();
    a.orch.save_chunk("shared", &json!([1, 2]), "list").await.unwrap();
    b.orch.save_chunk("notes/2", &json!({"t": "b"}), "note").await.unwrap();

    a.orch.sync().await.unwrap();
    b.orch.sync().await.unwrap();
    let last = a.orch.sync().await.unwrap();
    assert!(last.success);

    let local_a = fingerprint(&a.store).await;
    let local_b = fingerprint(&b.store).await;
    assert_eq!(local_a.len(), 3);
    assert_eq!(local_a, local_b);
    assert_eq!(local_a, remote_fingerprint(&remote).await);
}

// --- Conflicts ---

async fn diverge(a: &Device, b: &Device) {
    a.orch.save_chunk("X", &json!("v1"), "text").await.unwrap();
    a.orch.sync().await.unwrap();
    b.orch.sync().await.unwrap();

    tick().await;
    a.orch.save_chunk("X", &json!("from a"), "text").await.unwrap();
    a.orch.sync().await.unwrap();
    tick().await;
    b.orch.save_chunk("X", &json!("from b"), "text").await.unwrap();
}

#[tokio::test]
async fn timestamp_strategy_keeps_newest_edit() {
    let remote = FaultyTransport::default();
    let cfg = SyncConfig {
        conflict_resolution: ConflictStrategy::Timestamp,
        ..config()
    };
    let a = device("device-a", cfg.clone(), &remote);
    let b = device("device-b", cfg, &remote);
    diverge(&a, &b).await;

    // B edited last, so its version is pushed over A's
    let result = b.orch.sync().await.unwrap();
    assert_eq!(result.uploaded_chunks, 1);
    assert!(result.conflicts.is_empty());

    let result = a.orch.sync().await.unwrap();
    assert_eq!(result.downloaded_chunks, 1);

    let on_a = a.orch.get_chunk::<String>("X").await.unwrap().unwrap();
    let on_b = b.orch.get_chunk::<String>("X").await.unwrap().unwrap();
    assert_eq!(on_a.data, "from b");
    assert_eq!(on_a.meta.version, 3);
    assert_eq!(on_a.meta, on_b.meta);

    assert_eq!(a.orch.sync().await.unwrap().transferred(), 0);
    assert_eq!(b.orch.sync().await.unwrap().transferred(), 0);
}

#[tokio::test]
async fn remote_strategy_discards_local_edit() {
    let remote = FaultyTransport::default();
    let cfg = SyncConfig {
        conflict_resolution: ConflictStrategy::Remote,
        ..config()
    };
    let a = device("device-a", cfg.clone(), &remote);
    let b = device("device-b", cfg, &remote);
    diverge(&a, &b).await;

    let result = b.orch.sync().await.unwrap();
    assert_eq!(result.downloaded_chunks, 1);
    let on_b = b.orch.get_chunk::<String>("X").await.unwrap().unwrap();
    assert_eq!(on_b.data, "from a");
}

#[tokio::test]
async fn manual_conflicts_stay_pending() {
    let remote = FaultyTransport::default();
    let cfg = SyncConfig {
        conflict_resolution: ConflictStrategy::Manual,
        ..config()
    };
    let a = device("device-a", cfg.clone(), &remote);
    let b = device("device-b", cfg, &remote);
    diverge(&a, &b).await;

    let (events, _sub) = record_events(&b.orch);
    let result = b.orch.sync().await.unwrap();
    assert!(result.success);
    assert_eq!(result.status, SyncStatus::Conflict);
    assert_eq!(result.conflicts, vec!["X"]);
    assert_eq!(result.transferred(), 0);
    assert_eq!(b.orch.state().conflicts, vec!["X"]);

    let events = events.lock().unwrap().clone();
    assert!(events
        .iter()
        .any(|e| matches!(e, SyncEvent::Conflict { id } if id == "X")));
    let items: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            SyncEvent::Progress(p) if p.current_chunk.is_some() => Some(p.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].phase, SyncPhase::Merging);
    assert_eq!(items[0].current_chunk.as_deref(), Some("X"));
    assert_eq!((items[0].processed_chunks, items[0].total_chunks), (1, 1));

    // Re-evaluated on the next cycle, still unresolved
    let again = b.orch.sync().await.unwrap();
    assert_eq!(again.status, SyncStatus::Conflict);
    let on_b = b.orch.get_chunk::<String>("X").await.unwrap().unwrap();
    assert_eq!(on_b.data, "from b");
}

#[tokio::test]
async fn equal_content_fast_forwards_without_conflict() {
    let remote = FaultyTransport::default();
    let cfg = SyncConfig {
        conflict_resolution: ConflictStrategy::Manual,
        ..config()
    };
    let a = device("device-a", cfg.clone(), &remote);
    let b = device("device-b", cfg, &remote);

    a.orch.save_chunk("X", &json!("same"), "text").await.unwrap();
    a.orch.save_chunk("X", &json!("same"), "text").await.unwrap();
    a.orch.sync().await.unwrap();
    b.orch.save_chunk("X", &json!("same"), "text").await.unwrap();

    let result = b.orch.sync().await.unwrap();
    assert_eq!(result.status, SyncStatus::Success);
    assert_eq!(result.downloaded_chunks, 1);
    assert_eq!(fingerprint(&a.store).await, fingerprint(&b.store).await);
}

// --- Failures ---

#[tokio::test]
async fn failed_upload_is_isolated() {
    let remote = FaultyTransport::default();
    let a = device("device-a", config(), &remote);

    for id in ["A", "B", "C"] {
        a.orch.save_chunk(id, &json!(id), "letter").await.unwrap();
    }
    remote.fail_put("B");

    let result = a.orch.sync().await.unwrap();
    assert!(result.success);
    assert_eq!(result.status, SyncStatus::Success);
    assert_eq!(result.uploaded_chunks, 2);
    assert_eq!(result.skipped_chunks, 1);
    assert_eq!(a.orch.state().pending_uploads, 1);
    assert!(!remote.inner.exists("B.json").await.unwrap());

    remote.heal();
    let retry = a.orch.sync().await.unwrap();
    assert_eq!(retry.uploaded_chunks, 1);
    assert_eq!(retry.skipped_chunks, 0);
    assert_eq!(a.orch.state().pending_uploads, 0);
}

#[tokio::test]
async fn transient_upload_failure_is_retried() {
    let remote = FaultyTransport::default();
    let cfg = SyncConfig {
        max_retries: 2,
        ..config()
    };
    let a = device("device-a", cfg, &remote);
    a.orch.save_chunk("A", &json!(1), "n").await.unwrap();

    remote.fail_put("A");
    let healer = remote.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        healer.heal();
    });

    let result = a.orch.sync().await.unwrap();
    assert_eq!(result.uploaded_chunks, 1);
    assert_eq!(result.skipped_chunks, 0);
}

#[tokio::test]
async fn unreachable_remote_is_fatal() {
    let remote = FaultyTransport::default();
    let a = device("device-a", config(), &remote);
    a.orch.save_chunk("A", &json!(1), "n").await.unwrap();
    remote.down.store(true, Ordering::SeqCst);

    let (events, _sub) = record_events(&a.orch);
    let result = a.orch.sync().await.unwrap();

    assert!(!result.success);
    assert_eq!(result.status, SyncStatus::Error);
    assert!(result.error.as_deref().unwrap().contains("connection refused"));
    assert_eq!(result.uploaded_chunks, 0);
    assert_eq!(remote.puts(), 0);

    let state = a.orch.state();
    assert_eq!(state.status, SyncStatus::Idle);
    assert!(state.last_error.is_some());
    assert!(state.last_sync_time.is_none());

    let events = events.lock().unwrap();
    assert!(events.iter().any(|e| matches!(e, SyncEvent::Error { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, SyncEvent::Completed(r) if !r.success)));
}

#[tokio::test]
async fn corrupted_remote_chunk_is_skipped() {
    let remote = FaultyTransport::default();
    let a = device("device-a", config(), &remote);
    let b = device("device-b", config(), &remote);

    a.orch.save_chunk("good", &json!("ok"), "n").await.unwrap();
    a.orch.save_chunk("bad", &json!("ok"), "n").await.unwrap();
    a.orch.sync().await.unwrap();

    // Payload changed without updating the checksum
    let mut doc = ChunkData::from_document(&remote.inner.get("bad.json").await.unwrap()).unwrap();
    doc.data = json!("tampered");
    remote
        .inner
        .put("bad.json", doc.to_document(true).unwrap())
        .await
        .unwrap();
    remote.inner.put("junk.json", b"not a document".to_vec()).await.unwrap();
    remote.inner.put("README.txt", b"ignored".to_vec()).await.unwrap();

    let result = b.orch.sync().await.unwrap();
    assert!(result.success);
    assert_eq!(result.downloaded_chunks, 1);
    assert_eq!(result.skipped_chunks, 2);
    assert!(b.orch.get_chunk::<String>("bad").await.unwrap().is_none());
    assert!(b.store.read("bad").await.is_err());
}

#[tokio::test]
async fn cycle_that_only_skips_is_an_error() {
    let remote = FaultyTransport::default();
    let a = device("device-a", config(), &remote);
    let b = device("device-b", config(), &remote);

    a.orch.save_chunk("bad", &json!("ok"), "n").await.unwrap();
    a.orch.sync().await.unwrap();

    let mut doc = ChunkData::from_document(&remote.inner.get("bad.json").await.unwrap()).unwrap();
    doc.data = json!("tampered");
    remote
        .inner
        .put("bad.json", doc.to_document(false).unwrap())
        .await
        .unwrap();

    let (events, _sub) = record_events(&b.orch);
    let result = b.orch.sync().await.unwrap();
    assert!(!result.success);
    assert_eq!(result.status, SyncStatus::Error);
    assert_eq!(result.skipped_chunks, 1);
    assert_eq!(result.downloaded_chunks, 0);
    assert_eq!(result.error.as_deref(), Some("all 1 chunks skipped"));
    assert!(b.orch.state().last_error.is_some());
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, SyncEvent::Error { error } if error.contains("skipped"))));
}

#[tokio::test]
async fn compressed_documents_round_trip() {
    let remote = FaultyTransport::default();
    let packed = SyncConfig {
        enable_compression: true,
        ..config()
    };
    let plain = SyncConfig {
        enable_compression: false,
        ..config()
    };
    let a = device("device-a", packed, &remote);
    let b = device("device-b", plain, &remote);

    let text = "x".repeat(100_000);
    a.orch.save_chunk("big", &text, "text").await.unwrap();
    a.orch.sync().await.unwrap();

    let object = remote.inner.get("big.json").await.unwrap();
    assert_ne!(object[0], b'{');
    assert!(object.len() < 10_000);

    // A device writing plain documents still reads compressed ones
    assert_eq!(b.orch.sync().await.unwrap().downloaded_chunks, 1);
    let chunk = b.orch.get_chunk::<String>("big").await.unwrap().unwrap();
    assert_eq!(chunk.data, text);

    b.orch.save_chunk("small", &json!({"k": 1}), "n").await.unwrap();
    b.orch.sync().await.unwrap();
    assert_eq!(remote.inner.get("small.json").await.unwrap()[0], b'{');
    assert_eq!(a.orch.sync().await.unwrap().downloaded_chunks, 1);
}

// --- Direction ---

#[tokio::test]
async fn upload_only_never_downloads() {
    let remote = FaultyTransport::default();
    let a = device("device-a", config(), &remote);
    a.orch.save_chunk("theirs", &json!(1), "n").await.unwrap();
    a.orch.sync().await.unwrap();

    let cfg = SyncConfig {
        direction: SyncDirection::UploadOnly,
        ..config()
    };
    let b = device("device-b", cfg, &remote);
    b.orch.save_chunk("mine", &json!(2), "n").await.unwrap();

    let result = b.orch.sync().await.unwrap();
    assert_eq!(result.uploaded_chunks, 1);
    assert_eq!(result.downloaded_chunks, 0);
    assert!(b.store.read("theirs").await.is_err());
}

#[tokio::test]
async fn download_only_never_uploads() {
    let remote = FaultyTransport::default();
    let a = device("device-a", config(), &remote);
    a.orch.save_chunk("theirs", &json!(1), "n").await.unwrap();
    a.orch.sync().await.unwrap();

    let cfg = SyncConfig {
        direction: SyncDirection::DownloadOnly,
        ..config()
    };
    let b = device("device-b", cfg, &remote);
    b.orch.save_chunk("mine", &json!(2), "n").await.unwrap();

    let result = b.orch.sync().await.unwrap();
    assert_eq!(result.uploaded_chunks, 0);
    assert_eq!(result.downloaded_chunks, 1);
    assert!(!remote.inner.exists("mine.json").await.unwrap());
}

// --- Deletion ---

#[tokio::test]
async fn deletions_propagate_as_tombstones() {
    let remote = FaultyTransport::default();
    let a = device("device-a", config(), &remote);
    let b = device("device-b", config(), &remote);

    a.orch.save_chunk("p", &json!({"k": 1}), "n").await.unwrap();
    a.orch.sync().await.unwrap();
    b.orch.sync().await.unwrap();
    assert!(b.orch.get_chunk::<serde_json::Value>("p").await.unwrap().is_some());

    a.orch.delete_chunk("p").await.unwrap();
    let pushed = a.orch.sync().await.unwrap();
    assert_eq!(pushed.deleted_chunks, 1);
    assert_eq!(pushed.uploaded_chunks, 0);

    let pulled = b.orch.sync().await.unwrap();
    assert_eq!(pulled.deleted_chunks, 1);
    assert!(b.orch.get_chunk::<serde_json::Value>("p").await.unwrap().is_none());
    assert!(b.orch.list_chunks().await.unwrap().is_empty());

    assert_eq!(a.orch.sync().await.unwrap().transferred(), 0);
    assert_eq!(b.orch.sync().await.unwrap().transferred(), 0);

    // Recreating continues the version sequence
    let meta = b.orch.save_chunk("p", &json!({"k": 2}), "n").await.unwrap();
    assert_eq!(meta.version, 3);
}

// --- Events and concurrency ---

#[tokio::test]
async fn progress_is_monotonic_and_complete() {
    let remote = FaultyTransport::default();
    let cfg = SyncConfig {
        max_concurrency: 3,
        ..config()
    };
    let a = device("device-a", cfg, &remote);
    for i in 0..10 {
        a.orch.save_chunk(&format!("c{}", i), &json!(i), "n").await.unwrap();
    }

    let (events, _sub) = record_events(&a.orch);
    a.orch.sync().await.unwrap();

    let events = events.lock().unwrap();
    let progress: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            SyncEvent::Progress(p) => Some(p.clone()),
            _ => None,
        })
        .collect();

    assert_eq!(progress.first().unwrap().phase, SyncPhase::Connecting);
    assert!(progress
        .windows(2)
        .all(|w| w[0].processed_chunks <= w[1].processed_chunks));
    let last = progress.last().unwrap();
    assert_eq!(last.phase, SyncPhase::Completed);
    assert_eq!(last.processed_chunks, 10);
    assert_eq!(last.total_chunks, 10);
    assert_eq!(last.total_progress, 100.0);

    let statuses: Vec<SyncStatus> = events
        .iter()
        .filter_map(|e| match e {
            SyncEvent::StatusChanged { status } => Some(*status),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![SyncStatus::Syncing, SyncStatus::Success, SyncStatus::Idle]
    );
    let tail: Vec<_> = events.iter().rev().take(2).collect();
    assert!(matches!(tail[0], SyncEvent::StatusChanged { status: SyncStatus::Idle }));
    assert!(matches!(tail[1], SyncEvent::Completed(r) if r.uploaded_chunks == 10));
}

#[tokio::test]
async fn panicking_listener_does_not_break_cycle() {
    let remote = FaultyTransport::default();
    let a = device("device-a", config(), &remote);
    a.orch.save_chunk("A", &json!(1), "n").await.unwrap();

    let _bad = a.orch.add_event_listener(|_| panic!("listener bug"));
    let (events, _sub) = record_events(&a.orch);

    let result = a.orch.sync().await.unwrap();
    assert!(result.success);
    assert_eq!(result.uploaded_chunks, 1);
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, SyncEvent::Completed(_))));
}

#[tokio::test]
async fn dropped_subscription_stops_delivery() {
    let remote = FaultyTransport::default();
    let a = device("device-a", config(), &remote);

    let (events, sub) = record_events(&a.orch);
    a.orch.sync().await.unwrap();
    let seen = events.lock().unwrap().len();
    assert!(seen > 0);

    drop(sub);
    a.orch.sync().await.unwrap();
    assert_eq!(events.lock().unwrap().len(), seen);
}

#[tokio::test]
async fn concurrent_sync_is_rejected() {
    let remote = FaultyTransport::default();
    *remote.connect_delay.lock().unwrap() = Some(Duration::from_millis(100));
    let a = device("device-a", config(), &remote);

    let (first, second) = tokio::join!(a.orch.sync(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        a.orch.sync().await
    });

    assert!(first.unwrap().success);
    assert!(matches!(second, Err(Error::SyncInProgress)));
    assert_eq!(a.orch.state().status, SyncStatus::Idle);
}

#[tokio::test]
async fn destroy_aborts_between_items() {
    let remote = FaultyTransport::default();
    *remote.put_delay.lock().unwrap() = Some(Duration::from_millis(10));
    let cfg = SyncConfig {
        max_concurrency: 1,
        ..config()
    };
    let a = Arc::new(device("device-a", cfg, &remote));
    for i in 0..5 {
        a.orch.save_chunk(&format!("c{}", i), &json!(i), "n").await.unwrap();
    }

    let weak = Arc::downgrade(&a);
    let _sub = a.orch.add_event_listener(move |event| {
        if let SyncEvent::Progress(p) = event {
            if p.processed_chunks == 1 {
                if let Some(device) = weak.upgrade() {
                    device.orch.destroy();
                }
            }
        }
    });

    let result = a.orch.sync().await.unwrap();
    assert!(!result.success);
    assert_eq!(result.status, SyncStatus::Error);
    assert_eq!(result.error.as_deref(), Some("aborted"));
    assert!(result.uploaded_chunks >= 1 && result.uploaded_chunks < 5);
    assert_eq!(remote.puts(), result.uploaded_chunks);
    assert!(matches!(a.orch.sync().await, Err(Error::InvalidState(_))));
}

// --- Auto-sync ---

#[tokio::test]
async fn auto_sync_runs_until_destroyed() {
    let remote = FaultyTransport::default();
    let cfg = SyncConfig {
        auto_sync: true,
        auto_sync_interval_secs: 1,
        ..config()
    };
    let a = device("device-a", cfg, &remote);
    a.orch.save_chunk("A", &json!(1), "n").await.unwrap();

    let (events, _sub) = record_events(&a.orch);
    a.orch.start().unwrap();
    assert!(a.orch.is_auto_syncing());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let completed = |events: &Arc<Mutex<Vec<SyncEvent>>>| {
        events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, SyncEvent::Completed(_)))
            .count()
    };
    assert_eq!(completed(&events), 1);
    assert!(remote.inner.exists("A.json").await.unwrap());

    a.orch.destroy();
    assert!(!a.orch.is_auto_syncing());
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(completed(&events), 1);
}

#[tokio::test]
async fn disabling_auto_sync_stops_timer() {
    let remote = FaultyTransport::default();
    let cfg = SyncConfig {
        auto_sync: true,
        auto_sync_interval_secs: 1,
        ..config()
    };
    let a = device("device-a", cfg, &remote);
    a.orch.start().unwrap();
    assert!(a.orch.is_auto_syncing());

    a.orch.set_auto_sync(false).unwrap();
    assert!(!a.orch.is_auto_syncing());

    let (events, _sub) = record_events(&a.orch);
    tokio::time::sleep(Duration::from_millis(1300)).await;
    assert!(events.lock().unwrap().is_empty());
}

// --- Persistence ---

#[tokio::test]
async fn state_file_survives_restart() {
    let temp = TempDir::new().unwrap();
    let state_path = temp.path().join("state.json");
    let remote = FaultyTransport::default();

    let a = device("device-a", config(), &remote);
    let orch = a.orch.with_state_file(&state_path).await.unwrap();
    orch.save_chunk("A", &json!(1), "n").await.unwrap();
    orch.sync().await.unwrap();
    drop(orch);

    let restored = SyncState::load(&state_path).await.unwrap();
    assert_eq!(restored.status, SyncStatus::Success);
    assert!(restored.last_sync_time.is_some());

    let b = device("device-a", config(), &remote);
    let orch = b.orch.with_state_file(&state_path).await.unwrap();
    assert_eq!(
        orch.state(),
        SyncState {
            status: SyncStatus::Idle,
            ..restored
        }
    );
}

#[tokio::test]
async fn file_store_over_local_transport() {
    let temp = TempDir::new().unwrap();
    let share = temp.path().join("share");
    let transport: Arc<dyn RemoteTransport> = Arc::new(LocalTransport::new(&share, "/chunksync"));

    let open = |dir: &str| {
        let dir = temp.path().join(dir);
        async move { Arc::new(FileChunkStore::open(dir).await.unwrap()) }
    };
    let store_a = open("a").await;
    let store_b = open("b").await;

    let a = SyncOrchestrator::new(
        config(),
        store_a.clone(),
        transport.clone(),
        DeviceIdentity::fixed(DeviceId::new("a").unwrap()),
    )
    .unwrap();
    let b = SyncOrchestrator::new(
        config(),
        store_b.clone(),
        transport,
        DeviceIdentity::fixed(DeviceId::new("b").unwrap()),
    )
    .unwrap();

    a.save_chunk("notes/today", &json!({"text": "hello"}), "note").await.unwrap();
    assert_eq!(a.sync().await.unwrap().uploaded_chunks, 1);
    assert!(share.join("chunksync").join("notes%2Ftoday.json").is_file());

    assert_eq!(b.sync().await.unwrap().downloaded_chunks, 1);
    let chunk = b.get_chunk::<serde_json::Value>("notes/today").await.unwrap().unwrap();
    assert_eq!(chunk.data["text"], "hello");
    assert_eq!(fingerprint(store_a.as_ref()).await, fingerprint(store_b.as_ref()).await);
}
