//! Event delivery to sync listeners.
//!
//! Listeners are plain closures called synchronously, in registration order,
//! at the point each event is emitted. Registration hands back a
//! [`Subscription`]; dropping it unregisters the listener.

use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::warn;

use crate::state::{SyncProgress, SyncResult, SyncStatus};

/// Event emitted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    StatusChanged { status: SyncStatus },
    Progress(SyncProgress),
    Error { error: String },
    Conflict { id: String },
    Completed(SyncResult),
}

impl SyncEvent {
    /// Short name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncEvent::StatusChanged { .. } => "status_changed",
            SyncEvent::Progress(_) => "progress",
            SyncEvent::Error { .. } => "error",
            SyncEvent::Conflict { .. } => "conflict",
            SyncEvent::Completed(_) => "completed",
        }
    }
}

type Listener = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fan-out of sync events to registered listeners.
#[derive(Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
    /// Serializes delivery across concurrent emitters.
    delivery: Mutex<()>,
}

impl EventBus {
    /// Create a bus with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    ///
    /// The listener stays registered for as long as the returned
    /// subscription is alive.
    #[must_use = "dropping the subscription unregisters the listener"]
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, Arc::new(listener)));

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver an event to every listener.
    ///
    /// A panicking listener is logged and skipped; the rest still receive
    /// the event.
    pub fn emit(&self, event: &SyncEvent) {
        let _delivery = lock(&self.delivery);
        // Snapshot so listeners may subscribe or unsubscribe while being called
        let listeners: Vec<(u64, Listener)> = lock(&self.registry).listeners.clone();

        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                warn!(
                    "Event listener {} panicked while handling {} event",
                    id,
                    event.kind()
                );
            }
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        lock(&self.registry).listeners.len()
    }

    /// Unregister every listener.
    pub fn clear(&self) {
        lock(&self.registry).listeners.clear();
    }
}

/// Registration handle returned by [`EventBus::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Unregister the listener now.
    pub fn unsubscribe(self) {}

    /// Whether the listener is still registered.
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .map(|r| lock(&r).listeners.iter().any(|(id, _)| *id == self.id))
            .unwrap_or(false)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).listeners.retain(|(id, _)| *id != self.id);
        }
    }
}
