//! Event Bus
//!
//! Process-local publish/subscribe registry keyed by [`Topic`].
//!
//! ## Rules
//! - **Synchronous delivery**: `publish()` invokes every listener registered at
//!   the time of the call, in registration order, before returning.
//! - **Isolation**: a panicking listener is caught and logged; delivery
//!   continues with the next listener.
//! - **Handles, not identity**: `subscribe()` returns a [`SubscriptionHandle`];
//!   `unsubscribe()` with an unknown or already removed handle is a no-op.
//! - **Immediate removal**: a listener removed while a publish is iterating is
//!   skipped if its turn has not come yet.
//! - No lock is held while listeners run, so listeners may subscribe,
//!   unsubscribe or publish re-entrantly.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::event::{BusEvent, Topic};

/// Callback invoked for each event on its topic
pub type Listener = Arc<dyn Fn(&BusEvent) + Send + Sync>;

/// Receipt for a registered listener
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    topic: Topic,
}

impl SubscriptionHandle {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }
}

struct ListenerEntry {
    id: u64,
    active: AtomicBool,
    callback: Listener,
}

/// Topic-keyed listener registry
pub struct EventBus {
    /// Topic → listeners in registration order
    listeners: RwLock<HashMap<Topic, Vec<Arc<ListenerEntry>>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener for a topic
    pub fn subscribe<F>(&self, topic: impl Into<Topic>, listener: F) -> SubscriptionHandle
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let topic = topic.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(ListenerEntry {
            id,
            active: AtomicBool::new(true),
            callback: Arc::new(listener),
        });

        self.write()
            .entry(topic.clone())
            .or_default()
            .push(entry);

        tracing::debug!(topic = %topic, listener_id = id, "Listener subscribed");
        SubscriptionHandle { id, topic }
    }

    /// Remove a listener
    ///
    /// Returns `true` if the handle was registered.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut listeners = self.write();
        let Some(entries) = listeners.get_mut(&handle.topic) else {
            return false;
        };

        let Some(pos) = entries.iter().position(|e| e.id == handle.id) else {
            return false;
        };

        let entry = entries.remove(pos);
        entry.active.store(false, Ordering::SeqCst);

        // Clean up empty topic entries
        if entries.is_empty() {
            listeners.remove(&handle.topic);
        }

        tracing::debug!(topic = %handle.topic, listener_id = handle.id, "Listener unsubscribed");
        true
    }

    /// Deliver an event to every current listener of its topic
    ///
    /// Returns the number of listeners that completed without panicking.
    pub fn publish(&self, event: &BusEvent) -> usize {
        let topic = event.topic();

        // Snapshot so listeners can mutate the registry while we iterate
        let snapshot: Vec<Arc<ListenerEntry>> = match self.read().get(&topic) {
            Some(entries) => entries.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        for entry in snapshot {
            if !entry.active.load(Ordering::SeqCst) {
                continue;
            }

            match catch_unwind(AssertUnwindSafe(|| (entry.callback)(event))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!(
                        topic = %topic,
                        listener_id = entry.id,
                        reason = %reason,
                        "Listener failed"
                    );
                }
            }
        }

        if delivered > 0 {
            tracing::trace!(topic = %topic, listeners = delivered, "Published event");
        }
        delivered
    }

    /// Number of listeners on a topic
    pub fn listener_count(&self, topic: &Topic) -> usize {
        self.read().get(topic).map(|e| e.len()).unwrap_or(0)
    }

    /// Drop every listener
    pub fn clear(&self) {
        let mut listeners = self.write();
        for entry in listeners.values().flatten() {
            entry.active.store(false, Ordering::SeqCst);
        }
        listeners.clear();
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Topic, Vec<Arc<ListenerEntry>>>> {
        self.listeners.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Topic, Vec<Arc<ListenerEntry>>>> {
        self.listeners.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
