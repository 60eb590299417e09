//! # Listener Registry
//!
//! Shared fan-out used by store plugins to push snapshots to their
//! subscribers. Listeners are invoked outside the registry lock so a callback
//! may cancel its own subscription.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::error::SubscriptionError;
use crate::models::ReportRecord;
use crate::traits::{SnapshotEvent, SnapshotListener, SubscriptionHandle};

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: BTreeMap<u64, SnapshotListener>,
}

/// Set of live snapshot listeners for one collection.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<Mutex<Registry>>,
}

/// Identifies one registration inside a [`ListenerRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `listener` and returns a handle that removes it again.
    pub fn register(&self, listener: SnapshotListener) -> (ListenerId, SubscriptionHandle) {
        let id = {
            let mut registry = self.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.listeners.insert(id, listener);
            id
        };

        let weak: Weak<Mutex<Registry>> = Arc::downgrade(&self.inner);
        let handle = SubscriptionHandle::new(move || {
            if let Some(inner) = weak.upgrade() {
                let removed = inner
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .listeners
                    .remove(&id);
                if removed.is_some() {
                    tracing::debug!(listener = id, "snapshot listener detached");
                }
            }
        });

        (ListenerId(id), handle)
    }

    /// Delivers an event to a single registration, if it is still attached.
    pub fn deliver_to(&self, id: ListenerId, event: SnapshotEvent) {
        let listener = self.lock().listeners.get(&id.0).cloned();
        if let Some(listener) = listener {
            listener(event);
        }
    }

    /// Pushes the same snapshot to every attached listener.
    pub fn broadcast(&self, snapshot: &[ReportRecord]) {
        let listeners = self.attached();
        tracing::debug!(
            listeners = listeners.len(),
            records = snapshot.len(),
            "broadcasting report snapshot"
        );
        for listener in listeners {
            listener(Ok(snapshot.to_vec()));
        }
    }

    /// Reports `error` to every listener and detaches them all.
    pub fn fail_all(&self, error: SubscriptionError) {
        let listeners: Vec<SnapshotListener> = {
            let mut registry = self.lock();
            std::mem::take(&mut registry.listeners).into_values().collect()
        };
        for listener in listeners {
            listener(Err(error.clone()));
        }
    }

    pub fn len(&self) -> usize {
        self.lock().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn attached(&self) -> Vec<SnapshotListener> {
        self.lock().listeners.values().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
