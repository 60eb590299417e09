//! # lf-store-memory
//!
//! In-process implementation of `ReportStore`.
//! Keeps one JSON document per report, keyed by id, exactly as the shared
//! collection does, and pushes a full snapshot to every listener after each
//! write. Used for local runs and as the reference backend in tests.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use lf_core::{
    sort_reports, ListenerRegistry, ReportRecord, ReportStore, SnapshotListener, StoreError,
    StoreResult, SubscriptionError, SubscriptionHandle,
};
use serde_json::Value;
use uuid::Uuid;

#[derive(Default)]
struct Collection {
    documents: BTreeMap<Uuid, Value>,
    offline: bool,
}

pub struct InMemoryReportStore {
    collection: Mutex<Collection>,
    listeners: ListenerRegistry,
}

impl Default for InMemoryReportStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self {
            collection: Mutex::new(Collection::default()),
            listeners: ListenerRegistry::new(),
        }
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.lock().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Simulates losing (or regaining) the connection to the backend.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Writes a raw document, bypassing record validation. Broadcasts like a
    /// remote writer would.
    pub fn put_document(&self, id: Uuid, document: Value) {
        let mut collection = self.lock();
        collection.documents.insert(id, document);
        let snapshot = snapshot_of(&collection);
        self.listeners.broadcast(&snapshot);
    }

    /// Removes a document, as a moderator acting on the backend would.
    pub fn remove_document(&self, id: Uuid) -> bool {
        let mut collection = self.lock();
        let removed = collection.documents.remove(&id).is_some();
        if removed {
            let snapshot = snapshot_of(&collection);
            self.listeners.broadcast(&snapshot);
        }
        removed
    }

    /// Current ordered contents.
    pub fn snapshot(&self) -> Vec<ReportRecord> {
        snapshot_of(&self.lock())
    }

    /// Ends every live subscription with [`SubscriptionError::Closed`].
    pub fn close(&self) {
        self.listeners.fail_all(SubscriptionError::Closed);
    }

    fn lock(&self) -> MutexGuard<'_, Collection> {
        self.collection.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn snapshot_of(collection: &Collection) -> Vec<ReportRecord> {
    let mut records: Vec<ReportRecord> = collection
        .documents
        .iter()
        .filter_map(|(id, doc)| match serde_json::from_value(doc.clone()) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!(document = %id, error = %err, "skipping undecodable report document");
                None
            }
        })
        .collect();
    sort_reports(&mut records);
    records
}

/// Rules the collection enforces on incoming documents.
fn check_document(record: &ReportRecord) -> StoreResult<()> {
    let blank = [
        ("subjectName", &record.subject_name),
        ("location", &record.location),
        ("contact", &record.contact),
    ]
    .into_iter()
    .find(|(_, value)| value.trim().is_empty());

    match blank {
        Some((field, _)) => Err(StoreError::Rejected(format!("{field} must not be blank"))),
        None => Ok(()),
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn submit(&self, record: ReportRecord) -> StoreResult<()> {
        check_document(&record)?;
        let document =
            serde_json::to_value(&record).map_err(|e| StoreError::Rejected(e.to_string()))?;

        let mut collection = self.lock();
        if collection.offline {
            return Err(StoreError::Unavailable("backend unreachable".into()));
        }
        collection.documents.insert(record.id, document);
        tracing::debug!(report_id = %record.id, total = collection.documents.len(), "report stored");

        let snapshot = snapshot_of(&collection);
        self.listeners.broadcast(&snapshot);
        Ok(())
    }

    async fn subscribe(
        &self,
        listener: SnapshotListener,
    ) -> Result<SubscriptionHandle, SubscriptionError> {
        let collection = self.lock();
        if collection.offline {
            return Err(SubscriptionError::Unavailable("backend unreachable".into()));
        }
        let (id, handle) = self.listeners.register(listener);
        let snapshot = snapshot_of(&collection);
        self.listeners.deliver_to(id, Ok(snapshot));
        Ok(handle)
    }
}
