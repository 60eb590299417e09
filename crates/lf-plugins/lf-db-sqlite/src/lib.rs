//! # lf-db-sqlite Implementation
//!
//! SQLite-backed document collection implementing `ReportStore`.
//! Each report is stored as its JSON document next to the columns needed for
//! keying and ordering. Several collections, and several stores, may share
//! one database file. While anyone is subscribed, the collection is polled
//! for changes made through other connections.

use std::str::FromStr;
use std::sync::{Arc, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use lf_core::{
    ListenerRegistry, ReportRecord, ReportStore, SnapshotListener, StoreError, StoreResult,
    SubscriptionError, SubscriptionHandle,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS report_documents (
    collection              TEXT    NOT NULL,
    id                      TEXT    NOT NULL,
    created_at_epoch_millis INTEGER NOT NULL,
    body                    TEXT    NOT NULL CHECK (
        json_valid(body)
        AND length(trim(json_extract(body, '$.subjectName'))) > 0
        AND length(trim(json_extract(body, '$.location'))) > 0
        AND length(trim(json_extract(body, '$.contact'))) > 0
    ),
    PRIMARY KEY (collection, id)
)
"#;

/// How often a subscribed store checks for writes from other connections.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Cheap fingerprint of a collection; any append or rewrite changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Watermark {
    rows: i64,
    newest: i64,
    bytes: i64,
}

struct Shared {
    pool: SqlitePool,
    collection: String,
    /// Serializes "write + broadcast", "register + initial snapshot" and
    /// "poll + broadcast" so listeners never see an older snapshot after a
    /// newer one. Holds the watermark of the last published snapshot.
    gate: Mutex<Option<Watermark>>,
    listeners: ListenerRegistry,
}

pub struct SqliteReportStore {
    shared: Arc<Shared>,
    poll_interval: Duration,
    watcher: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SqliteReportStore {
    /// Opens (creating if needed) the database at `database_url`.
    pub async fn connect(database_url: &str, collection: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .create_if_missing(true);

        // Every connection to an in-memory database sees its own database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(unavailable)?;

        Self::from_pool(pool, collection).await
    }

    pub async fn from_pool(pool: SqlitePool, collection: &str) -> StoreResult<Self> {
        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(unavailable)?;
        tracing::info!(collection, "sqlite report store ready");

        Ok(Self {
            shared: Arc::new(Shared {
                pool,
                collection: collection.to_string(),
                gate: Mutex::new(None),
                listeners: ListenerRegistry::new(),
            }),
            poll_interval: DEFAULT_POLL_INTERVAL,
            watcher: std::sync::Mutex::new(None),
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn collection(&self) -> &str {
        &self.shared.collection
    }

    /// Reads the whole collection, newest first.
    pub async fn load_snapshot(&self) -> Result<Vec<ReportRecord>, sqlx::Error> {
        self.shared.load_snapshot().await
    }

    /// Starts the change watcher on first subscription.
    fn ensure_watcher(&self) {
        let mut watcher = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        if watcher.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let shared = Arc::downgrade(&self.shared);
        *watcher = Some(tokio::spawn(watch_collection(shared, self.poll_interval)));
    }
}

impl Drop for SqliteReportStore {
    fn drop(&mut self) {
        let watcher = self.watcher.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = watcher.take() {
            task.abort();
        }
    }
}

impl Shared {
    async fn load_snapshot(&self) -> Result<Vec<ReportRecord>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, body FROM report_documents WHERE collection = ? \
             ORDER BY created_at_epoch_millis DESC, id ASC",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            let body: String = row.try_get("body")?;
            match serde_json::from_str::<ReportRecord>(&body) {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!(document = %id, error = %err, "skipping undecodable report document");
                }
            }
        }
        Ok(records)
    }

    async fn watermark(&self) -> Result<Watermark, sqlx::Error> {
        let (rows, newest, bytes): (i64, i64, i64) = sqlx::query_as(
            "SELECT count(*), COALESCE(max(created_at_epoch_millis), 0), \
             COALESCE(sum(length(body)), 0) \
             FROM report_documents WHERE collection = ?",
        )
        .bind(&self.collection)
        .fetch_one(&self.pool)
        .await?;
        Ok(Watermark { rows, newest, bytes })
    }

    /// Watermark first, so a write landing in between is picked up by the
    /// next poll rather than lost.
    async fn read_current(&self) -> Result<(Watermark, Vec<ReportRecord>), sqlx::Error> {
        let mark = self.watermark().await?;
        let snapshot = self.load_snapshot().await?;
        Ok((mark, snapshot))
    }

    /// Pushes the current snapshot, or a feed error if it cannot be read.
    /// The caller holds the gate.
    async fn publish(&self, last_seen: &mut Option<Watermark>) {
        match self.read_current().await {
            Ok((mark, snapshot)) => {
                *last_seen = Some(mark);
                self.listeners.broadcast(&snapshot);
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to read reports");
                self.listeners
                    .fail_all(SubscriptionError::Unavailable(err.to_string()));
            }
        }
    }

    /// Publishes if the collection changed since the last snapshot.
    async fn poll(&self) {
        let mut last_seen = self.gate.lock().await;
        match self.watermark().await {
            Ok(mark) if Some(mark) == *last_seen => {}
            Ok(_) => {
                tracing::debug!(collection = %self.collection, "collection changed elsewhere");
                self.publish(&mut last_seen).await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "report collection poll failed");
            }
        }
    }
}

/// Runs until the store is dropped. Polls only while someone is listening.
async fn watch_collection(shared: Weak<Shared>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        if !shared.listeners.is_empty() {
            shared.poll().await;
        }
    }
}

fn unavailable(err: sqlx::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

/// Constraint and encoding failures are the backend refusing the document;
/// anything else means it could not be reached.
fn write_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db) => StoreError::Rejected(db.message().to_string()),
        sqlx::Error::Encode(e) => StoreError::Rejected(e.to_string()),
        other => unavailable(other),
    }
}

#[async_trait]
impl ReportStore for SqliteReportStore {
    /// Upserts the document keyed by `(collection, id)`.
    async fn submit(&self, record: ReportRecord) -> StoreResult<()> {
        let body =
            serde_json::to_string(&record).map_err(|e| StoreError::Rejected(e.to_string()))?;
        let shared = &self.shared;

        let mut last_seen = shared.gate.lock().await;
        sqlx::query(
            "INSERT INTO report_documents (collection, id, created_at_epoch_millis, body) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT (collection, id) DO UPDATE SET \
             created_at_epoch_millis = excluded.created_at_epoch_millis, body = excluded.body",
        )
        .bind(&shared.collection)
        .bind(record.id.to_string())
        .bind(record.created_at_epoch_millis)
        .bind(body)
        .execute(&shared.pool)
        .await
        .map_err(|err| {
            let err = write_error(err);
            tracing::warn!(report_id = %record.id, error = %err, "report write failed");
            err
        })?;

        tracing::debug!(report_id = %record.id, collection = %shared.collection, "report stored");
        shared.publish(&mut last_seen).await;
        Ok(())
    }

    async fn subscribe(
        &self,
        listener: SnapshotListener,
    ) -> Result<SubscriptionHandle, SubscriptionError> {
        let shared = &self.shared;
        let handle = {
            let mut last_seen = shared.gate.lock().await;
            let (mark, snapshot) = shared
                .read_current()
                .await
                .map_err(|e| SubscriptionError::Unavailable(e.to_string()))?;
            *last_seen = Some(mark);
            let (id, handle) = shared.listeners.register(listener);
            shared.listeners.deliver_to(id, Ok(snapshot));
            handle
        };
        self.ensure_watcher();
        Ok(handle)
    }
}
