//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the services and the
//! binary.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{StoreResult, SubscriptionError};
use crate::models::ReportRecord;

/// What a subscriber receives: the full ordered collection, or the reason the
/// feed broke.
pub type SnapshotEvent = Result<Vec<ReportRecord>, SubscriptionError>;

/// Callback invoked on every change of the collection. May run on any task.
pub type SnapshotListener = Arc<dyn Fn(SnapshotEvent) + Send + Sync>;

/// Persistence and live-query contract for the report collection.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Upserts `record` under its id. Retrying with the same record is a no-op.
    async fn submit(&self, record: ReportRecord) -> StoreResult<()>;

    /// Registers `listener` and immediately delivers the current snapshot.
    /// Every later change delivers the complete, newest-first collection.
    async fn subscribe(
        &self,
        listener: SnapshotListener,
    ) -> Result<SubscriptionHandle, SubscriptionError>;
}

/// Storage for photos attached to reports.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Saves raw bytes and returns a media id.
    async fn save_upload(&self, data: Bytes, content_type: &str) -> StoreResult<String>;
    /// Public URL of a saved upload.
    fn url_for(&self, media_id: &str) -> String;
}

/// Source of creation timestamps.
#[cfg_attr(feature = "testing", mockall::automock)]
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

type CancelFn = Box<dyn FnOnce() + Send>;

/// Detaches a listener from its store. Cancelling twice is harmless, and
/// dropping the handle cancels as well.
pub struct SubscriptionHandle {
    cancel: Mutex<Option<CancelFn>>,
}

impl SubscriptionHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// A handle with nothing to detach.
    pub fn detached() -> Self {
        Self {
            cancel: Mutex::new(None),
        }
    }

    pub fn cancel(&self) {
        let cancel = self
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
