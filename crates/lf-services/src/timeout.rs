//! Network timeout at the store boundary.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lf_core::{
    ReportRecord, ReportStore, SnapshotListener, StoreError, StoreResult, SubscriptionError,
    SubscriptionHandle,
};

/// Wraps a store so a backend that never answers surfaces as `Unavailable`.
pub struct TimeoutStore {
    inner: Arc<dyn ReportStore>,
    timeout: Duration,
}

impl TimeoutStore {
    pub fn new(inner: Arc<dyn ReportStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl ReportStore for TimeoutStore {
    async fn submit(&self, record: ReportRecord) -> StoreResult<()> {
        let id = record.id;
        match tokio::time::timeout(self.timeout, self.inner.submit(record)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(report_id = %id, timeout = ?self.timeout, "report write timed out");
                Err(StoreError::Unavailable(format!(
                    "no response within {} ms",
                    self.timeout.as_millis()
                )))
            }
        }
    }

    async fn subscribe(
        &self,
        listener: SnapshotListener,
    ) -> Result<SubscriptionHandle, SubscriptionError> {
        tokio::time::timeout(self.timeout, self.inner.subscribe(listener))
            .await
            .unwrap_or_else(|_| {
                Err(SubscriptionError::Unavailable(format!(
                    "no response within {} ms",
                    self.timeout.as_millis()
                )))
            })
    }
}
