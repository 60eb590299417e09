//! # Report Feed
//!
//! Keeps the ordered view of all reports for rendering. Each snapshot from the
//! store replaces the view wholesale; the result is published through a
//! `watch` channel so the UI-owning task reads it on its own schedule.
//!
//! Every subscription lifetime gets a generation number. A delivery is applied
//! only while its generation is current, and the check and the mutation happen
//! under the same lock that `stop()` takes, so nothing lands after teardown.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lf_core::{
    sort_reports, ReportRecord, ReportStore, SnapshotEvent, SnapshotListener, SubscriptionError,
    SubscriptionHandle,
};
use tokio::sync::watch;

/// What the report list should show.
#[derive(Debug, Clone)]
pub enum DisplayState {
    Loading,
    Empty,
    Loaded(Vec<ReportRecord>),
    Failed(SubscriptionError),
}

impl DisplayState {
    pub fn records(&self) -> &[ReportRecord] {
        match self {
            DisplayState::Loaded(records) => records,
            _ => &[],
        }
    }

    pub fn count(&self) -> usize {
        self.records().len()
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, DisplayState::Loading)
    }

    /// Whether both states would render identically.
    pub fn same_view(&self, other: &DisplayState) -> bool {
        match (self, other) {
            (DisplayState::Loading, DisplayState::Loading)
            | (DisplayState::Empty, DisplayState::Empty) => true,
            (DisplayState::Failed(a), DisplayState::Failed(b)) => a == b,
            (DisplayState::Loaded(a), DisplayState::Loaded(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_content(y))
            }
            _ => false,
        }
    }

    fn from_snapshot(mut records: Vec<ReportRecord>) -> Self {
        if records.is_empty() {
            DisplayState::Empty
        } else {
            sort_reports(&mut records);
            DisplayState::Loaded(records)
        }
    }
}

#[derive(Debug, Default)]
struct Fence {
    generation: u64,
    live: bool,
}

struct FeedShared {
    fence: Mutex<Fence>,
    state_tx: watch::Sender<DisplayState>,
}

impl FeedShared {
    fn fence(&self) -> MutexGuard<'_, Fence> {
        self.fence.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, generation: u64, event: SnapshotEvent) {
        let mut fence = self.fence();
        if !fence.live || fence.generation != generation {
            tracing::trace!(generation, "dropping snapshot from a stale subscription");
            return;
        }

        let next = match event {
            Ok(records) => DisplayState::from_snapshot(records),
            Err(err) => {
                tracing::warn!(error = %err, "report feed failed");
                fence.live = false;
                DisplayState::Failed(err)
            }
        };

        let changed = self.state_tx.send_if_modified(|current| {
            if current.same_view(&next) {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            tracing::debug!(records = self.state_tx.borrow().count(), "report feed updated");
        }
    }
}

/// Live, ordered list of all reports.
pub struct ReportFeed {
    store: Arc<dyn ReportStore>,
    shared: Arc<FeedShared>,
    handle: Mutex<Option<SubscriptionHandle>>,
}

impl ReportFeed {
    pub fn new(store: Arc<dyn ReportStore>) -> Self {
        let (state_tx, _) = watch::channel(DisplayState::Loading);
        Self {
            store,
            shared: Arc::new(FeedShared {
                fence: Mutex::new(Fence::default()),
                state_tx,
            }),
            handle: Mutex::new(None),
        }
    }

    /// Opens the subscription. Calling it on a live feed does nothing.
    pub async fn start(&self) -> Result<(), SubscriptionError> {
        let generation = {
            let mut fence = self.shared.fence();
            if fence.live {
                return Ok(());
            }
            fence.generation += 1;
            fence.live = true;
            self.shared.state_tx.send_replace(DisplayState::Loading);
            fence.generation
        };
        // A previous lifetime that ended in failure may still hold a handle.
        self.take_handle();

        let shared = Arc::downgrade(&self.shared);
        let listener: SnapshotListener = Arc::new(move |event: SnapshotEvent| {
            if let Some(shared) = shared.upgrade() {
                shared.apply(generation, event);
            }
        });

        match self.store.subscribe(listener).await {
            Ok(handle) => {
                let current = {
                    let fence = self.shared.fence();
                    fence.live && fence.generation == generation
                };
                if current {
                    *self.lock_handle() = Some(handle);
                } else {
                    handle.cancel();
                }
                Ok(())
            }
            Err(err) => {
                self.shared.apply(generation, Err(err.clone()));
                Err(err)
            }
        }
    }

    /// Cancels the subscription. Safe to call at any time, any number of times.
    pub fn stop(&self) {
        {
            let mut fence = self.shared.fence();
            if fence.live {
                fence.generation += 1;
                fence.live = false;
            }
        }
        if let Some(handle) = self.take_handle() {
            handle.cancel();
            tracing::debug!("report feed stopped");
        }
    }

    pub fn is_live(&self) -> bool {
        self.shared.fence().live
    }

    /// Receiver for the UI-owning task.
    pub fn watch(&self) -> watch::Receiver<DisplayState> {
        self.shared.state_tx.subscribe()
    }

    pub fn display_state(&self) -> DisplayState {
        self.shared.state_tx.borrow().clone()
    }

    pub fn records(&self) -> Vec<ReportRecord> {
        self.shared.state_tx.borrow().records().to_vec()
    }

    fn take_handle(&self) -> Option<SubscriptionHandle> {
        self.lock_handle().take()
    }

    fn lock_handle(&self) -> MutexGuard<'_, Option<SubscriptionHandle>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ReportFeed {
    fn drop(&mut self) {
        self.stop();
    }
}
