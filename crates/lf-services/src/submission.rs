//! # Report Submission
//!
//! Turns raw form input into a validated [`ReportRecord`] and drives it into
//! the store. The controller remembers the form so a failed write can be
//! retried without retyping, and it resubmits the very same record (same id)
//! so the store's upsert keeps the retry from creating a duplicate.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use lf_core::{
    Clock, MediaStore, ReportDraft, ReportField, ReportRecord, ReportStore, ReportType,
    StoreError, SystemClock, ValidationError,
};
use tokio::sync::watch;

/// Default cap for attached photos (10 MiB).
pub const DEFAULT_MAX_PHOTO_BYTES: usize = 10 * 1024 * 1024;

/// Photo picked by the user, not yet uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoUpload {
    pub data: Bytes,
    pub content_type: String,
}

/// Field values exactly as the form holds them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawReportFields {
    pub report_type: ReportType,
    pub subject_name: String,
    pub location: String,
    pub contact: String,
    pub description: String,
    pub photo: Option<PhotoUpload>,
}

impl RawReportFields {
    /// Empty text fields, keeping the selected report type.
    pub fn cleared(&self) -> Self {
        Self {
            report_type: self.report_type,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionPhase {
    Idle,
    Validating,
    Submitting,
    Success,
    Failed,
}

impl SubmissionPhase {
    pub fn is_busy(&self) -> bool {
        matches!(self, SubmissionPhase::Validating | SubmissionPhase::Submitting)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    Accepted(ReportRecord),
    ValidationFailed(ValidationError),
    StoreFailed(StoreError),
    /// A submission was already in flight; nothing happened.
    AlreadySubmitting,
}

impl SubmissionOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmissionOutcome::Accepted(_))
    }
}

/// Checks the required fields and the optional photo.
///
/// Text is trimmed; `description` may be empty.
pub fn validate(
    raw: &RawReportFields,
    photos_enabled: bool,
    max_photo_bytes: usize,
) -> Result<ReportDraft, ValidationError> {
    let subject_name = raw.subject_name.trim();
    let location = raw.location.trim();
    let contact = raw.contact.trim();

    let mut missing = Vec::new();
    if subject_name.is_empty() {
        missing.push(ReportField::SubjectName);
    }
    if location.is_empty() {
        missing.push(ReportField::Location);
    }
    if contact.is_empty() {
        missing.push(ReportField::Contact);
    }
    if let Some(photo) = &raw.photo {
        if !photos_enabled || !is_acceptable_photo(photo, max_photo_bytes) {
            missing.push(ReportField::Photo);
        }
    }

    if !missing.is_empty() {
        return Err(ValidationError::new(missing));
    }

    Ok(ReportDraft {
        report_type: raw.report_type,
        subject_name: subject_name.to_string(),
        location: location.to_string(),
        contact: contact.to_string(),
        description: raw.description.trim().to_string(),
        photo_url: None,
    })
}

fn is_acceptable_photo(photo: &PhotoUpload, max_bytes: usize) -> bool {
    let is_image = photo
        .content_type
        .parse::<mime::Mime>()
        .map(|m| m.type_() == mime::IMAGE)
        .unwrap_or(false);
    is_image && !photo.data.is_empty() && photo.data.len() <= max_bytes
}

/// Last validated record whose write failed with a retryable error, with the
/// photo it was built from.
struct Pending {
    record: ReportRecord,
    photo: Option<PhotoUpload>,
}

struct ControllerState {
    phase: SubmissionPhase,
    form: RawReportFields,
    pending: Option<Pending>,
}

/// Form controller for new reports.
pub struct ReportSubmissionController {
    store: Arc<dyn ReportStore>,
    media: Option<Arc<dyn MediaStore>>,
    clock: Arc<dyn Clock>,
    max_photo_bytes: usize,
    state: Mutex<ControllerState>,
    phase_tx: watch::Sender<SubmissionPhase>,
}

impl ReportSubmissionController {
    pub fn new(store: Arc<dyn ReportStore>) -> Self {
        let (phase_tx, _) = watch::channel(SubmissionPhase::Idle);
        Self {
            store,
            media: None,
            clock: Arc::new(SystemClock),
            max_photo_bytes: DEFAULT_MAX_PHOTO_BYTES,
            state: Mutex::new(ControllerState {
                phase: SubmissionPhase::Idle,
                form: RawReportFields::default(),
                pending: None,
            }),
            phase_tx,
        }
    }

    pub fn with_media(mut self, media: Arc<dyn MediaStore>, max_photo_bytes: usize) -> Self {
        self.media = Some(media);
        self.max_photo_bytes = max_photo_bytes;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current form contents.
    pub fn form(&self) -> RawReportFields {
        self.lock().form.clone()
    }

    pub fn phase(&self) -> SubmissionPhase {
        self.lock().phase
    }

    /// Phase changes, for disabling the submit control while busy.
    pub fn watch_phase(&self) -> watch::Receiver<SubmissionPhase> {
        self.phase_tx.subscribe()
    }

    /// Validates `raw` and writes the resulting report.
    ///
    /// A call made while another submission is in flight returns
    /// [`SubmissionOutcome::AlreadySubmitting`] without touching the form.
    pub async fn submit(&self, raw: RawReportFields) -> SubmissionOutcome {
        let (draft, reuse) = {
            let mut state = self.lock();
            if state.phase.is_busy() {
                tracing::debug!("submit ignored, a submission is already in flight");
                return SubmissionOutcome::AlreadySubmitting;
            }
            state.form = raw.clone();
            self.set_phase(&mut state, SubmissionPhase::Validating);

            let draft = match validate(&raw, self.media.is_some(), self.max_photo_bytes) {
                Ok(draft) => draft,
                Err(err) => {
                    tracing::info!(fields = %err, "report failed validation");
                    self.set_phase(&mut state, SubmissionPhase::Idle);
                    return SubmissionOutcome::ValidationFailed(err);
                }
            };

            let reuse = state
                .pending
                .as_ref()
                .filter(|pending| draft.matches(&pending.record) && pending.photo == raw.photo)
                .map(|pending| pending.record.clone());
            self.set_phase(&mut state, SubmissionPhase::Submitting);
            (draft, reuse)
        };

        let guard = InFlight { controller: self };
        let photo = raw.photo.clone();

        let record = match reuse {
            Some(record) => {
                tracing::info!(report_id = %record.id, "resubmitting pending report");
                record
            }
            None => match self.build_record(draft, raw.photo).await {
                Ok(record) => record,
                Err(err) => return guard.fail(None, err),
            },
        };

        match self.store.submit(record.clone()).await {
            Ok(()) => {
                tracing::info!(
                    report_id = %record.id,
                    report_type = ?record.report_type,
                    "report submitted"
                );
                guard.succeed();
                SubmissionOutcome::Accepted(record)
            }
            Err(err) => {
                tracing::warn!(report_id = %record.id, error = %err, "report submission failed");
                guard.fail(Some(Pending { record, photo }), err)
            }
        }
    }

    async fn build_record(
        &self,
        mut draft: ReportDraft,
        photo: Option<PhotoUpload>,
    ) -> Result<ReportRecord, StoreError> {
        if let (Some(photo), Some(media)) = (photo, &self.media) {
            let media_id = media.save_upload(photo.data, &photo.content_type).await?;
            draft.photo_url = Some(media.url_for(&media_id));
        }
        Ok(ReportRecord::new(draft, self.clock.now_millis()))
    }

    fn set_phase(&self, state: &mut ControllerState, phase: SubmissionPhase) {
        state.phase = phase;
        self.phase_tx.send_replace(phase);
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns the controller to `Idle` even if the submit future is dropped
/// mid-flight.
struct InFlight<'a> {
    controller: &'a ReportSubmissionController,
}

impl InFlight<'_> {
    fn succeed(self) {
        let mut state = self.controller.lock();
        state.form = state.form.cleared();
        state.pending = None;
        self.controller.set_phase(&mut state, SubmissionPhase::Success);
    }

    fn fail(self, pending: Option<Pending>, err: StoreError) -> SubmissionOutcome {
        let mut state = self.controller.lock();
        state.pending = pending.filter(|_| err.is_retryable());
        self.controller.set_phase(&mut state, SubmissionPhase::Failed);
        drop(state);
        SubmissionOutcome::StoreFailed(err)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.controller.lock();
        self.controller.set_phase(&mut state, SubmissionPhase::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lf_core::{MockClock, MockMediaStore, MockReportStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fields(subject: &str, location: &str, contact: &str) -> RawReportFields {
        RawReportFields {
            report_type: ReportType::Lost,
            subject_name: subject.to_string(),
            location: location.to_string(),
            contact: contact.to_string(),
            description: String::new(),
            photo: None,
        }
    }

    fn fixed_clock(ms: i64) -> Arc<dyn Clock> {
        let mut clock = MockClock::new();
        clock.expect_now_millis().return_const(ms);
        Arc::new(clock)
    }

    #[test]
    fn validation_reports_every_blank_field() {
        let err = validate(&fields("  ", "\t", ""), false, DEFAULT_MAX_PHOTO_BYTES).unwrap_err();
        assert_eq!(
            err.fields,
            vec![ReportField::SubjectName, ReportField::Location, ReportField::Contact]
        );
        assert_eq!(
            err.to_string(),
            "validation error: subjectName required, location required, contact required"
        );
    }

    #[test]
    fn validation_trims_values() {
        let draft = validate(
            &fields("  Red Backpack ", " Gate 3", "9991112222 "),
            false,
            DEFAULT_MAX_PHOTO_BYTES,
        )
        .unwrap();
        assert_eq!(draft.subject_name, "Red Backpack");
        assert_eq!(draft.location, "Gate 3");
        assert_eq!(draft.contact, "9991112222");
    }

    #[test]
    fn photo_must_be_an_image_within_limits() {
        let mut raw = fields("Wallet", "Ghat 2", "desk");
        raw.photo = Some(PhotoUpload {
            data: Bytes::from_static(b"%PDF"),
            content_type: "application/pdf".into(),
        });
        let err = validate(&raw, true, 16).unwrap_err();
        assert!(err.contains(ReportField::Photo));

        raw.photo = Some(PhotoUpload {
            data: Bytes::from(vec![0u8; 32]),
            content_type: "image/jpeg".into(),
        });
        assert!(validate(&raw, true, 16).is_err());
        assert!(validate(&raw, true, 64).is_ok());
        assert!(validate(&raw, false, 64).is_err());
    }

    #[tokio::test]
    async fn blank_subject_never_reaches_store() {
        let mut store = MockReportStore::new();
        store.expect_submit().never();
        let controller = ReportSubmissionController::new(Arc::new(store));

        let raw = fields("", "Gate 3", "9991112222");
        let outcome = controller.submit(raw.clone()).await;

        match outcome {
            SubmissionOutcome::ValidationFailed(err) => {
                assert_eq!(err.fields, vec![ReportField::SubjectName]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(controller.form(), raw);
        assert_eq!(controller.phase(), SubmissionPhase::Idle);
    }

    #[tokio::test]
    async fn accepted_submission_clears_form() {
        let mut store = MockReportStore::new();
        store.expect_submit().times(1).returning(|_| Ok(()));
        let controller =
            ReportSubmissionController::new(Arc::new(store)).with_clock(fixed_clock(42));

        let outcome = controller
            .submit(fields("Red Backpack", "Gate 3", "9991112222"))
            .await;

        let SubmissionOutcome::Accepted(record) = outcome else {
            panic!("expected Accepted, got {outcome:?}");
        };
        assert_eq!(record.created_at_epoch_millis, 42);
        assert_eq!(record.subject_name, "Red Backpack");
        let form = controller.form();
        assert_eq!(form, RawReportFields::default());
        assert_eq!(form.report_type, ReportType::Lost);
        assert_eq!(controller.phase(), SubmissionPhase::Idle);
    }

    #[tokio::test]
    async fn retry_after_unavailable_reuses_record_id() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen_ids = Arc::new(Mutex::new(Vec::new()));

        let mut store = MockReportStore::new();
        let counter = attempts.clone();
        let ids = seen_ids.clone();
        store.expect_submit().times(2).returning(move |record| {
            ids.lock().unwrap().push((record.id, record.created_at_epoch_millis));
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(StoreError::Unavailable("offline".into()))
            } else {
                Ok(())
            }
        });

        let mut clock = MockClock::new();
        let mut tick = 0;
        clock.expect_now_millis().returning(move || {
            tick += 1;
            tick
        });

        let controller =
            ReportSubmissionController::new(Arc::new(store)).with_clock(Arc::new(clock));
        let raw = fields("Red Backpack", "Gate 3", "9991112222");

        let first = controller.submit(raw.clone()).await;
        assert_eq!(
            first,
            SubmissionOutcome::StoreFailed(StoreError::Unavailable("offline".into()))
        );
        assert_eq!(controller.form(), raw, "form is kept after a failed write");

        let second = controller.submit(controller.form()).await;
        assert!(second.is_accepted());

        let ids = seen_ids.lock().unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], ids[1]);
    }

    #[tokio::test]
    async fn edited_form_after_failure_builds_new_record() {
        let seen_ids = Arc::new(Mutex::new(Vec::new()));
        let ids = seen_ids.clone();
        let mut store = MockReportStore::new();
        store.expect_submit().times(2).returning(move |record| {
            ids.lock().unwrap().push(record.id);
            Err(StoreError::Unavailable("offline".into()))
        });
        let controller = ReportSubmissionController::new(Arc::new(store));

        controller.submit(fields("Red Backpack", "Gate 3", "999")).await;
        controller.submit(fields("Red Backpack", "Gate 4", "999")).await;

        let ids = seen_ids.lock().unwrap();
        assert_ne!(ids[0], ids[1]);
    }

    #[tokio::test]
    async fn rejected_write_is_not_retried_verbatim() {
        let seen_ids = Arc::new(Mutex::new(Vec::new()));
        let ids = seen_ids.clone();
        let mut store = MockReportStore::new();
        store.expect_submit().times(2).returning(move |record| {
            ids.lock().unwrap().push(record.id);
            Err(StoreError::Rejected("schema".into()))
        });
        let controller = ReportSubmissionController::new(Arc::new(store));
        let raw = fields("Red Backpack", "Gate 3", "999");

        let outcome = controller.submit(raw.clone()).await;
        assert!(matches!(
            outcome,
            SubmissionOutcome::StoreFailed(ref err) if !err.is_retryable()
        ));
        controller.submit(raw).await;

        let ids = seen_ids.lock().unwrap();
        assert_ne!(ids[0], ids[1]);
    }

    #[tokio::test]
    async fn photo_is_uploaded_before_the_write() {
        let mut media = MockMediaStore::new();
        media
            .expect_save_upload()
            .times(1)
            .returning(|_, _| Ok("abc123".to_string()));
        media
            .expect_url_for()
            .returning(|id| format!("/static/uploads/{id}"));

        let mut store = MockReportStore::new();
        store
            .expect_submit()
            .withf(|record| record.photo_url.as_deref() == Some("/static/uploads/abc123"))
            .times(1)
            .returning(|_| Ok(()));

        let controller = ReportSubmissionController::new(Arc::new(store))
            .with_media(Arc::new(media), DEFAULT_MAX_PHOTO_BYTES);
        let mut raw = fields("Silver bangle", "Ghat 5", "999");
        raw.photo = Some(PhotoUpload {
            data: Bytes::from_static(b"\x89PNG"),
            content_type: "image/png".into(),
        });

        assert!(controller.submit(raw).await.is_accepted());
    }

    #[tokio::test]
    async fn failed_upload_surfaces_as_store_failure() {
        let mut media = MockMediaStore::new();
        media
            .expect_save_upload()
            .returning(|_, _| Err(StoreError::Unavailable("disk full".into())));
        let mut store = MockReportStore::new();
        store.expect_submit().never();

        let controller = ReportSubmissionController::new(Arc::new(store))
            .with_media(Arc::new(media), DEFAULT_MAX_PHOTO_BYTES);
        let mut raw = fields("Silver bangle", "Ghat 5", "999");
        raw.photo = Some(PhotoUpload {
            data: Bytes::from_static(b"\x89PNG"),
            content_type: "image/png".into(),
        });

        let outcome = controller.submit(raw.clone()).await;
        assert!(matches!(outcome, SubmissionOutcome::StoreFailed(_)));
        assert_eq!(controller.form(), raw);
        assert_eq!(controller.phase(), SubmissionPhase::Idle);
    }

    /// Store whose writes park until released.
    #[derive(Default)]
    struct GatedStore {
        release: tokio::sync::Notify,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ReportStore for GatedStore {
        async fn submit(&self, _record: ReportRecord) -> lf_core::StoreResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            Ok(())
        }

        async fn subscribe(
            &self,
            _listener: lf_core::SnapshotListener,
        ) -> Result<lf_core::SubscriptionHandle, lf_core::SubscriptionError> {
            Ok(lf_core::SubscriptionHandle::detached())
        }
    }

    #[tokio::test]
    async fn submit_while_in_flight_is_ignored() {
        let store = Arc::new(GatedStore::default());
        let controller = Arc::new(ReportSubmissionController::new(store.clone()));
        let mut phases = controller.watch_phase();
        let first_fields = fields("Red Backpack", "Gate 3", "9991112222");

        let first = tokio::spawn({
            let controller = controller.clone();
            let raw = first_fields.clone();
            async move { controller.submit(raw).await }
        });
        phases
            .wait_for(|phase| *phase == SubmissionPhase::Submitting)
            .await
            .unwrap();

        let second = controller.submit(fields("Umbrella", "Ghat 2", "desk")).await;

        assert_eq!(second, SubmissionOutcome::AlreadySubmitting);
        assert_eq!(controller.form(), first_fields);
        assert_eq!(controller.phase(), SubmissionPhase::Submitting);
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);

        store.release.notify_one();
        assert!(first.await.unwrap().is_accepted());
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert_eq!(controller.phase(), SubmissionPhase::Idle);
    }

    #[tokio::test]
    async fn new_photo_after_failure_is_uploaded_again() {
        let mut media = MockMediaStore::new();
        let mut upload = 0;
        media.expect_save_upload().times(2).returning(move |_, _| {
            upload += 1;
            Ok(format!("photo{upload}"))
        });
        media.expect_url_for().returning(|id| format!("/static/uploads/{id}"));

        let urls = Arc::new(Mutex::new(Vec::new()));
        let seen = urls.clone();
        let mut store = MockReportStore::new();
        store.expect_submit().times(2).returning(move |record| {
            seen.lock().unwrap().push(record.photo_url.clone());
            Err(StoreError::Unavailable("offline".into()))
        });

        let controller = ReportSubmissionController::new(Arc::new(store))
            .with_media(Arc::new(media), DEFAULT_MAX_PHOTO_BYTES);
        let mut raw = fields("Silver bangle", "Ghat 5", "999");
        raw.photo = Some(PhotoUpload {
            data: Bytes::from_static(b"\x89PNG first"),
            content_type: "image/png".into(),
        });
        controller.submit(raw.clone()).await;

        raw.photo = Some(PhotoUpload {
            data: Bytes::from_static(b"\x89PNG second"),
            content_type: "image/png".into(),
        });
        controller.submit(raw).await;

        assert_eq!(
            *urls.lock().unwrap(),
            vec![
                Some("/static/uploads/photo1".to_string()),
                Some("/static/uploads/photo2".to_string())
            ]
        );
    }

    #[test]
    fn phase_watch_starts_idle() {
        let store = MockReportStore::new();
        let controller = ReportSubmissionController::new(Arc::new(store));
        let rx = controller.watch_phase();
        assert_eq!(*rx.borrow(), SubmissionPhase::Idle);
    }
}
