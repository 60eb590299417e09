//! # lf-services
//!
//! Application services for the Lost & Found board: the submission form
//! controller and the live report feed. Both take their store as an injected
//! [`lf_core::ReportStore`].

pub mod feed;
pub mod submission;
pub mod timeout;

pub use feed::{DisplayState, ReportFeed};
pub use submission::{
    validate, PhotoUpload, RawReportFields, ReportSubmissionController, SubmissionOutcome,
    SubmissionPhase, DEFAULT_MAX_PHOTO_BYTES,
};
pub use timeout::TimeoutStore;
