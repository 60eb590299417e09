use askama::Template;
use chrono::{TimeZone, Utc};
use lf_core::{ReportRecord, ReportType};
use lf_services::{DisplayState, SubmissionOutcome};

/// One report as shown in the list.
pub struct ReportCard {
    pub label: &'static str,
    pub is_lost: bool,
    pub subject: String,
    pub location: String,
    pub description: String,
    pub contact: String,
    pub reported_at: String,
    pub photo_url: String,
}

impl From<&ReportRecord> for ReportCard {
    fn from(record: &ReportRecord) -> Self {
        Self {
            label: record.report_type.label(),
            is_lost: record.report_type == ReportType::Lost,
            subject: record.subject_name.clone(),
            location: record.location.clone(),
            description: record.description.clone(),
            contact: record.contact.clone(),
            reported_at: format_timestamp(record.created_at_epoch_millis),
            photo_url: record.photo_url.clone().unwrap_or_default(),
        }
    }
}

/// "Mar 04, 09:15 AM" in UTC.
pub fn format_timestamp(epoch_millis: i64) -> String {
    Utc.timestamp_millis_opt(epoch_millis)
        .single()
        .map(|t| t.format("%b %d, %I:%M %p").to_string())
        .unwrap_or_else(|| "unknown time".to_string())
}

#[derive(Template)]
#[template(path = "feed.txt")]
pub struct FeedTemplate {
    pub count: usize,
    /// Loading/empty/error line; empty when reports are shown.
    pub status: String,
    pub cards: Vec<ReportCard>,
}

impl FeedTemplate {
    pub fn from_state(state: &DisplayState) -> Self {
        let status = match state {
            DisplayState::Loading => "Loading reports...".to_string(),
            DisplayState::Empty => "No recent reports found.".to_string(),
            DisplayState::Failed(err) => err.to_string(),
            DisplayState::Loaded(_) => String::new(),
        };
        Self {
            count: state.count(),
            status,
            cards: state.records().iter().map(ReportCard::from).collect(),
        }
    }
}

/// Renders the feed, falling back to a one-line summary if rendering fails.
pub fn render_feed(state: &DisplayState) -> String {
    let template = FeedTemplate::from_state(state);
    template
        .render()
        .unwrap_or_else(|_| format!("Recent Reports ({})", template.count))
}

/// Message shown under the form after a submit.
pub fn describe_outcome(outcome: &SubmissionOutcome) -> String {
    match outcome {
        SubmissionOutcome::Accepted(record) => format!("Report submitted: {}", record.headline()),
        SubmissionOutcome::ValidationFailed(err) => err.to_string(),
        SubmissionOutcome::StoreFailed(err) if err.is_retryable() => {
            format!("{err}. Your entries were kept; submit again to retry.")
        }
        SubmissionOutcome::StoreFailed(err) => format!("{err}. Please change the report."),
        SubmissionOutcome::AlreadySubmitting => "Still submitting, please wait.".to_string(),
    }
}
