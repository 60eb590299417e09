//! # Domain Models
//!
//! These structs represent the core entities of the Lost & Found board.
//! Reports are identified by a random UUID generated on the submitting device
//! and ordered by their creation timestamp.

use std::cmp::Ordering;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a report announces something lost or something found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportType {
    #[default]
    #[serde(alias = "Lost Item")]
    Lost,
    #[serde(alias = "Found Item/Person")]
    Found,
}

impl ReportType {
    /// Human-readable label shown on report cards.
    pub fn label(&self) -> &'static str {
        match self {
            ReportType::Lost => "Lost Item",
            ReportType::Found => "Found Item/Person",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lost" | "lost item" => Some(ReportType::Lost),
            "found" | "found item/person" => Some(ReportType::Found),
            _ => None,
        }
    }
}

/// A single lost-or-found notice.
///
/// The serialized form is the document stored in the shared collection, so
/// field names must stay stable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRecord {
    pub id: Uuid,
    pub report_type: ReportType,
    /// What (or who) was lost or found.
    pub subject_name: String,
    pub location: String,
    /// Phone number or email of the reporter.
    pub contact: String,
    #[serde(default)]
    pub description: String,
    /// Creation time; the only sort key of the feed.
    pub created_at_epoch_millis: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl PartialEq for ReportRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ReportRecord {}

impl ReportRecord {
    /// Builds a record from already-validated fields, assigning a fresh id.
    pub fn new(draft: ReportDraft, created_at_epoch_millis: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            report_type: draft.report_type,
            subject_name: draft.subject_name,
            location: draft.location,
            contact: draft.contact,
            description: draft.description,
            created_at_epoch_millis,
            photo_url: draft.photo_url,
        }
    }

    pub fn headline(&self) -> String {
        format!("{}: {}", self.report_type.label(), self.subject_name)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.created_at_epoch_millis).single()
    }

    /// True when every field, not just the id, matches `other`.
    pub fn same_content(&self, other: &Self) -> bool {
        self.id == other.id
            && self.report_type == other.report_type
            && self.subject_name == other.subject_name
            && self.location == other.location
            && self.contact == other.contact
            && self.description == other.description
            && self.created_at_epoch_millis == other.created_at_epoch_millis
            && self.photo_url == other.photo_url
    }
}

/// Trimmed, validated report fields that do not have an identity yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDraft {
    pub report_type: ReportType,
    pub subject_name: String,
    pub location: String,
    pub contact: String,
    pub description: String,
    pub photo_url: Option<String>,
}

impl ReportDraft {
    /// Whether `record` was built from these same field values.
    pub fn matches(&self, record: &ReportRecord) -> bool {
        self.report_type == record.report_type
            && self.subject_name == record.subject_name
            && self.location == record.location
            && self.contact == record.contact
            && self.description == record.description
    }
}

/// Feed order: newest first, ties broken by ascending id.
pub fn feed_order(a: &ReportRecord, b: &ReportRecord) -> Ordering {
    b.created_at_epoch_millis
        .cmp(&a.created_at_epoch_millis)
        .then_with(|| a.id.cmp(&b.id))
}

pub fn sort_reports(reports: &mut [ReportRecord]) {
    reports.sort_by(feed_order);
}
