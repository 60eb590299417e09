//! # Errors
//!
//! Typed failures for the Lost & Found core. Adapters convert their backend
//! errors into these before anything reaches the controller or the feed.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Form fields that can fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReportField {
    SubjectName,
    Location,
    Contact,
    Photo,
}

impl ReportField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportField::SubjectName => "subjectName",
            ReportField::Location => "location",
            ReportField::Contact => "contact",
            ReportField::Photo => "photo",
        }
    }
}

impl fmt::Display for ReportField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local, field-level validation failure. Never reaches a store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("validation error: {}", describe(.fields))]
pub struct ValidationError {
    pub fields: Vec<ReportField>,
}

fn describe(fields: &[ReportField]) -> String {
    fields
        .iter()
        .map(|field| format!("{field} required"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl ValidationError {
    pub fn new(mut fields: Vec<ReportField>) -> Self {
        fields.sort();
        fields.dedup();
        Self { fields }
    }

    pub fn contains(&self, field: ReportField) -> bool {
        self.fields.contains(&field)
    }
}

/// Failure of a write against the report collection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not be reached or did not answer in time.
    #[error("report store unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the write (e.g. malformed payload).
    #[error("report rejected: {0}")]
    Rejected(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Failure to establish or keep the live report feed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("unable to load reports: {0}")]
    Unavailable(String),

    /// The store shut down and will not deliver further snapshots.
    #[error("report feed closed")]
    Closed,
}

/// A specialized Result type for store writes.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
