//! Shared fixtures for the cross-crate tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use lf_core::{Clock, ReportType};
use lf_services::RawReportFields;

/// Clock that advances by one second on every reading.
pub struct TickingClock {
    next: AtomicI64,
}

impl TickingClock {
    pub fn starting_at(epoch_millis: i64) -> Arc<Self> {
        Arc::new(Self {
            next: AtomicI64::new(epoch_millis),
        })
    }
}

impl Clock for TickingClock {
    fn now_millis(&self) -> i64 {
        self.next.fetch_add(1_000, Ordering::SeqCst)
    }
}

pub fn lost(subject: &str, location: &str, contact: &str) -> RawReportFields {
    RawReportFields {
        report_type: ReportType::Lost,
        subject_name: subject.into(),
        location: location.into(),
        contact: contact.into(),
        ..RawReportFields::default()
    }
}

pub fn found(subject: &str, location: &str, contact: &str) -> RawReportFields {
    RawReportFields {
        report_type: ReportType::Found,
        ..lost(subject, location, contact)
    }
}

/// The everyday case: a lost red backpack at gate 3.
pub fn red_backpack() -> RawReportFields {
    lost("Red Backpack", "Gate 3", "9991112222")
}
