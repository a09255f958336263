use serde::Serialize;

use crate::events::{Event, RecentEventCounts};
use crate::history::StatusCounts;

/// One failed message in a pass. `reason` is a stable machine-usable string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassError {
    /// None when the pass failed before any message was touched.
    pub message_id: Option<String>,
    pub reason: String,
}

impl PassError {
    pub fn for_message(message_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            message_id: Some(message_id.into()),
            reason: reason.into(),
        }
    }

    pub fn for_pass(reason: impl Into<String>) -> Self {
        Self {
            message_id: None,
            reason: reason.into(),
        }
    }
}

/// Aggregate outcome of one mailbox pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub processed: u32,
    pub created_events: u32,
    pub errors: Vec<PassError>,
    pub duplicates: u32,
    pub ignored: u32,
    /// Messages left for the next pass because the batch was full.
    pub deferred: u32,
    /// Set when the pass stopped early on cancellation.
    pub cancelled: bool,
}

impl PassSummary {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            errors: vec![PassError::for_pass(reason)],
            ..Self::default()
        }
    }
}

/// Result of processing manually supplied content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadOutcome {
    pub success: bool,
    pub event: Option<Event>,
    pub error: Option<String>,
    pub review_note: Option<String>,
}

impl UploadOutcome {
    pub fn created(event: Event, review_note: Option<String>) -> Self {
        Self {
            success: true,
            event: Some(event),
            error: None,
            review_note,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            event: None,
            error: Some(reason.into()),
            review_note: None,
        }
    }
}

/// History counts plus recently created email events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingStats {
    pub records: StatusCounts,
    /// Email-sourced events created in the last [`STATS_WINDOW_DAYS`] days.
    pub recent_events: RecentEventCounts,
}

pub const STATS_WINDOW_DAYS: i64 = 30;
