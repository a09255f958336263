//! Admin-facing operations wrapped in a plain success/error envelope.
//!
//! Errors leave this layer only as stable reason strings; details go to the
//! log. Authorization is the caller's job.

use std::sync::Arc;

use serde::Serialize;
use tracing::error;

use crate::config::{MailboxConfigUpdate, MaskedMailboxConfig};
use crate::history::ProcessingRecord;
use crate::ingest::{EmailEventProcessor, PassSummary, ProcessingStats, UploadOutcome};
use crate::mailbox::MailboxSummary;

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MIN_HISTORY_LIMIT: i64 = 10;
pub const MAX_HISTORY_LIMIT: i64 = 100;

/// Response wrapper for admin calls.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(reason.into()),
        }
    }
}

/// History page size and offset after clamping: limit in
/// [`MIN_HISTORY_LIMIT`, `MAX_HISTORY_LIMIT`], offset at least zero.
pub fn clamp_history(limit: Option<i64>, offset: Option<i64>) -> (u64, u64) {
    let limit = limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(MIN_HISTORY_LIMIT, MAX_HISTORY_LIMIT);
    let offset = offset.unwrap_or(0).max(0);
    (limit as u64, offset as u64)
}

/// Admin operations over one processor.
#[derive(Clone)]
pub struct AdminApi {
    processor: Arc<EmailEventProcessor>,
}

impl AdminApi {
    pub fn new(processor: Arc<EmailEventProcessor>) -> Self {
        Self { processor }
    }

    pub async fn process_inbox(&self) -> ApiResponse<PassSummary> {
        ApiResponse::ok(self.processor.process_inbox().await)
    }

    pub async fn process_email_content(&self, raw: &[u8]) -> ApiResponse<UploadOutcome> {
        let outcome = self.processor.process_email_content(raw).await;
        match (&outcome.error, outcome.success) {
            (Some(reason), false) => ApiResponse::err(reason.clone()),
            _ => ApiResponse::ok(outcome),
        }
    }

    pub fn get_processing_history(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> ApiResponse<Vec<ProcessingRecord>> {
        let (limit, offset) = clamp_history(limit, offset);
        match self.processor.get_processing_history(limit, offset) {
            Ok(records) => ApiResponse::ok(records),
            Err(e) => {
                error!(error = %e, "Failed to query processing history");
                ApiResponse::err(e.reason())
            }
        }
    }

    pub async fn processing_stats(&self) -> ApiResponse<ProcessingStats> {
        match self.processor.processing_stats().await {
            Ok(stats) => ApiResponse::ok(stats),
            Err(e) => {
                error!(error = %e, "Failed to compute processing stats");
                ApiResponse::err(e.reason())
            }
        }
    }

    pub fn get_configuration(&self) -> ApiResponse<Option<MaskedMailboxConfig>> {
        match self.processor.get_configuration() {
            Ok(config) => ApiResponse::ok(config),
            Err(e) => {
                error!(error = %e, "Failed to load mailbox configuration");
                ApiResponse::err("configuration error")
            }
        }
    }

    /// On validation failure the error carries the field problem, e.g.
    /// "validation failed: Port 70000 is out of range (1-65535)".
    pub fn update_configuration(
        &self,
        update: &MailboxConfigUpdate,
    ) -> ApiResponse<MaskedMailboxConfig> {
        match self.processor.update_configuration(update) {
            Ok(config) => ApiResponse::ok(config),
            Err(crate::error::MailEventsError::Validation(e)) => {
                ApiResponse::err(format!("{}: {}", e.reason(), e))
            }
            Err(e) => {
                error!(error = %e, "Failed to update mailbox configuration");
                ApiResponse::err(e.reason())
            }
        }
    }

    pub async fn test_connection(&self) -> ApiResponse<MailboxSummary> {
        match self.processor.test_connection().await {
            Ok(summary) => ApiResponse::ok(summary),
            Err(e) => {
                error!(error = %e, "Mailbox connection test failed");
                ApiResponse::err(e.reason())
            }
        }
    }
}
