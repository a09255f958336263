//! Processing history: one record per mailbox message, used to keep event
//! creation at-most-once per source message.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::history_repo::{self, ProcessingRecordRow, StatusChange};
use crate::db::{Database, DatabaseError};

/// Outcome recorded for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Processed,
    Duplicate,
    Error,
    Ignored,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Duplicate => "duplicate",
            Self::Error => "error",
            Self::Ignored => "ignored",
        }
    }

    /// Whether the message is settled and must not be processed again.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Processed | Self::Duplicate)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processed" => Ok(Self::Processed),
            "duplicate" => Ok(Self::Duplicate),
            "error" => Ok(Self::Error),
            "ignored" => Ok(Self::Ignored),
            other => Err(format!("unknown processing status '{}'", other)),
        }
    }
}

/// Error detail of a claimed message whose attempt has not finished.
pub const IN_FLIGHT_DETAIL: &str = "processing interrupted before an outcome was recorded";

/// A history entry for one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub record_id: String,
    pub message_id: String,
    pub subject: String,
    pub from_address: String,
    pub processed_at: DateTime<Utc>,
    pub status: ProcessingStatus,
    pub linked_event_id: Option<i64>,
    pub error_detail: Option<String>,
    /// Operator hint, e.g. when the body carried several candidate dates.
    pub review_note: Option<String>,
    /// For `error` records: whether a later pass should try the message again.
    /// Failures that depend only on the message content are not retried.
    #[serde(default)]
    pub retryable: bool,
}

impl ProcessingRecord {
    pub fn new(
        message_id: impl Into<String>,
        subject: impl Into<String>,
        from_address: impl Into<String>,
        status: ProcessingStatus,
    ) -> Self {
        Self {
            record_id: uuid::Uuid::new_v4().to_string(),
            message_id: message_id.into(),
            subject: subject.into(),
            from_address: from_address.into(),
            processed_at: Utc::now(),
            status,
            linked_event_id: None,
            error_detail: None,
            review_note: None,
            retryable: false,
        }
    }

    /// Placeholder written when a pass claims a message. It only survives
    /// when the attempt died before its outcome was recorded.
    pub fn in_flight(
        message_id: impl Into<String>,
        subject: impl Into<String>,
        from_address: impl Into<String>,
    ) -> Self {
        Self::new(message_id, subject, from_address, ProcessingStatus::Error)
            .with_error(IN_FLIGHT_DETAIL, false)
    }

    pub fn with_event(mut self, event_id: i64) -> Self {
        self.linked_event_id = Some(event_id);
        self
    }

    pub fn with_error(mut self, detail: impl Into<String>, retryable: bool) -> Self {
        self.error_detail = Some(detail.into());
        self.retryable = retryable;
        self
    }

    /// True when the message needs no further processing.
    pub fn is_settled(&self) -> bool {
        self.status.is_final() || (self.status == ProcessingStatus::Error && !self.retryable)
    }

    pub fn with_review_note(mut self, note: Option<String>) -> Self {
        self.review_note = note;
        self
    }

    fn to_row(&self) -> ProcessingRecordRow {
        ProcessingRecordRow {
            record_id: self.record_id.clone(),
            message_id: self.message_id.clone(),
            subject: self.subject.clone(),
            from_address: self.from_address.clone(),
            processed_at: format_timestamp(&self.processed_at),
            status: self.status.as_str().to_string(),
            linked_event_id: self.linked_event_id,
            error_detail: self.error_detail.clone(),
            review_note: self.review_note.clone(),
            retryable: self.retryable,
        }
    }

    fn from_row(row: ProcessingRecordRow) -> Result<Self, DatabaseError> {
        let status = row
            .status
            .parse::<ProcessingStatus>()
            .map_err(|_| DatabaseError::InvalidValue {
                column: "status",
                value: row.status.clone(),
            })?;
        let processed_at = DateTime::parse_from_rfc3339(&row.processed_at)
            .map_err(|_| DatabaseError::InvalidValue {
                column: "processed_at",
                value: row.processed_at.clone(),
            })?
            .with_timezone(&Utc);

        Ok(Self {
            record_id: row.record_id,
            message_id: row.message_id,
            subject: row.subject,
            from_address: row.from_address,
            processed_at,
            status,
            linked_event_id: row.linked_event_id,
            error_detail: row.error_detail,
            review_note: row.review_note,
            retryable: row.retryable,
        })
    }
}

/// Record counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub processed: u64,
    pub duplicate: u64,
    pub error: u64,
    pub ignored: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.processed + self.duplicate + self.error + self.ignored
    }
}

/// Errors from the history store.
#[derive(Error, Debug)]
pub enum HistoryError {
    /// Another pass recorded the message first.
    #[error("Message '{message_id}' already has a processing record")]
    AlreadyRecorded { message_id: String },

    #[error("Failed to read processing history: {0}")]
    Read(#[source] DatabaseError),

    #[error("Failed to write processing record: {0}")]
    Write(#[source] DatabaseError),
}

impl HistoryError {
    pub fn reason(&self) -> &'static str {
        match self {
            HistoryError::AlreadyRecorded { .. } => "duplicate",
            HistoryError::Read(_) => "history read failed",
            HistoryError::Write(_) => "history write failed",
        }
    }
}

/// Persists processing records. `record` must be an atomic insert keyed by
/// `message_id`: the loser of a concurrent insert gets `AlreadyRecorded`.
pub trait HistoryStore: Send + Sync {
    /// True when the message has a `processed` or `duplicate` record, or an
    /// `error` record that is not worth retrying.
    fn has_processed(&self, message_id: &str) -> Result<bool, HistoryError>;

    fn find(&self, message_id: &str) -> Result<Option<ProcessingRecord>, HistoryError>;

    fn record(&self, record: &ProcessingRecord) -> Result<ProcessingRecord, HistoryError>;

    /// Claims a message before anything is created for it, writing an
    /// [`ProcessingRecord::in_flight`] placeholder or taking over a retryable
    /// `error` record. Returns false when another pass owns the message or it
    /// is already settled. A claimed message is never claimed again, so an
    /// attempt that dies midway is not repeated.
    fn claim(&self, placeholder: &ProcessingRecord) -> Result<bool, HistoryError>;

    /// Replaces the status of the record for `record.message_id` if it is
    /// currently `from`. Returns false when it was not.
    fn transition(
        &self,
        from: ProcessingStatus,
        record: &ProcessingRecord,
    ) -> Result<bool, HistoryError>;

    /// Most recently processed first.
    fn query(&self, limit: u64, offset: u64) -> Result<Vec<ProcessingRecord>, HistoryError>;

    fn status_counts(&self) -> Result<StatusCounts, HistoryError>;
}

#[derive(Clone)]
pub struct SqliteHistoryStore {
    db: Database,
}

impl SqliteHistoryStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn has_processed(&self, message_id: &str) -> Result<bool, HistoryError> {
        Ok(self
            .find(message_id)?
            .is_some_and(|record| record.is_settled()))
    }

    fn find(&self, message_id: &str) -> Result<Option<ProcessingRecord>, HistoryError> {
        history_repo::find_by_message_id(&self.db, message_id)
            .and_then(|row| row.map(ProcessingRecord::from_row).transpose())
            .map_err(HistoryError::Read)
    }

    fn record(&self, record: &ProcessingRecord) -> Result<ProcessingRecord, HistoryError> {
        match history_repo::insert(&self.db, &record.to_row()) {
            Ok(()) => {
                log::debug!(
                    "Recorded {} for message {}",
                    record.status,
                    record.message_id
                );
                Ok(record.clone())
            }
            Err(e) if e.is_unique_violation() => Err(HistoryError::AlreadyRecorded {
                message_id: record.message_id.clone(),
            }),
            Err(e) => Err(HistoryError::Write(e)),
        }
    }

    fn claim(&self, placeholder: &ProcessingRecord) -> Result<bool, HistoryError> {
        match self.record(placeholder) {
            Ok(_) => Ok(true),
            Err(HistoryError::AlreadyRecorded { .. }) => history_repo::reclaim_retryable(
                &self.db,
                &placeholder.message_id,
                &format_timestamp(&placeholder.processed_at),
                placeholder.error_detail.as_deref().unwrap_or(IN_FLIGHT_DETAIL),
            )
            .map_err(HistoryError::Write),
            Err(e) => Err(e),
        }
    }

    fn transition(
        &self,
        from: ProcessingStatus,
        record: &ProcessingRecord,
    ) -> Result<bool, HistoryError> {
        let processed_at = format_timestamp(&record.processed_at);
        let change = StatusChange {
            status: record.status.as_str(),
            processed_at: &processed_at,
            linked_event_id: record.linked_event_id,
            error_detail: record.error_detail.as_deref(),
            review_note: record.review_note.as_deref(),
            retryable: record.retryable,
        };
        let moved = history_repo::transition(&self.db, &record.message_id, from.as_str(), &change)
            .map_err(HistoryError::Write)?;
        if moved {
            log::debug!(
                "Message {} moved {} -> {}",
                record.message_id,
                from,
                record.status
            );
        }
        Ok(moved)
    }

    fn query(&self, limit: u64, offset: u64) -> Result<Vec<ProcessingRecord>, HistoryError> {
        history_repo::query(&self.db, limit, offset)
            .and_then(|rows| rows.into_iter().map(ProcessingRecord::from_row).collect())
            .map_err(HistoryError::Read)
    }

    fn status_counts(&self) -> Result<StatusCounts, HistoryError> {
        let rows = history_repo::count_by_status(&self.db).map_err(HistoryError::Read)?;
        let mut counts = StatusCounts::default();
        for (status, n) in rows {
            match status.parse::<ProcessingStatus>() {
                Ok(ProcessingStatus::Processed) => counts.processed = n,
                Ok(ProcessingStatus::Duplicate) => counts.duplicate = n,
                Ok(ProcessingStatus::Error) => counts.error = n,
                Ok(ProcessingStatus::Ignored) => counts.ignored = n,
                Err(e) => log::warn!("Skipping history count: {}", e),
            }
        }
        Ok(counts)
    }
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
