//! Event Service: the calendar-side collaborator that receives extracted events.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::event_repo::{self, EventRow};
use crate::db::{Database, DatabaseError};
use crate::extractor::ExtractedEvent;

/// Source tag stored on events created from mail.
pub const EMAIL_SOURCE: &str = "email";

/// Events with the same title created this recently are treated as the same event.
pub const DUPLICATE_WINDOW_DAYS: i64 = 7;

const STORED_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Approved,
}

impl EventStatus {
    pub fn from_auto_approve(auto_approve: bool) -> Self {
        if auto_approve {
            Self::Approved
        } else {
            Self::Pending
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            other => Err(format!("unknown event status '{}'", other)),
        }
    }
}

/// Fields for a new event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub start_datetime: NaiveDateTime,
    pub end_datetime: Option<NaiveDateTime>,
    pub location: Option<String>,
    pub external_url: Option<String>,
    pub external_event_id: Option<String>,
    pub host: Option<String>,
    pub status: EventStatus,
}

impl NewEvent {
    pub fn from_extracted(extracted: &ExtractedEvent, auto_approve: bool) -> Self {
        Self {
            title: extracted.title.clone(),
            description: extracted.description.clone(),
            start_datetime: extracted.start_datetime,
            end_datetime: extracted.end_datetime,
            location: extracted.location.clone(),
            external_url: extracted.external_url.clone(),
            external_event_id: extracted.external_event_id.clone(),
            host: extracted.host.clone(),
            status: EventStatus::from_auto_approve(auto_approve),
        }
    }
}

/// A stored event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub start_datetime: NaiveDateTime,
    pub end_datetime: Option<NaiveDateTime>,
    pub location: Option<String>,
    pub external_url: Option<String>,
    pub external_event_id: Option<String>,
    pub host: Option<String>,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
}

/// Email-sourced events created since some point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecentEventCounts {
    pub total: u64,
    pub pending: u64,
}

#[derive(Error, Debug)]
pub enum EventServiceError {
    #[error("Event storage failed: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Event rejected: {0}")]
    Rejected(String),
}

impl EventServiceError {
    pub fn reason(&self) -> &'static str {
        "event creation failed"
    }
}

#[async_trait]
pub trait EventService: Send + Sync {
    async fn create_event(&self, event: NewEvent) -> Result<Event, EventServiceError>;

    /// Id of an existing event that `event` would duplicate: same external
    /// id, or same title with the same start or URL created within
    /// [`DUPLICATE_WINDOW_DAYS`].
    async fn find_duplicate(&self, event: &NewEvent) -> Result<Option<i64>, EventServiceError>;

    async fn count_recent(
        &self,
        since: DateTime<Utc>,
    ) -> Result<RecentEventCounts, EventServiceError>;
}

/// Event service writing to the local `events` table.
#[derive(Clone)]
pub struct SqliteEventService {
    db: Database,
}

impl SqliteEventService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn find(&self, id: i64) -> Result<Option<Event>, EventServiceError> {
        event_repo::find_by_id(&self.db, id)?
            .map(event_from_row)
            .transpose()
            .map_err(EventServiceError::from)
    }
}

#[async_trait]
impl EventService for SqliteEventService {
    async fn create_event(&self, event: NewEvent) -> Result<Event, EventServiceError> {
        if event.title.trim().is_empty() {
            return Err(EventServiceError::Rejected("title is empty".to_string()));
        }

        let created_at = Utc::now();
        let mut row = EventRow {
            id: 0,
            title: event.title,
            description: event.description,
            start_datetime: event.start_datetime.format(STORED_DATETIME_FORMAT).to_string(),
            end_datetime: event
                .end_datetime
                .map(|end| end.format(STORED_DATETIME_FORMAT).to_string()),
            location: event.location,
            external_url: event.external_url,
            external_event_id: event.external_event_id,
            host: event.host,
            status: event.status.as_str().to_string(),
            source: EMAIL_SOURCE.to_string(),
            created_at: format_timestamp(&created_at),
        };
        row.id = event_repo::insert(&self.db, &row)?;
        tracing::info!(event_id = row.id, status = %event.status, "Created event");

        Ok(event_from_row(row)?)
    }

    async fn find_duplicate(&self, event: &NewEvent) -> Result<Option<i64>, EventServiceError> {
        if let Some(external_id) = event.external_event_id.as_deref() {
            if let Some(id) = event_repo::find_by_external_id(&self.db, external_id)? {
                return Ok(Some(id));
            }
        }

        let since = Utc::now() - Duration::days(DUPLICATE_WINDOW_DAYS);
        let found = event_repo::find_recent_match(
            &self.db,
            &event.title,
            &event.start_datetime.format(STORED_DATETIME_FORMAT).to_string(),
            event.external_url.as_deref(),
            &format_timestamp(&since),
        )?;
        Ok(found)
    }

    async fn count_recent(
        &self,
        since: DateTime<Utc>,
    ) -> Result<RecentEventCounts, EventServiceError> {
        let (total, pending) =
            event_repo::count_since(&self.db, EMAIL_SOURCE, &format_timestamp(&since))?;
        Ok(RecentEventCounts { total, pending })
    }
}

fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn event_from_row(row: EventRow) -> Result<Event, DatabaseError> {
    let invalid = |column: &'static str, value: &str| DatabaseError::InvalidValue {
        column,
        value: value.to_string(),
    };
    let parse_datetime = |column: &'static str, value: &str| {
        NaiveDateTime::parse_from_str(value, STORED_DATETIME_FORMAT)
            .map_err(|_| invalid(column, value))
    };

    Ok(Event {
        start_datetime: parse_datetime("start_datetime", &row.start_datetime)?,
        end_datetime: row
            .end_datetime
            .as_deref()
            .map(|end| parse_datetime("end_datetime", end))
            .transpose()?,
        status: row
            .status
            .parse()
            .map_err(|_| invalid("status", &row.status))?,
        created_at: DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|_| invalid("created_at", &row.created_at))?
            .with_timezone(&Utc),
        id: row.id,
        title: row.title,
        description: row.description,
        location: row.location,
        external_url: row.external_url,
        external_event_id: row.external_event_id,
        host: row.host,
    })
}
