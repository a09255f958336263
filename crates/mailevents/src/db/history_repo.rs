//! Processing record repository: CRUD operations for the `processing_records` table.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw processing record row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingRecordRow {
    pub record_id: String,
    pub message_id: String,
    pub subject: String,
    pub from_address: String,
    pub processed_at: String,
    pub status: String,
    pub linked_event_id: Option<i64>,
    pub error_detail: Option<String>,
    pub review_note: Option<String>,
    /// Only meaningful for `error` rows: whether a later pass should try again.
    pub retryable: bool,
}

impl ProcessingRecordRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            record_id: row.get("record_id")?,
            message_id: row.get("message_id")?,
            subject: row.get("subject")?,
            from_address: row.get("from_address")?,
            processed_at: row.get("processed_at")?,
            status: row.get("status")?,
            linked_event_id: row.get("linked_event_id")?,
            error_detail: row.get("error_detail")?,
            review_note: row.get("review_note")?,
            retryable: row.get("retryable")?,
        })
    }
}

/// Fields written when an existing record changes status.
#[derive(Debug, Clone)]
pub struct StatusChange<'a> {
    pub status: &'a str,
    pub processed_at: &'a str,
    pub linked_event_id: Option<i64>,
    pub error_detail: Option<&'a str>,
    pub review_note: Option<&'a str>,
    pub retryable: bool,
}

/// Inserts a record. Fails with a UNIQUE violation when the message already
/// has a record, which callers use as the atomic claim on a message.
pub fn insert(db: &Database, row: &ProcessingRecordRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO processing_records
               (record_id, message_id, subject, from_address, processed_at, status,
                linked_event_id, error_detail, review_note, retryable)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                row.record_id,
                row.message_id,
                row.subject,
                row.from_address,
                row.processed_at,
                row.status,
                row.linked_event_id,
                row.error_detail,
                row.review_note,
                row.retryable,
            ],
        )?;
        Ok(())
    })
}

/// Finds the record for a message, if any.
pub fn find_by_message_id(
    db: &Database,
    message_id: &str,
) -> Result<Option<ProcessingRecordRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM processing_records WHERE message_id = ?1")?;
        let mut rows = stmt.query_map(params![message_id], ProcessingRecordRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Moves a record from `expected_status` to a new status in one statement.
///
/// `linked_event_id` is only filled when the row has none yet. Returns false
/// when no row had the expected status (another pass got there first).
pub fn transition(
    db: &Database,
    message_id: &str,
    expected_status: &str,
    change: &StatusChange<'_>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let updated = conn.execute(
            "UPDATE processing_records
             SET status = ?3,
                 processed_at = ?4,
                 linked_event_id = COALESCE(linked_event_id, ?5),
                 error_detail = ?6,
                 review_note = COALESCE(?7, review_note),
                 retryable = ?8
             WHERE message_id = ?1 AND status = ?2",
            params![
                message_id,
                expected_status,
                change.status,
                change.processed_at,
                change.linked_event_id,
                change.error_detail,
                change.review_note,
                change.retryable,
            ],
        )?;
        Ok(updated == 1)
    })
}

/// Takes over a retryable `error` record for a new attempt: the row stays
/// `error` but stops being retryable, so no other pass picks it up.
/// Returns false when the row is missing or not a retryable error.
pub fn reclaim_retryable(
    db: &Database,
    message_id: &str,
    processed_at: &str,
    error_detail: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let updated = conn.execute(
            "UPDATE processing_records
             SET processed_at = ?2,
                 error_detail = ?3,
                 retryable = 0
             WHERE message_id = ?1 AND status = 'error' AND retryable = 1",
            params![message_id, processed_at, error_detail],
        )?;
        Ok(updated == 1)
    })
}

/// Returns a page of records, most recently processed first.
pub fn query(
    db: &Database,
    limit: u64,
    offset: u64,
) -> Result<Vec<ProcessingRecordRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM processing_records
             ORDER BY processed_at DESC, rowid DESC
             LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt
            .query_map(
                params![limit as i64, offset as i64],
                ProcessingRecordRow::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts records grouped by status.
pub fn count_by_status(db: &Database) -> Result<Vec<(String, u64)>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM processing_records GROUP BY status ORDER BY status",
        )?;
        let counts = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, u64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    })
}
