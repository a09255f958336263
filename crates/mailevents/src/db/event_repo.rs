//! Event repository: operations on the `events` table.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw event row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub start_datetime: String,
    pub end_datetime: Option<String>,
    pub location: Option<String>,
    pub external_url: Option<String>,
    pub external_event_id: Option<String>,
    pub host: Option<String>,
    pub status: String,
    pub source: String,
    pub created_at: String,
}

impl EventRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            start_datetime: row.get("start_datetime")?,
            end_datetime: row.get("end_datetime")?,
            location: row.get("location")?,
            external_url: row.get("external_url")?,
            external_event_id: row.get("external_event_id")?,
            host: row.get("host")?,
            status: row.get("status")?,
            source: row.get("source")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Inserts an event and returns its generated id. The `id` field of `row` is ignored.
pub fn insert(db: &Database, row: &EventRow) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO events
               (title, description, start_datetime, end_datetime, location, external_url,
                external_event_id, host, status, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                row.title,
                row.description,
                row.start_datetime,
                row.end_datetime,
                row.location,
                row.external_url,
                row.external_event_id,
                row.host,
                row.status,
                row.source,
                row.created_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Finds an event by id.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<EventRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM events WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], EventRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Finds the oldest event carrying the given external id.
pub fn find_by_external_id(
    db: &Database,
    external_event_id: &str,
) -> Result<Option<i64>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id FROM events WHERE external_event_id = ?1 ORDER BY id ASC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![external_event_id], |r| r.get::<_, i64>(0))?;
        match rows.next() {
            Some(Ok(id)) => Ok(Some(id)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Finds an event with the same title and either the same start or the same
/// external URL, created at or after `created_since`.
pub fn find_recent_match(
    db: &Database,
    title: &str,
    start_datetime: &str,
    external_url: Option<&str>,
    created_since: &str,
) -> Result<Option<i64>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id FROM events
             WHERE title = ?1
               AND (start_datetime = ?2 OR (?3 IS NOT NULL AND external_url = ?3))
               AND created_at >= ?4
             ORDER BY id ASC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(
            params![title, start_datetime, external_url, created_since],
            |r| r.get::<_, i64>(0),
        )?;
        match rows.next() {
            Some(Ok(id)) => Ok(Some(id)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Counts events from a source created at or after `created_since`,
/// returning `(total, pending)`.
pub fn count_since(
    db: &Database,
    source: &str,
    created_since: &str,
) -> Result<(u64, u64), DatabaseError> {
    db.with_conn(|conn| {
        let counts = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0)
             FROM events WHERE source = ?1 AND created_at >= ?2",
            params![source, created_since],
            |r| Ok((r.get::<_, u64>(0)?, r.get::<_, u64>(1)?)),
        )?;
        Ok(counts)
    })
}
