//! Mailbox configuration repository: the single-row `mailbox_config` table.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// The stored mailbox configuration row. `password` holds whatever the
/// caller chose to persist (plain or encrypted).
#[derive(Clone, PartialEq)]
pub struct MailboxConfigRow {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub use_tls: bool,
    pub folder: String,
    pub sender_filter: Option<String>,
    pub subject_filter: Option<String>,
    pub auto_approve: bool,
    pub mark_as_read: bool,
    pub updated_at: String,
}

impl std::fmt::Debug for MailboxConfigRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxConfigRow")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("use_tls", &self.use_tls)
            .field("folder", &self.folder)
            .field("sender_filter", &self.sender_filter)
            .field("subject_filter", &self.subject_filter)
            .field("auto_approve", &self.auto_approve)
            .field("mark_as_read", &self.mark_as_read)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

impl MailboxConfigRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            server: row.get("server")?,
            port: row.get("port")?,
            username: row.get("username")?,
            password: row.get("password")?,
            use_tls: row.get("use_tls")?,
            folder: row.get("folder")?,
            sender_filter: row.get("sender_filter")?,
            subject_filter: row.get("subject_filter")?,
            auto_approve: row.get("auto_approve")?,
            mark_as_read: row.get("mark_as_read")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts or replaces the configuration row.
pub fn upsert(db: &Database, row: &MailboxConfigRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO mailbox_config
               (id, server, port, username, password, use_tls, folder, sender_filter,
                subject_filter, auto_approve, mark_as_read, updated_at)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
               server = ?1,
               port = ?2,
               username = ?3,
               password = ?4,
               use_tls = ?5,
               folder = ?6,
               sender_filter = ?7,
               subject_filter = ?8,
               auto_approve = ?9,
               mark_as_read = ?10,
               updated_at = ?11",
            params![
                row.server,
                row.port,
                row.username,
                row.password,
                row.use_tls,
                row.folder,
                row.sender_filter,
                row.subject_filter,
                row.auto_approve,
                row.mark_as_read,
                row.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Loads the configuration row, if one was ever saved.
pub fn find(db: &Database) -> Result<Option<MailboxConfigRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM mailbox_config WHERE id = 1")?;
        let mut rows = stmt.query_map([], MailboxConfigRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}
