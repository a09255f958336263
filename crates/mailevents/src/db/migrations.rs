//! Database migration system.
//!
//! Tracks applied migrations in a `_migrations` table and applies
//! pending ones in order.

use rusqlite::Connection;

use super::error::DatabaseError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_processing_records_table",
        sql: include_str!("sql/001_create_processing_records.sql"),
    },
    Migration {
        version: 2,
        description: "create_events_table",
        sql: include_str!("sql/002_create_events.sql"),
    },
    Migration {
        version: 3,
        description: "create_mailbox_config_table",
        sql: include_str!("sql/003_create_mailbox_config.sql"),
    },
];

/// Runs all pending migrations on the given connection.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current_version) {
        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        conn.execute_batch(migration.sql)
            .map_err(|e| DatabaseError::Migration {
                version: migration.version,
                reason: e.to_string(),
            })?;

        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_all(&conn).unwrap();
        conn
    }

    fn columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({})", table))
            .unwrap();
        stmt.query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_migrations_run_on_fresh_db() {
        let conn = fresh();
        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = fresh();
        run_all(&conn).unwrap();
        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_processing_records_schema() {
        let conn = fresh();
        let columns = columns(&conn, "processing_records");
        assert!(columns.iter().any(|c| c == "review_note"));
        assert!(columns.iter().any(|c| c == "retryable"));
    }

    #[test]
    fn test_partial_history_resumes() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE _migrations (
                version INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )
        .unwrap();
        conn.execute_batch(MIGRATIONS[0].sql).unwrap();
        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (1, 'create_processing_records_table')",
            [],
        )
        .unwrap();

        run_all(&conn).unwrap();
        assert!(columns(&conn, "events").iter().any(|c| c == "external_event_id"));
        assert!(columns(&conn, "mailbox_config").iter().any(|c| c == "port"));
    }

    #[test]
    fn test_mailbox_config_rejects_out_of_range_port() {
        let conn = fresh();
        let result = conn.execute(
            "INSERT INTO mailbox_config (id, server, port, username, updated_at)
             VALUES (1, 'imap.example.com', 70000, 'events', '2026-01-01T00:00:00Z')",
            [],
        );
        assert!(result.is_err());
    }
}
