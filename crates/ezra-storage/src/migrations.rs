//! Database schema migrations.
//!
//! Version 1 creates the `wisdom_notes` table alongside the
//! `schema_migrations` bookkeeping table.

use rusqlite::Connection;
use tracing::info;

use ezra_core::error::EzraError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), EzraError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| EzraError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| EzraError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: wisdom_notes");
    }

    Ok(())
}

/// Version 1: captured wisdom notes.
fn apply_v1(conn: &Connection) -> Result<(), EzraError> {
    conn.execute_batch(
        "
        -- One note per captured message.
        CREATE TABLE IF NOT EXISTS wisdom_notes (
            id                  TEXT PRIMARY KEY NOT NULL,
            title               TEXT NOT NULL,
            excerpt             TEXT NOT NULL DEFAULT '',
            content             TEXT NOT NULL DEFAULT '',
            category            TEXT,
            source_message_seq  INTEGER NOT NULL,
            source_message_uuid TEXT NOT NULL UNIQUE,
            created_at          INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_wisdom_notes_created
            ON wisdom_notes (created_at);

        CREATE INDEX IF NOT EXISTS idx_wisdom_notes_category
            ON wisdom_notes (category, created_at);

        -- Record migration.
        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'wisdom_notes');
        ",
    )
    .map_err(|e| EzraError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_run_once() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        // Running again should be idempotent.
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_source_message_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let insert = "INSERT INTO wisdom_notes
            (id, title, source_message_seq, source_message_uuid, created_at)
            VALUES (?1, 't', 0, 'same-message', 0)";
        conn.execute(insert, ["a"]).unwrap();
        assert!(conn.execute(insert, ["b"]).is_err());
    }
}
