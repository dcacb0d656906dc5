//! SQLite-backed wisdom notes store.

use std::sync::Arc;

use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use ezra_core::error::{EzraError, Result};
use ezra_core::ports::NotesStore;
use ezra_core::types::{MessageId, NoteId, Timestamp, WisdomNote};

use crate::db::Database;

const NOTE_COLUMNS: &str = "id, title, excerpt, content, category, \
     source_message_seq, source_message_uuid, created_at";

/// Persists notes in the `wisdom_notes` table.
pub struct SqliteNotesStore {
    db: Arc<Database>,
}

impl SqliteNotesStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl NotesStore for SqliteNotesStore {
    fn create_note(&self, note: &WisdomNote) -> Result<NoteId> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO wisdom_notes (id, title, excerpt, content, category,
                     source_message_seq, source_message_uuid, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    note.id.0.to_string(),
                    note.title,
                    note.excerpt,
                    note.content,
                    note.category,
                    note.source_message_id.seq as i64,
                    note.source_message_id.uuid.to_string(),
                    note.created_at.0,
                ],
            )
            .map_err(|e| EzraError::Storage(format!("Failed to save note: {}", e)))?;
            Ok(())
        })?;
        tracing::debug!(note_id = %note.id, "Wisdom note stored");
        Ok(note.id)
    }

    fn note_for_message(&self, message_id: &MessageId) -> Result<Option<WisdomNote>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM wisdom_notes WHERE source_message_uuid = ?1",
                    NOTE_COLUMNS
                ),
                params![message_id.uuid.to_string()],
                row_to_note,
            )
            .optional()
            .map_err(|e| EzraError::Storage(e.to_string()))
        })
    }

    fn notes_in_category(&self, category: &str) -> Result<Vec<WisdomNote>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM wisdom_notes WHERE category = ?1 ORDER BY created_at, rowid",
                    NOTE_COLUMNS
                ))
                .map_err(|e| EzraError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(params![category], row_to_note)
                .map_err(|e| EzraError::Storage(e.to_string()))?;
            collect_notes(rows)
        })
    }

    fn categories(&self) -> Result<Vec<String>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT category FROM wisdom_notes WHERE category IS NOT NULL \
                     GROUP BY category ORDER BY MIN(created_at), MIN(rowid)",
                )
                .map_err(|e| EzraError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| EzraError::Storage(e.to_string()))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| EzraError::Storage(format!("Failed to read categories: {}", e)))
        })
    }

    fn list_notes(&self) -> Result<Vec<WisdomNote>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM wisdom_notes ORDER BY created_at, rowid",
                    NOTE_COLUMNS
                ))
                .map_err(|e| EzraError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map([], row_to_note)
                .map_err(|e| EzraError::Storage(e.to_string()))?;
            collect_notes(rows)
        })
    }
}

fn collect_notes<I>(rows: I) -> Result<Vec<WisdomNote>>
where
    I: Iterator<Item = rusqlite::Result<WisdomNote>>,
{
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| EzraError::Storage(format!("Failed to read notes: {}", e)))
}

fn row_to_note(row: &Row<'_>) -> rusqlite::Result<WisdomNote> {
    let seq: i64 = row.get(5)?;
    Ok(WisdomNote {
        id: NoteId(uuid_column(row, 0)?),
        title: row.get(1)?,
        excerpt: row.get(2)?,
        content: row.get(3)?,
        category: row.get(4)?,
        source_message_id: MessageId {
            seq: seq as u64,
            uuid: uuid_column(row, 6)?,
        },
        created_at: Timestamp(row.get(7)?),
    })
}

fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
