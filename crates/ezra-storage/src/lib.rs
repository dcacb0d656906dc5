//! Ezra storage crate: SQLite notes store and markdown wisdom archive.
//!
//! Provides a WAL-mode SQLite database with migrations, a `NotesStore`
//! backed by it, and the markdown archive layout used for wisdom
//! categories and session logs.

pub mod archive;
pub mod db;
pub mod migrations;
pub mod notes;

pub use archive::{safe_filename, MarkdownNotesStore, WisdomArchive};
pub use db::Database;
pub use notes::SqliteNotesStore;
