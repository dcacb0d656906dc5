//! Interfaces to collaborators outside the session engine.
//!
//! The engine only ever writes notes through [`NotesStore`]. [`FileSource`]
//! is the contract the file browser page is built against; the engine never
//! calls it.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{EzraError, Result};
use crate::types::{FileEntry, MessageId, NoteId, WisdomNote};

// =============================================================================
// Notes store
// =============================================================================

/// External store that owns captured wisdom notes.
///
/// Implementations must be safe to call from any thread. A store that cannot
/// be reached returns [`EzraError::Unavailable`].
pub trait NotesStore: Send + Sync {
    /// Persist a note and return its id.
    fn create_note(&self, note: &WisdomNote) -> Result<NoteId>;

    /// Look up the note captured from `message_id`, if any.
    fn note_for_message(&self, message_id: &MessageId) -> Result<Option<WisdomNote>>;

    /// All notes, oldest first.
    fn list_notes(&self) -> Result<Vec<WisdomNote>>;

    /// Notes filed under `category`, oldest first.
    fn notes_in_category(&self, category: &str) -> Result<Vec<WisdomNote>> {
        Ok(self
            .list_notes()?
            .into_iter()
            .filter(|n| n.category.as_deref() == Some(category))
            .collect())
    }

    /// Distinct categories in first-use order.
    fn categories(&self) -> Result<Vec<String>> {
        let mut categories: Vec<String> = Vec::new();
        for note in self.list_notes()? {
            if let Some(category) = note.category {
                if !categories.contains(&category) {
                    categories.push(category);
                }
            }
        }
        Ok(categories)
    }
}

/// Process-local notes store.
#[derive(Debug, Default)]
pub struct InMemoryNotesStore {
    notes: Mutex<Vec<WisdomNote>>,
}

impl InMemoryNotesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.notes.lock().map(|n| n.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NotesStore for InMemoryNotesStore {
    fn create_note(&self, note: &WisdomNote) -> Result<NoteId> {
        let mut notes = self
            .notes
            .lock()
            .map_err(|e| EzraError::Storage(format!("notes lock poisoned: {}", e)))?;
        notes.push(note.clone());
        Ok(note.id)
    }

    fn note_for_message(&self, message_id: &MessageId) -> Result<Option<WisdomNote>> {
        let notes = self
            .notes
            .lock()
            .map_err(|e| EzraError::Storage(format!("notes lock poisoned: {}", e)))?;
        Ok(notes
            .iter()
            .find(|n| n.source_message_id == *message_id)
            .cloned())
    }

    fn list_notes(&self) -> Result<Vec<WisdomNote>> {
        let notes = self
            .notes
            .lock()
            .map_err(|e| EzraError::Storage(format!("notes lock poisoned: {}", e)))?;
        Ok(notes.clone())
    }
}

// =============================================================================
// File source
// =============================================================================

/// Read-only listing of files from an external source (local folder, cloud drive).
pub trait FileSource: Send + Sync {
    fn list_files(&self, source_id: &str) -> Result<Vec<FileEntry>>;
}

/// A file source backed by a fixed, injected listing.
#[derive(Debug, Default, Clone)]
pub struct StaticFileSource {
    sources: HashMap<String, Vec<FileEntry>>,
}

impl StaticFileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the listing for `source_id`, replacing any previous one.
    pub fn with_source(mut self, source_id: impl Into<String>, files: Vec<FileEntry>) -> Self {
        self.sources.insert(source_id.into(), files);
        self
    }
}

impl FileSource for StaticFileSource {
    fn list_files(&self, source_id: &str) -> Result<Vec<FileEntry>> {
        self.sources
            .get(source_id)
            .cloned()
            .ok_or_else(|| EzraError::NotFound(format!("file source '{}'", source_id)))
    }
}
