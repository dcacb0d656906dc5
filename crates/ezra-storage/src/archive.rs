//! Markdown wisdom archive.
//!
//! Two layouts share one directory:
//! - `<Category>.md`: notes appended under `## Archived on <time>` headings
//! - `wisdom_log_<time>.md`: a whole conversation under `# Wisdom Log`

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;

use ezra_core::error::{EzraError, Result};
use ezra_core::ports::NotesStore;
use ezra_core::types::{Message, MessageId, NoteId, WisdomNote};

/// Category file used when a category name has no safe characters left.
const FALLBACK_CATEGORY: &str = "Uncategorized";

/// Keep ASCII letters, digits, spaces and underscores; trim the rest.
///
/// Path separators and dots never survive, so the result cannot escape the
/// archive directory.
pub fn safe_filename(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ' || *c == '_')
        .collect::<String>()
        .trim()
        .to_string()
}

#[derive(Debug, Clone)]
pub struct WisdomArchive {
    dir: PathBuf,
}

impl WisdomArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the markdown file for `category`.
    pub fn category_path(&self, category: &str) -> PathBuf {
        let mut name = safe_filename(category);
        if name.is_empty() {
            name = FALLBACK_CATEGORY.to_string();
        }
        self.dir.join(format!("{}.md", name))
    }

    /// Append one entry to the category file, creating it if needed.
    pub fn archive_to_category(
        &self,
        category: &str,
        heading: &str,
        text: &str,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.category_path(category);
        let entry = format!(
            "## Archived on {}\n\n**{}:**\n{}\n\n---\n\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
            heading,
            text
        );
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(entry.as_bytes())?;
        tracing::debug!(path = %path.display(), "Archived to wisdom category");
        Ok(path)
    }

    /// Write a whole conversation to a new `wisdom_log_<time>.md` file.
    pub fn archive_session(&self, messages: &[Message]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let now = Utc::now();
        let stem = format!("wisdom_log_{}", now.format("%Y%m%d_%H%M%S"));
        let mut path = self.dir.join(format!("{}.md", stem));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{}_{}.md", stem, n));
            n += 1;
        }

        let mut content = format!(
            "# Wisdom Log - {}\n\n",
            now.format("%Y-%m-%d %H:%M:%S UTC")
        );
        for message in messages {
            content.push_str(&format!(
                "**{}:**\n{}\n\n---\n\n",
                message.sender.label(),
                message.text
            ));
        }
        fs::write(&path, content)?;
        tracing::info!(
            path = %path.display(),
            messages = messages.len(),
            "Conversation archived to wisdom log"
        );
        Ok(path)
    }
}

/// Notes store that files every note into its category's markdown file.
///
/// Lookups by message are served from notes written by this process; the
/// markdown files are the durable record.
pub struct MarkdownNotesStore {
    archive: WisdomArchive,
    default_category: String,
    written: Mutex<Vec<WisdomNote>>,
}

impl MarkdownNotesStore {
    pub fn new(archive: WisdomArchive, default_category: impl Into<String>) -> Self {
        Self {
            archive,
            default_category: default_category.into(),
            written: Mutex::new(Vec::new()),
        }
    }

    pub fn archive(&self) -> &WisdomArchive {
        &self.archive
    }

    fn written(&self) -> Result<std::sync::MutexGuard<'_, Vec<WisdomNote>>> {
        self.written
            .lock()
            .map_err(|e| EzraError::Storage(format!("notes lock poisoned: {}", e)))
    }
}

impl NotesStore for MarkdownNotesStore {
    fn create_note(&self, note: &WisdomNote) -> Result<NoteId> {
        let category = note.category.as_deref().unwrap_or(&self.default_category);
        let mut written = self.written()?;
        self.archive
            .archive_to_category(category, &note.title, &note.content)
            .map_err(|e| EzraError::Unavailable(format!("wisdom archive: {}", e)))?;
        written.push(note.clone());
        Ok(note.id)
    }

    fn note_for_message(&self, message_id: &MessageId) -> Result<Option<WisdomNote>> {
        Ok(self
            .written()?
            .iter()
            .find(|n| n.source_message_id == *message_id)
            .cloned())
    }

    fn list_notes(&self) -> Result<Vec<WisdomNote>> {
        Ok(self.written()?.clone())
    }
}
