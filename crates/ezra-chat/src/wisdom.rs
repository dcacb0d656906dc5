//! Wisdom capture: turn a chat message into a note in the notes-store.
//!
//! Capture is idempotent per message. The service only talks to the
//! notes-store; the caller sets the message's capture flag once the note is
//! stored, so a failed capture can be retried.

use std::sync::Arc;

use ezra_core::config::WisdomConfig;
use ezra_core::ports::NotesStore;
use ezra_core::types::{Message, NoteId, Timestamp, WisdomNote};

use crate::error::CaptureError;

const ELLIPSIS: &str = "...";
const UNTITLED: &str = "Untitled note";

/// Caller overrides for a capture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Used instead of the derived title when non-blank.
    pub title: Option<String>,
    /// Falls back to the configured default category.
    pub category: Option<String>,
}

impl CaptureOptions {
    pub fn with_category(category: impl Into<String>) -> Self {
        Self {
            title: None,
            category: Some(category.into()),
        }
    }
}

/// Result of a capture.
#[derive(Debug, Clone, PartialEq)]
pub struct Captured {
    pub note: WisdomNote,
    /// False when the message already had a note.
    pub created: bool,
}

pub struct WisdomCaptureService {
    notes: Arc<dyn NotesStore>,
    title_max_chars: usize,
    excerpt_max_chars: usize,
    default_category: String,
}

impl WisdomCaptureService {
    pub fn new(notes: Arc<dyn NotesStore>, config: &WisdomConfig) -> Self {
        Self {
            notes,
            title_max_chars: config.title_max_chars.max(ELLIPSIS.len() + 1),
            excerpt_max_chars: config.excerpt_max_chars.max(ELLIPSIS.len() + 1),
            default_category: config.default_category.clone(),
        }
    }

    /// Store a note for `message`, or return the one it already has.
    ///
    /// Blocks on notes-store I/O; callers must not hold locks other work
    /// waits on.
    pub fn capture(
        &self,
        message: &Message,
        options: &CaptureOptions,
    ) -> Result<Captured, CaptureError> {
        if message.wisdom_captured {
            match self.notes.note_for_message(&message.id) {
                Ok(Some(note)) => {
                    return Ok(Captured {
                        note,
                        created: false,
                    })
                }
                Ok(None) => {
                    tracing::warn!(
                        message_id = %message.id,
                        "Captured message has no note in the store, capturing again"
                    );
                }
                Err(e) => return Err(CaptureError::NotesStoreUnavailable(e.to_string())),
            }
        }

        let note = self.build_note(message, options);
        self.notes
            .create_note(&note)
            .map_err(|e| CaptureError::NotesStoreUnavailable(e.to_string()))?;

        tracing::info!(
            message_id = %message.id,
            note_id = %note.id,
            category = note.category.as_deref().unwrap_or_default(),
            "Message captured into wisdom"
        );
        Ok(Captured {
            note,
            created: true,
        })
    }

    /// Notes in the store, optionally only those filed under `category`.
    pub fn notes(&self, category: Option<&str>) -> Result<Vec<WisdomNote>, CaptureError> {
        let notes = match category {
            Some(category) => self.notes.notes_in_category(category),
            None => self.notes.list_notes(),
        };
        notes.map_err(|e| CaptureError::NotesStoreUnavailable(e.to_string()))
    }

    /// Categories that hold at least one note.
    pub fn categories(&self) -> Result<Vec<String>, CaptureError> {
        self.notes
            .categories()
            .map_err(|e| CaptureError::NotesStoreUnavailable(e.to_string()))
    }

    fn build_note(&self, message: &Message, options: &CaptureOptions) -> WisdomNote {
        let title = options
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| truncate(t, self.title_max_chars))
            .unwrap_or_else(|| derive_title(message, self.title_max_chars));

        let category = options
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.default_category)
            .to_string();

        WisdomNote {
            id: NoteId::new(),
            title,
            excerpt: derive_excerpt(&message.text, self.excerpt_max_chars),
            content: message.text.clone(),
            category: Some(category),
            source_message_id: message.id,
            created_at: Timestamp::now(),
        }
    }
}

fn derive_title(message: &Message, max_chars: usize) -> String {
    if let Some(line) = message.text.lines().map(str::trim).find(|l| !l.is_empty()) {
        return truncate(line, max_chars);
    }
    match message.attachments.first() {
        Some(attachment) => truncate(&format!("Attachment: {}", attachment.name), max_chars),
        None => UNTITLED.to_string(),
    }
}

fn derive_excerpt(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate(&collapsed, max_chars)
}

/// Bound `text` to `max_chars` characters, ending in an ellipsis when cut.
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let head: String = text.chars().take(keep).collect();
    format!("{}{}", head.trim_end(), ELLIPSIS)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ezra_core::error::{EzraError, Result as EzraResult};
    use ezra_core::ports::InMemoryNotesStore;
    use ezra_core::types::{Attachment, MessageId, NewMessage, ReplyMode};

    use crate::store::MessageStore;

    struct UnreachableNotesStore;

    impl NotesStore for UnreachableNotesStore {
        fn create_note(&self, _note: &WisdomNote) -> EzraResult<NoteId> {
            Err(EzraError::Unavailable("connection refused".into()))
        }

        fn note_for_message(&self, _message_id: &MessageId) -> EzraResult<Option<WisdomNote>> {
            Err(EzraError::Unavailable("connection refused".into()))
        }

        fn list_notes(&self) -> EzraResult<Vec<WisdomNote>> {
            Err(EzraError::Unavailable("connection refused".into()))
        }
    }

    fn service(notes: Arc<dyn NotesStore>) -> WisdomCaptureService {
        WisdomCaptureService::new(notes, &WisdomConfig::default())
    }

    fn message(new: NewMessage) -> Message {
        let mut store = MessageStore::new();
        let id = store.append(new).unwrap();
        store.get(&id).unwrap().clone()
    }

    #[test]
    fn test_capture_creates_note() {
        let notes = Arc::new(InMemoryNotesStore::new());
        let svc = service(notes.clone());
        let msg = message(NewMessage::assistant(
            "Patience is a form of attention.\nIt compounds.",
            vec![],
            ReplyMode::Wisdom,
        ));

        let captured = svc.capture(&msg, &CaptureOptions::default()).unwrap();
        assert!(captured.created);
        let note = captured.note;
        assert_eq!(note.title, "Patience is a form of attention.");
        assert_eq!(note.excerpt, "Patience is a form of attention. It compounds.");
        assert_eq!(note.category.as_deref(), Some("General"));
        assert_eq!(note.source_message_id, msg.id);
        assert_eq!(notes.len(), 1);
    }

    #[test]
    fn test_captured_message_returns_existing_note() {
        let notes = Arc::new(InMemoryNotesStore::new());
        let svc = service(notes.clone());
        let mut msg = message(NewMessage::user("Remember this", vec![]));

        let first = svc.capture(&msg, &CaptureOptions::default()).unwrap();
        msg.wisdom_captured = true;
        let second = svc
            .capture(&msg, &CaptureOptions::with_category("Other"))
            .unwrap();
        assert!(!second.created);
        assert_eq!(first.note.id, second.note.id);
        assert_eq!(notes.len(), 1);
    }

    #[test]
    fn test_unreachable_store_is_unavailable() {
        let svc = service(Arc::new(UnreachableNotesStore));
        let msg = message(NewMessage::user("Keep me", vec![]));

        let err = svc.capture(&msg, &CaptureOptions::default()).unwrap_err();
        assert!(matches!(err, CaptureError::NotesStoreUnavailable(_)));
        assert!(svc.notes(None).is_err());
    }

    #[test]
    fn test_long_title_is_truncated_with_ellipsis() {
        let svc = service(Arc::new(InMemoryNotesStore::new()));
        let msg = message(NewMessage::user("word ".repeat(40), vec![]));

        let note = svc.capture(&msg, &CaptureOptions::default()).unwrap().note;
        assert!(note.title.chars().count() <= 60);
        assert!(note.title.ends_with("..."));
        assert!(note.excerpt.chars().count() <= 160);
    }

    #[test]
    fn test_attachment_only_message_title() {
        let svc = service(Arc::new(InMemoryNotesStore::new()));
        let msg = message(NewMessage::user(
            "  ",
            vec![Attachment::new("Research.docx", 2048)],
        ));

        let note = svc.capture(&msg, &CaptureOptions::default()).unwrap().note;
        assert_eq!(note.title, "Attachment: Research.docx");
    }

    #[test]
    fn test_user_title_and_category_win() {
        let svc = service(Arc::new(InMemoryNotesStore::new()));
        let msg = message(NewMessage::user("Some long thought", vec![]));

        let options = CaptureOptions {
            title: Some("  On patience ".into()),
            category: Some("Reflections".into()),
        };
        let note = svc.capture(&msg, &options).unwrap().note;
        assert_eq!(note.title, "On patience");
        assert_eq!(note.category.as_deref(), Some("Reflections"));
    }

    #[test]
    fn test_blank_user_title_falls_back_to_derived() {
        let svc = service(Arc::new(InMemoryNotesStore::new()));
        let msg = message(NewMessage::user("\n\nSecond line", vec![]));

        let options = CaptureOptions {
            title: Some("   ".into()),
            category: None,
        };
        let note = svc.capture(&msg, &options).unwrap().note;
        assert_eq!(note.title, "Second line");
    }

    #[test]
    fn test_notes_by_category() {
        let svc = service(Arc::new(InMemoryNotesStore::new()));
        let a = message(NewMessage::user("Morning pages", vec![]));
        let b = message(NewMessage::user("Chapter outline", vec![]));
        svc.capture(&a, &CaptureOptions::with_category("Reflections"))
            .unwrap();
        svc.capture(&b, &CaptureOptions::with_category("Book")).unwrap();

        assert_eq!(svc.notes(None).unwrap().len(), 2);
        let book = svc.notes(Some("Book")).unwrap();
        assert_eq!(book.len(), 1);
        assert_eq!(book[0].title, "Chapter outline");
        assert!(svc.notes(Some("Nope")).unwrap().is_empty());
        assert_eq!(svc.categories().unwrap(), vec!["Reflections", "Book"]);
    }
}
