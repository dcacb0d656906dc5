use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Author of a message in a conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    /// The person chatting with the assistant.
    User,
    /// The assistant.
    Assistant,
    /// Error surrogates such as delivery failures.
    System,
}

impl Sender {
    /// Display name used in exports and terminal output.
    pub fn label(&self) -> &'static str {
        match self {
            Sender::User => "You",
            Sender::Assistant => "Ezra",
            Sender::System => "System",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Assistant => write!(f, "assistant"),
            Sender::System => write!(f, "system"),
        }
    }
}

/// Coarse category of an attachment or external file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Document,
    Image,
    Audio,
    Video,
    /// A link or citation rather than a file.
    Reference,
    #[default]
    Other,
}

impl AttachmentKind {
    /// Infer the kind from a file name extension. Unknown extensions map to `Other`.
    pub fn from_file_name(name: &str) -> Self {
        let ext = match name.rsplit_once('.') {
            Some((_, ext)) => ext.to_ascii_lowercase(),
            None => return AttachmentKind::Other,
        };
        match ext.as_str() {
            "pdf" | "doc" | "docx" | "txt" | "md" | "rtf" | "odt" | "xlsx" | "csv" | "pptx" => {
                AttachmentKind::Document
            }
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "bmp" => AttachmentKind::Image,
            "mp3" | "wav" | "ogg" | "opus" | "m4a" | "flac" => AttachmentKind::Audio,
            "mp4" | "mov" | "webm" | "mkv" | "avi" => AttachmentKind::Video,
            "url" | "webloc" => AttachmentKind::Reference,
            _ => AttachmentKind::Other,
        }
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttachmentKind::Document => "document",
            AttachmentKind::Image => "image",
            AttachmentKind::Audio => "audio",
            AttachmentKind::Video => "video",
            AttachmentKind::Reference => "reference",
            AttachmentKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// Reply style the assistant is asked to use for a prompt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyMode {
    /// Direct, factual, concise answers.
    Functional,
    /// Expansive brainstorming and imaginative output.
    Creative,
    /// Reflective answers in the assistant's own voice (default).
    #[default]
    Wisdom,
}

impl ReplyMode {
    /// Instruction sent to the backend alongside the conversation.
    pub fn system_prompt(&self) -> &'static str {
        match self {
            ReplyMode::Functional => {
                "You are a highly efficient assistant. Provide a direct, factual, and concise \
                 answer. Do not use allegorical or metaphorical language."
            }
            ReplyMode::Creative => {
                "You are a creative partner. Brainstorm expansively, generate imaginative ideas, \
                 and explore novel concepts without constraint."
            }
            ReplyMode::Wisdom => {
                "You are Ezra, a thoughtful personal assistant. Your response should be wise, \
                 concise, and grounded."
            }
        }
    }
}

impl fmt::Display for ReplyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyMode::Functional => write!(f, "functional"),
            ReplyMode::Creative => write!(f, "creative"),
            ReplyMode::Wisdom => write!(f, "wisdom"),
        }
    }
}

/// Request-processing phase of a conversation session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No request outstanding.
    #[default]
    Idle,
    /// Exactly one request in flight; more may be queued.
    AwaitingReply,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "Idle"),
            SessionPhase::AwaitingReply => write!(f, "AwaitingReply"),
        }
    }
}

/// Voice-related switches exposed by the chat surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceControl {
    /// Read replies aloud.
    TextToSpeech,
    /// Microphone capture for dictated prompts.
    Recording,
}

// =============================================================================
// Newtype Wrappers - Identity
// =============================================================================

/// Identifier of a message.
///
/// Orders by `seq`, which the owning store assigns in insertion order.
/// The UUID keeps ids unique across sessions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId {
    pub seq: u64,
    pub uuid: Uuid,
}

impl MessageId {
    pub fn new(seq: u64) -> Self {
        Self {
            seq,
            uuid: Uuid::new_v4(),
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.seq, self.uuid)
    }
}

/// Identifier of a wisdom note.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteId(pub Uuid);

impl NoteId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a conversation session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Newtype Wrappers - Temporal
// =============================================================================

/// Unix timestamp in milliseconds since epoch.
///
/// Used for display only; message ordering never looks at it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_millis())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0).unwrap_or_default()
    }

    /// `2024-03-01 09:30 UTC` style rendering used by exports.
    pub fn display(&self) -> String {
        self.to_datetime().format("%Y-%m-%d %H:%M UTC").to_string()
    }
}

// =============================================================================
// Domain Structs
// =============================================================================

/// A file or reference attached to a message. Only described, never embedded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub size_bytes: u64,
    pub kind: AttachmentKind,
}

impl Attachment {
    /// Describe an attachment, inferring its kind from the file name.
    pub fn new(name: impl Into<String>, size_bytes: u64) -> Self {
        let name = name.into();
        let kind = AttachmentKind::from_file_name(&name);
        Self {
            name,
            size_bytes,
            kind,
        }
    }

    /// Human-readable size, e.g. `2.4 MB`.
    pub fn human_size(&self) -> String {
        human_size(self.size_bytes)
    }
}

/// Format a byte count with binary units and one decimal.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// A single entry in a conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub sender: Sender,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub wisdom_captured: bool,
    /// Reply mode used to produce an assistant message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ReplyMode>,
}

/// Content of a message before the store assigns its id and timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct NewMessage {
    pub text: String,
    pub sender: Sender,
    pub attachments: Vec<Attachment>,
    pub mode: Option<ReplyMode>,
}

impl NewMessage {
    pub fn user(text: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::User,
            attachments,
            mode: None,
        }
    }

    pub fn assistant(text: impl Into<String>, attachments: Vec<Attachment>, mode: ReplyMode) -> Self {
        Self {
            text: text.into(),
            sender: Sender::Assistant,
            attachments,
            mode: Some(mode),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::System,
            attachments: Vec::new(),
            mode: None,
        }
    }
}

/// A note captured from a chat message into the Wisdom store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WisdomNote {
    pub id: NoteId,
    pub title: String,
    pub excerpt: String,
    /// Full text of the source message.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Back-reference only; the note does not own the message.
    pub source_message_id: MessageId,
    pub created_at: Timestamp,
}

/// A file listed by an external file source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub size_bytes: u64,
    pub modified_at: Timestamp,
    pub kind: AttachmentKind,
}

// =============================================================================
// Tests
// =============================================================================
