//! Error types for the conversational session engine.

use ezra_core::error::EzraError;
use ezra_core::types::MessageId;

/// Rejected submissions. Nothing is appended and no request is issued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("message cannot be empty")]
    EmptySubmission,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
}

/// A failed assistant request.
///
/// Never surfaced to the caller of `submit`: the session turns it into a
/// `system` message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("assistant backend failed: {message}")]
pub struct BackendError {
    /// HTTP status, when the failure came from an HTTP response.
    pub status: Option<u16>,
    /// Backend-supplied error code from an `{code, message}` payload.
    pub code: Option<String>,
    pub message: String,
    /// Timeouts, connection failures, 429 and 5xx are worth retrying.
    pub retryable: bool,
}

impl BackendError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
            retryable: false,
        }
    }

    /// Whether the failure was caused by an exhausted quota or rate limit.
    pub fn is_quota(&self) -> bool {
        self.status == Some(429)
            || self.code.as_deref() == Some("rate_limited")
            || self.message.to_lowercase().contains("quota")
    }
}

/// Failure to capture a message into the notes-store.
///
/// The message's capture flag is left unchanged, so retrying is safe.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),
    #[error("notes store unavailable: {0}")]
    NotesStoreUnavailable(String),
}

/// Failure to export a conversation. No partial document is produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExportError {
    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to render document: {0}")]
    Render(String),
}

/// Errors from the chat engine.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),
    #[error("session is closed")]
    SessionClosed,
    #[error("voice error: {0}")]
    VoiceError(String),
    #[error("no async runtime available: {0}")]
    Runtime(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("internal state error: {0}")]
    State(String),
}

impl From<ChatError> for EzraError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Validation(e) => EzraError::Validation(e.to_string()),
            ChatError::Backend(e) => EzraError::Backend(e.to_string()),
            ChatError::Capture(e) => EzraError::Capture(e.to_string()),
            ChatError::Export(e) => EzraError::Export(e.to_string()),
            ChatError::MessageNotFound(id) => EzraError::NotFound(format!("message {}", id)),
            ChatError::SessionClosed => EzraError::SessionClosed,
            ChatError::Config(e) => EzraError::Config(e),
            ChatError::VoiceError(e) => EzraError::Voice(e),
            ChatError::Runtime(e) => EzraError::Runtime(e),
            ChatError::State(e) => EzraError::Internal(e),
        }
    }
}
