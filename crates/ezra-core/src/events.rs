use serde::{Deserialize, Serialize};

use crate::types::{MessageId, NoteId, Sender, SessionId, SessionPhase, Timestamp, VoiceControl};

/// Events published by a conversation session.
///
/// Consumed by:
/// - presentation layers that re-render on store or indicator changes
/// - the terminal driver in `ezra-app`
/// - logs and tests asserting on lifecycle transitions
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SessionEvent {
    // =========================================================================
    // Message Events
    // =========================================================================
    /// A message was appended to the store.
    MessageAppended {
        session_id: SessionId,
        message_id: MessageId,
        sender: Sender,
        timestamp: Timestamp,
    },

    /// A reply request failed and a system message was appended in its place.
    ReplyFailed {
        session_id: SessionId,
        /// The user message whose reply failed.
        message_id: MessageId,
        retryable: bool,
        reason: String,
        timestamp: Timestamp,
    },

    /// An outstanding or queued request was cancelled before it settled.
    RequestCancelled {
        session_id: SessionId,
        message_id: MessageId,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Indicator / State Events
    // =========================================================================
    /// The typing indicator flipped.
    TypingChanged {
        session_id: SessionId,
        typing: bool,
        timestamp: Timestamp,
    },

    /// The session moved between `Idle` and `AwaitingReply`.
    StateChanged {
        session_id: SessionId,
        from: SessionPhase,
        to: SessionPhase,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Side Queries
    // =========================================================================
    /// A message was captured into the Wisdom notes-store.
    WisdomCaptured {
        session_id: SessionId,
        message_id: MessageId,
        note_id: NoteId,
        timestamp: Timestamp,
    },

    /// The conversation was exported.
    ConversationExported {
        session_id: SessionId,
        format: String,
        message_count: usize,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Lifecycle
    // =========================================================================
    /// The conversation was cleared.
    SessionReset {
        session_id: SessionId,
        discarded_requests: usize,
        timestamp: Timestamp,
    },

    /// A voice switch was toggled.
    VoiceToggled {
        session_id: SessionId,
        control: VoiceControl,
        enabled: bool,
        timestamp: Timestamp,
    },

    /// The session was torn down.
    SessionClosed {
        session_id: SessionId,
        timestamp: Timestamp,
    },
}

impl SessionEvent {
    /// Returns the timestamp of the event.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            SessionEvent::MessageAppended { timestamp, .. }
            | SessionEvent::ReplyFailed { timestamp, .. }
            | SessionEvent::RequestCancelled { timestamp, .. }
            | SessionEvent::TypingChanged { timestamp, .. }
            | SessionEvent::StateChanged { timestamp, .. }
            | SessionEvent::WisdomCaptured { timestamp, .. }
            | SessionEvent::ConversationExported { timestamp, .. }
            | SessionEvent::SessionReset { timestamp, .. }
            | SessionEvent::VoiceToggled { timestamp, .. }
            | SessionEvent::SessionClosed { timestamp, .. } => *timestamp,
        }
    }

    /// Returns the session the event belongs to.
    pub fn session_id(&self) -> SessionId {
        match self {
            SessionEvent::MessageAppended { session_id, .. }
            | SessionEvent::ReplyFailed { session_id, .. }
            | SessionEvent::RequestCancelled { session_id, .. }
            | SessionEvent::TypingChanged { session_id, .. }
            | SessionEvent::StateChanged { session_id, .. }
            | SessionEvent::WisdomCaptured { session_id, .. }
            | SessionEvent::ConversationExported { session_id, .. }
            | SessionEvent::SessionReset { session_id, .. }
            | SessionEvent::VoiceToggled { session_id, .. }
            | SessionEvent::SessionClosed { session_id, .. } => *session_id,
        }
    }

    /// Returns a snake_case event name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            SessionEvent::MessageAppended { .. } => "message_appended",
            SessionEvent::ReplyFailed { .. } => "reply_failed",
            SessionEvent::RequestCancelled { .. } => "request_cancelled",
            SessionEvent::TypingChanged { .. } => "typing_changed",
            SessionEvent::StateChanged { .. } => "state_changed",
            SessionEvent::WisdomCaptured { .. } => "wisdom_captured",
            SessionEvent::ConversationExported { .. } => "conversation_exported",
            SessionEvent::SessionReset { .. } => "session_reset",
            SessionEvent::VoiceToggled { .. } => "voice_toggled",
            SessionEvent::SessionClosed { .. } => "session_closed",
        }
    }
}
