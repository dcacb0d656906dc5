//! Conversational session engine for Ezra.
//!
//! Owns the message store of a conversation, issues assistant reply requests,
//! drives the typing indicator, captures messages into Wisdom notes and
//! exports conversations as documents.

pub mod error;
pub mod export;
pub mod http;
pub mod intent;
mod pdf;
pub mod responder;
pub mod session;
pub mod store;
pub mod typing;
pub mod voice;
pub mod wisdom;

pub use error::{BackendError, CaptureError, ChatError, ExportError, ValidationError};
pub use export::{ExportFormat, ExportService, ExportedDocument};
pub use http::HttpBackend;
pub use intent::ModeClassifier;
pub use responder::{
    failure_message, AssistantBackend, AssistantResponder, Reply, ReplyRequest, RequestOutcome,
    SimulatedBackend,
};
pub use session::ConversationSession;
pub use store::{MessageStore, Snapshot};
pub use typing::TypingIndicator;
pub use voice::VoiceState;
pub use wisdom::{CaptureOptions, Captured, WisdomCaptureService};
