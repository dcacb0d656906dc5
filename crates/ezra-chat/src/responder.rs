//! Assistant responder: one reply request per user message.
//!
//! The responder classifies the prompt, calls the configured
//! [`AssistantBackend`], retries retryable failures, and gives up as soon as
//! the request's cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use ezra_core::config::{AssistantConfig, BackendKind};
use ezra_core::types::{Attachment, Message, ReplyMode};

use crate::error::{BackendError, ChatError};
use crate::http::HttpBackend;
use crate::intent::ModeClassifier;

/// Characters of backend error detail shown to the user.
const ERROR_DETAIL_CHARS: usize = 100;

/// Text of the simulated backend's reply.
pub const SIMULATED_REPLY: &str = "I understand your message. This is a simulated response from \
     Ezra. In production, this would connect to the assistant backend.";

/// File name of the placeholder attached to simulated picture replies.
pub const SIMULATED_IMAGE_NAME: &str = "ezra-simulated-image.png";

// =============================================================================
// Backend contract
// =============================================================================

/// Everything a backend needs to answer one user message.
#[derive(Debug, Clone)]
pub struct ReplyRequest {
    /// Conversation before `message`, in order.
    pub history: Vec<Message>,
    pub message: Message,
    pub mode: ReplyMode,
}

/// A successful backend answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }
}

/// A service able to answer user messages.
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    async fn reply(&self, request: &ReplyRequest) -> Result<Reply, BackendError>;

    /// Whether the backend can currently answer.
    async fn health(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn name(&self) -> &'static str;
}

/// Canned reply after a fixed delay, for environments without a live backend.
///
/// Picture requests get a placeholder image attachment instead of the canned
/// text. Dropping the future (which the responder does on cancellation) abandons
/// the delay, so a cancelled simulated reply never fires.
pub struct SimulatedBackend {
    delay: Duration,
}

impl SimulatedBackend {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl AssistantBackend for SimulatedBackend {
    async fn reply(&self, request: &ReplyRequest) -> Result<Reply, BackendError> {
        tokio::time::sleep(self.delay).await;
        let subject = match request.mode {
            ReplyMode::Creative => ModeClassifier.image_prompt(&request.message.text),
            _ => None,
        };
        let Some(subject) = subject else {
            return Ok(Reply::text(SIMULATED_REPLY));
        };
        tracing::debug!(message_id = %request.message.id, subject = %subject, "Simulating image reply");
        Ok(Reply {
            text: format!(
                "A simulated image has been generated for the prompt: '{}'.",
                subject
            ),
            attachments: vec![Attachment::new(SIMULATED_IMAGE_NAME, 0)],
        })
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

// =============================================================================
// AssistantResponder
// =============================================================================

/// How a reply request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Replied { reply: Reply, mode: ReplyMode },
    Failed { error: BackendError, mode: ReplyMode },
    Cancelled,
}

/// Issues reply requests against a backend.
pub struct AssistantResponder {
    backend: Arc<dyn AssistantBackend>,
    classifier: ModeClassifier,
    max_retries: u32,
    retry_backoff: Duration,
}

impl AssistantResponder {
    /// Responder without retries.
    pub fn new(backend: Arc<dyn AssistantBackend>) -> Self {
        Self {
            backend,
            classifier: ModeClassifier,
            max_retries: 0,
            retry_backoff: Duration::ZERO,
        }
    }

    /// Retry retryable failures up to `max_retries` times, waiting
    /// `backoff * attempt` between attempts.
    pub fn with_retry(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }

    /// Build the backend selected in configuration.
    pub fn from_config(config: &AssistantConfig) -> Result<Self, ChatError> {
        let backend: Arc<dyn AssistantBackend> = match config.backend {
            BackendKind::Simulated => Arc::new(SimulatedBackend::new(Duration::from_millis(
                config.simulated_delay_ms,
            ))),
            BackendKind::Http => Arc::new(HttpBackend::new(config)?),
        };
        tracing::info!(
            backend = backend.name(),
            max_retries = config.max_retries,
            "Assistant responder configured"
        );
        Ok(Self::new(backend).with_retry(
            config.max_retries,
            Duration::from_millis(config.retry_backoff_ms),
        ))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Ask the backend for a reply to `message`.
    ///
    /// Returns [`RequestOutcome::Cancelled`] as soon as `cancel` fires,
    /// including while waiting between retries.
    pub async fn request(
        &self,
        history: Vec<Message>,
        message: Message,
        cancel: &CancellationToken,
    ) -> RequestOutcome {
        let mode = self.classifier.classify(&message.text);
        let message_id = message.id;
        let request = ReplyRequest {
            history,
            message,
            mode,
        };

        let mut attempt: u32 = 0;
        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return RequestOutcome::Cancelled,
                result = self.backend.reply(&request) => result,
            };

            match result {
                Ok(reply) => {
                    tracing::debug!(message_id = %message_id, %mode, attempt, "Reply received");
                    return RequestOutcome::Replied { reply, mode };
                }
                Err(error) if error.retryable && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        message_id = %message_id,
                        attempt,
                        error = %error,
                        "Retryable backend failure, retrying"
                    );
                    let delay = self.retry_backoff * attempt;
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return RequestOutcome::Cancelled,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        message_id = %message_id,
                        retryable = error.retryable,
                        error = %error,
                        "Reply request failed"
                    );
                    return RequestOutcome::Failed { error, mode };
                }
            }
        }
    }

    /// Whether the backend currently answers.
    pub async fn health(&self) -> Result<(), BackendError> {
        self.backend.health().await
    }
}

/// User-facing text of the `system` message that replaces a failed reply.
pub fn failure_message(error: &BackendError) -> String {
    if error.is_quota() {
        return "Ezra is temporarily unable to respond. Reason: API quota exceeded. \
                Please check your billing and plan details."
            .to_string();
    }
    let detail: String = error.message.chars().take(ERROR_DETAIL_CHARS).collect();
    let ellipsis = if error.message.chars().count() > ERROR_DETAIL_CHARS {
        "..."
    } else {
        ""
    };
    format!(
        "Ezra is temporarily unable to respond. Please check the system logs. Error: {}{}",
        detail, ellipsis
    )
}

// =============================================================================
// Tests
// =============================================================================
