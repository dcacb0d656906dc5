//! HTTP assistant backend.
//!
//! `POST {base_url}/assistant/reply` with the conversation so far, the new
//! message, the reply mode and its system instruction. The service answers
//! `{text, attachments?}` on success or `{code, message}` on failure.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use ezra_core::config::AssistantConfig;
use ezra_core::types::{Attachment, Message, ReplyMode};

use crate::error::{BackendError, ChatError};
use crate::responder::{AssistantBackend, Reply, ReplyRequest};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyPayload<'a> {
    conversation_history: &'a [Message],
    new_message: &'a Message,
    mode: ReplyMode,
    system_prompt: &'a str,
}

#[derive(Deserialize)]
struct ReplyBody {
    text: String,
    #[serde(default)]
    attachments: Vec<Attachment>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

/// Some services answer 200 with an error payload.
#[derive(Deserialize)]
#[serde(untagged)]
enum ResponseBody {
    Reply(ReplyBody),
    Error(ErrorBody),
}

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &AssistantConfig) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl AssistantBackend for HttpBackend {
    async fn reply(&self, request: &ReplyRequest) -> Result<Reply, BackendError> {
        let payload = ReplyPayload {
            conversation_history: &request.history,
            new_message: &request.message,
            mode: request.mode,
            system_prompt: request.mode.system_prompt(),
        };

        let response = self
            .authorize(self.client.post(self.url("/assistant/reply")))
            .json(&payload)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(map_http_error(status, body));
        }

        let body: ResponseBody = response.json().await.map_err(|e| BackendError {
            status: Some(status.as_u16()),
            code: None,
            message: format!("failed to parse assistant response: {e}"),
            retryable: false,
        })?;

        match body {
            ResponseBody::Reply(reply) => Ok(Reply {
                text: reply.text,
                attachments: reply.attachments,
            }),
            ResponseBody::Error(err) => {
                let retryable = err.code.as_deref().is_some_and(is_retryable_code);
                Err(BackendError {
                    status: Some(status.as_u16()),
                    code: err.code,
                    message: err.message,
                    retryable,
                })
            }
        }
    }

    async fn health(&self) -> Result<(), BackendError> {
        let response = self
            .authorize(self.client.get(self.url("/health")))
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(map_http_error(status, body))
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

fn transport_error(err: reqwest::Error) -> BackendError {
    BackendError {
        status: None,
        code: None,
        message: format!("assistant request failed: {err}"),
        retryable: err.is_connect() || err.is_timeout(),
    }
}

fn map_http_error(status: StatusCode, body: String) -> BackendError {
    let (code, message) = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(err) => (err.code, err.message),
        Err(_) if body.trim().is_empty() => (None, status.to_string()),
        Err(_) => (None, body),
    };
    let retryable = status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error();
    BackendError {
        status: Some(status.as_u16()),
        code,
        message,
        retryable,
    }
}

fn is_retryable_code(code: &str) -> bool {
    matches!(
        code,
        "timeout" | "rate_limited" | "unavailable" | "429" | "500" | "502" | "503" | "504"
    )
}
