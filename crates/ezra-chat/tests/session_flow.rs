//! End-to-end conversation flows against the simulated and HTTP backends.
//!
//! Each test builds its own session from configuration the way the `ezra`
//! binary does.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use ezra_chat::responder::SIMULATED_REPLY;
use ezra_chat::{AssistantResponder, CaptureOptions, ConversationSession, ExportFormat};
use ezra_core::config::{BackendKind, EzraConfig};
use ezra_core::events::SessionEvent;
use ezra_core::ports::{InMemoryNotesStore, NotesStore};
use ezra_core::types::{Attachment, ReplyMode, Sender, SessionPhase};

// =============================================================================
// Helpers
// =============================================================================

fn simulated_config() -> EzraConfig {
    let mut config = EzraConfig::default();
    config.assistant.backend = BackendKind::Simulated;
    config.assistant.simulated_delay_ms = 20;
    config
}

fn make_session(config: &EzraConfig, notes: Arc<InMemoryNotesStore>) -> ConversationSession {
    let responder = AssistantResponder::from_config(&config.assistant).unwrap();
    ConversationSession::new(config, responder, notes).unwrap()
}

async fn wait_idle(session: &ConversationSession) {
    let mut typing = session.typing_watch();
    tokio::time::timeout(Duration::from_secs(5), typing.wait_for(|t| !*t))
        .await
        .expect("session never went idle")
        .unwrap();
}

// =============================================================================
// Simulated backend
// =============================================================================

#[tokio::test]
async fn test_simulated_conversation_capture_and_export() {
    let notes = Arc::new(InMemoryNotesStore::new());
    let session = make_session(&simulated_config(), notes.clone());
    let mut events = session.subscribe();

    session
        .submit("How do I convert a PDF?", vec![Attachment::new("scan.pdf", 4096)])
        .unwrap();
    assert_eq!(session.phase(), SessionPhase::AwaitingReply);
    wait_idle(&session).await;

    let messages = session.messages();
    assert_eq!(messages.len(), 2);
    let reply = &messages.as_slice()[1];
    assert_eq!(reply.sender, Sender::Assistant);
    assert_eq!(reply.text, SIMULATED_REPLY);
    assert_eq!(reply.mode, Some(ReplyMode::Functional));

    let note = session
        .capture(&reply.id, &CaptureOptions::with_category("Guides"))
        .unwrap();
    assert_eq!(note.category.as_deref(), Some("Guides"));
    assert_eq!(notes.list_notes().unwrap().len(), 1);

    let doc = session.export(ExportFormat::PlainDocument).unwrap();
    let body = String::from_utf8(doc.body).unwrap();
    assert!(body.contains("You:\nHow do I convert a PDF?"));
    assert!(body.contains("[attachment: scan.pdf (4.0 KB, document)]"));
    assert!(doc.file_name.ends_with(".txt"));

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(event.event_name());
    }
    assert!(names.contains(&"message_appended"));
    assert!(names.contains(&"wisdom_captured"));
    assert!(names.contains(&"conversation_exported"));
}

#[tokio::test]
async fn test_rapid_simulated_submissions_keep_order() {
    let session = make_session(&simulated_config(), Arc::new(InMemoryNotesStore::new()));
    for text in ["one", "two", "three"] {
        session.submit(text, vec![]).unwrap();
    }
    assert_eq!(session.queued_len(), 2);

    // Wait until all three replies have landed
    let mut events = session.subscribe();
    let mut replies = 0;
    while replies < 3 {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for replies")
            .unwrap();
        if let SessionEvent::MessageAppended {
            sender: Sender::Assistant,
            ..
        } = event
        {
            replies += 1;
        }
    }

    let senders: Vec<Sender> = session.messages().iter().map(|m| m.sender).collect();
    assert_eq!(
        senders,
        vec![
            Sender::User,
            Sender::User,
            Sender::User,
            Sender::Assistant,
            Sender::Assistant,
            Sender::Assistant,
        ]
    );
    assert_eq!(session.phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn test_reset_before_simulated_reply_fires() {
    let mut config = simulated_config();
    config.assistant.simulated_delay_ms = 200;
    let session = make_session(&config, Arc::new(InMemoryNotesStore::new()));

    session.submit("Hello", vec![]).unwrap();
    session.reset().unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(session.messages().is_empty());
    assert!(!session.is_typing());
}

// =============================================================================
// HTTP backend
// =============================================================================

#[tokio::test]
async fn test_http_backend_retries_then_replies() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        "/assistant/reply",
        post(move |Json(body): Json<Value>| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    return (
                        StatusCode::SERVICE_UNAVAILABLE,
                        Json(json!({ "code": "unavailable", "message": "warming up" })),
                    );
                }
                let text = format!("echo: {}", body["newMessage"]["text"].as_str().unwrap_or(""));
                (StatusCode::OK, Json(json!({ "text": text })))
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut config = EzraConfig::default();
    config.assistant.backend = BackendKind::Http;
    config.assistant.base_url = format!("http://{}", addr);
    config.assistant.max_retries = 2;
    config.assistant.retry_backoff_ms = 10;
    let session = make_session(&config, Arc::new(InMemoryNotesStore::new()));

    session.submit("ping", vec![]).unwrap();
    wait_idle(&session).await;

    let messages = session.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages.as_slice()[1].text, "echo: ping");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_http_backend_failure_becomes_system_message() {
    let app = Router::new().route(
        "/assistant/reply",
        post(|| async {
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({ "code": "rate_limited", "message": "quota exhausted" })),
            )
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut config = EzraConfig::default();
    config.assistant.backend = BackendKind::Http;
    config.assistant.base_url = format!("http://{}", addr);
    config.assistant.max_retries = 0;
    let session = make_session(&config, Arc::new(InMemoryNotesStore::new()));

    session.submit("Hello", vec![]).unwrap();
    wait_idle(&session).await;

    let messages = session.messages();
    let last = messages.as_slice().last().unwrap();
    assert_eq!(last.sender, Sender::System);
    assert!(last.text.contains("API quota exceeded"));
}
