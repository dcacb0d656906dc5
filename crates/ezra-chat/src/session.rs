//! Conversation session: the single owner of one conversation.
//!
//! All store and queue mutations go through one mutex-guarded state. Reply
//! requests run on spawned tasks and come back through `settle`, which checks
//! the request's cancellation token under the lock before touching the store.
//! A request cancelled by `reset` or `close` therefore never mutates the
//! conversation, even if its backend call completes later.
//!
//! Submissions made while a reply is pending are queued and answered in
//! submission order.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use ezra_core::config::{EzraConfig, SessionConfig};
use ezra_core::events::SessionEvent;
use ezra_core::ports::NotesStore;
use ezra_core::types::{
    Attachment, Message, MessageId, NewMessage, ReplyMode, SessionId, SessionPhase, Timestamp,
    VoiceControl, WisdomNote,
};

use crate::error::{BackendError, CaptureError, ChatError, ValidationError};
use crate::export::{ExportFormat, ExportService, ExportedDocument};
use crate::responder::{failure_message, AssistantResponder, RequestOutcome};
use crate::store::{MessageStore, Snapshot};
use crate::typing::TypingIndicator;
use crate::voice::VoiceState;
use crate::wisdom::{CaptureOptions, WisdomCaptureService};

struct PendingRequest {
    message_id: MessageId,
    cancel: CancellationToken,
}

#[derive(Default)]
struct SessionState {
    store: MessageStore,
    /// User messages waiting for their reply request.
    queue: VecDeque<MessageId>,
    in_flight: Option<PendingRequest>,
    phase: SessionPhase,
    voice: VoiceState,
    closed: bool,
}

struct Shared {
    id: SessionId,
    state: Mutex<SessionState>,
    responder: AssistantResponder,
    wisdom: WisdomCaptureService,
    /// Held for the whole of a capture; taken before `state`, never while holding it.
    capturing: Mutex<()>,
    exporter: ExportService,
    typing: TypingIndicator,
    events: broadcast::Sender<SessionEvent>,
    config: SessionConfig,
    /// Parent of every request token; cancelled on close.
    root: CancellationToken,
    runtime: Handle,
}

/// One conversation with the assistant.
///
/// Must be created inside a tokio runtime; reply requests are spawned onto it.
/// Dropping the session closes it.
pub struct ConversationSession {
    shared: Arc<Shared>,
}

impl ConversationSession {
    pub fn new(
        config: &EzraConfig,
        responder: AssistantResponder,
        notes: Arc<dyn NotesStore>,
    ) -> Result<Self, ChatError> {
        let runtime = Handle::try_current().map_err(|e| ChatError::Runtime(e.to_string()))?;
        let (events, _) = broadcast::channel(config.session.event_buffer.max(1));
        let shared = Arc::new(Shared {
            id: SessionId::new(),
            state: Mutex::new(SessionState::default()),
            responder,
            wisdom: WisdomCaptureService::new(notes, &config.wisdom),
            capturing: Mutex::new(()),
            exporter: ExportService::from_config(&config.export),
            typing: TypingIndicator::new(),
            events,
            config: config.session.clone(),
            root: CancellationToken::new(),
            runtime,
        });

        {
            let mut state = shared.lock()?;
            shared.seed_greeting(&mut state);
        }

        tracing::info!(
            session_id = %shared.id,
            backend = shared.responder.backend_name(),
            "Conversation session started"
        );
        Ok(Self { shared })
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    /// Append a user message and request a reply for it.
    ///
    /// The reply request starts immediately when no other request is
    /// outstanding; otherwise it waits its turn in the queue.
    pub fn submit(
        &self,
        text: impl Into<String>,
        attachments: Vec<Attachment>,
    ) -> Result<MessageId, ChatError> {
        let text = text.into();
        if text.trim().is_empty() && attachments.is_empty() {
            return Err(ValidationError::EmptySubmission.into());
        }
        let max_chars = self.shared.config.max_message_chars;
        if text.chars().count() > max_chars {
            return Err(ValidationError::MessageTooLong(max_chars).into());
        }

        let mut state = self.shared.lock()?;
        if state.closed {
            return Err(ChatError::SessionClosed);
        }
        let id = state.store.append(NewMessage::user(text, attachments))?;
        self.shared.message_appended(&state, id);
        state.queue.push_back(id);
        tracing::debug!(
            session_id = %self.shared.id,
            message_id = %id,
            queued = state.queue.len(),
            "User message submitted"
        );

        if state.in_flight.is_none() {
            Shared::dispatch_next(&self.shared, &mut state);
        }
        Ok(id)
    }

    /// Cancel outstanding and queued requests, clear the conversation and
    /// return to `Idle`.
    pub fn reset(&self) -> Result<(), ChatError> {
        let mut state = self.shared.lock()?;
        if state.closed {
            return Err(ChatError::SessionClosed);
        }

        let discarded = self.shared.cancel_pending(&mut state);
        state.store.clear();
        self.shared.set_phase(&mut state, SessionPhase::Idle);
        self.shared.typing_settled(false);
        self.shared.seed_greeting(&mut state);

        tracing::info!(
            session_id = %self.shared.id,
            discarded_requests = discarded,
            "Conversation reset"
        );
        self.shared.emit(SessionEvent::SessionReset {
            session_id: self.shared.id,
            discarded_requests: discarded,
            timestamp: Timestamp::now(),
        });
        Ok(())
    }

    /// Tear the session down. In-flight work is cancelled and the store
    /// refuses further writes. Idempotent.
    pub fn close(&self) {
        let mut state = match self.shared.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.closed {
            return;
        }
        state.closed = true;
        self.shared.root.cancel();
        let discarded = self.shared.cancel_pending(&mut state);
        state.store.close();
        self.shared.set_phase(&mut state, SessionPhase::Idle);
        self.shared.typing_settled(false);

        tracing::info!(
            session_id = %self.shared.id,
            discarded_requests = discarded,
            "Conversation session closed"
        );
        self.shared.emit(SessionEvent::SessionClosed {
            session_id: self.shared.id,
            timestamp: Timestamp::now(),
        });
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().map(|s| s.closed).unwrap_or(true)
    }

    /// Capture a message into the Wisdom notes-store.
    ///
    /// The notes-store is written without holding the session lock, so
    /// replies keep settling while it works.
    pub fn capture(
        &self,
        message_id: &MessageId,
        options: &CaptureOptions,
    ) -> Result<WisdomNote, ChatError> {
        // One capture at a time keeps a single note per message.
        let _capturing = self
            .shared
            .capturing
            .lock()
            .map_err(|e| ChatError::State(format!("capture lock poisoned: {}", e)))?;

        let message = {
            let state = self.shared.lock()?;
            if state.closed {
                return Err(ChatError::SessionClosed);
            }
            state
                .store
                .get(message_id)
                .map_err(|_| CaptureError::MessageNotFound(*message_id))?
                .clone()
        };

        let captured = self.shared.wisdom.capture(&message, options)?;
        if !captured.created {
            return Ok(captured.note);
        }

        {
            let mut state = self.shared.lock()?;
            if let Err(e) = state.store.mark_captured(message_id) {
                tracing::warn!(
                    session_id = %self.shared.id,
                    message_id = %message_id,
                    error = %e,
                    "Message left the conversation before its capture finished"
                );
            }
        }
        self.shared.emit(SessionEvent::WisdomCaptured {
            session_id: self.shared.id,
            message_id: *message_id,
            note_id: captured.note.id,
            timestamp: Timestamp::now(),
        });
        Ok(captured.note)
    }

    /// Notes in the Wisdom notes-store, optionally only one category.
    pub fn wisdom_notes(&self, category: Option<&str>) -> Result<Vec<WisdomNote>, ChatError> {
        Ok(self.shared.wisdom.notes(category)?)
    }

    pub fn wisdom_categories(&self) -> Result<Vec<String>, ChatError> {
        Ok(self.shared.wisdom.categories()?)
    }

    /// Render the conversation as it stands now.
    pub fn export(&self, format: ExportFormat) -> Result<ExportedDocument, ChatError> {
        let snapshot = self.messages();
        let document = self.shared.exporter.export(snapshot.as_slice(), format)?;
        self.shared.emit(SessionEvent::ConversationExported {
            session_id: self.shared.id,
            format: format.name().to_string(),
            message_count: snapshot.len(),
            timestamp: Timestamp::now(),
        });
        Ok(document)
    }

    /// Like [`export`](Self::export), with the format given by name.
    pub fn export_named(&self, format: &str) -> Result<ExportedDocument, ChatError> {
        let format = format.parse::<ExportFormat>()?;
        self.export(format)
    }

    /// Snapshot of the conversation; later writes are not visible through it.
    pub fn messages(&self) -> Snapshot {
        self.shared
            .lock()
            .map(|s| s.store.all())
            .unwrap_or_default()
    }

    pub fn message(&self, id: &MessageId) -> Result<Message, ChatError> {
        self.shared.lock()?.store.get(id).cloned()
    }

    pub fn phase(&self) -> SessionPhase {
        self.shared
            .lock()
            .map(|s| s.phase)
            .unwrap_or(SessionPhase::Idle)
    }

    /// User messages waiting behind the outstanding request.
    pub fn queued_len(&self) -> usize {
        self.shared.lock().map(|s| s.queue.len()).unwrap_or(0)
    }

    pub fn is_typing(&self) -> bool {
        self.shared.typing.is_typing()
    }

    /// Receiver for typing indicator transitions.
    pub fn typing_watch(&self) -> watch::Receiver<bool> {
        self.shared.typing.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Ask the assistant backend whether it can answer.
    pub async fn health(&self) -> Result<(), BackendError> {
        self.shared.responder.health().await
    }

    // -------------------------------------------------------------------------
    // Voice switches
    // -------------------------------------------------------------------------

    pub fn set_tts(&self, enabled: bool) -> Result<(), ChatError> {
        let mut state = self.shared.lock()?;
        if state.closed {
            return Err(ChatError::SessionClosed);
        }
        if state.voice.set_tts(enabled) {
            self.shared.voice_toggled(VoiceControl::TextToSpeech, enabled);
        }
        Ok(())
    }

    pub fn set_recording(&self, recording: bool) -> Result<(), ChatError> {
        let mut state = self.shared.lock()?;
        if state.closed {
            return Err(ChatError::SessionClosed);
        }
        if recording {
            state.voice.start_recording()?;
        } else {
            state.voice.stop_recording()?;
        }
        self.shared.voice_toggled(VoiceControl::Recording, recording);
        Ok(())
    }

    pub fn voice(&self) -> VoiceState {
        self.shared.lock().map(|s| s.voice).unwrap_or_default()
    }
}

impl Drop for ConversationSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, SessionState>, ChatError> {
        self.state
            .lock()
            .map_err(|e| ChatError::State(format!("session lock poisoned: {}", e)))
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    fn message_appended(&self, state: &SessionState, id: MessageId) {
        if let Ok(message) = state.store.get(&id) {
            self.emit(SessionEvent::MessageAppended {
                session_id: self.id,
                message_id: id,
                sender: message.sender,
                timestamp: message.timestamp,
            });
        }
    }

    fn set_phase(&self, state: &mut SessionState, to: SessionPhase) {
        let from = state.phase;
        if from == to {
            return;
        }
        state.phase = to;
        tracing::debug!(session_id = %self.id, %from, %to, "Session phase changed");
        self.emit(SessionEvent::StateChanged {
            session_id: self.id,
            from,
            to,
            timestamp: Timestamp::now(),
        });
    }

    fn typing_started(&self) {
        if self.typing.request_started() {
            self.typing_changed(true);
        }
    }

    fn typing_settled(&self, still_outstanding: bool) {
        if self.typing.request_settled(still_outstanding) {
            self.typing_changed(false);
        }
    }

    fn typing_changed(&self, typing: bool) {
        self.emit(SessionEvent::TypingChanged {
            session_id: self.id,
            typing,
            timestamp: Timestamp::now(),
        });
    }

    fn voice_toggled(&self, control: VoiceControl, enabled: bool) {
        tracing::debug!(session_id = %self.id, ?control, enabled, "Voice switch toggled");
        self.emit(SessionEvent::VoiceToggled {
            session_id: self.id,
            control,
            enabled,
            timestamp: Timestamp::now(),
        });
    }

    fn seed_greeting(&self, state: &mut SessionState) {
        let Some(greeting) = self.config.greeting.as_deref() else {
            return;
        };
        match state
            .store
            .append(NewMessage::assistant(greeting, Vec::new(), ReplyMode::Wisdom))
        {
            Ok(id) => self.message_appended(state, id),
            Err(e) => tracing::warn!(session_id = %self.id, error = %e, "Failed to seed greeting"),
        }
    }

    /// Cancel the in-flight request and drop the queue. Returns how many
    /// requests were discarded.
    fn cancel_pending(&self, state: &mut SessionState) -> usize {
        let mut cancelled = Vec::with_capacity(state.queue.len() + 1);
        if let Some(pending) = state.in_flight.take() {
            pending.cancel.cancel();
            cancelled.push(pending.message_id);
        }
        cancelled.extend(state.queue.drain(..));
        for message_id in &cancelled {
            self.emit(SessionEvent::RequestCancelled {
                session_id: self.id,
                message_id: *message_id,
                timestamp: Timestamp::now(),
            });
        }
        cancelled.len()
    }

    /// Start the reply request for the next queued message, or go `Idle`
    /// when the queue is empty. Caller holds the lock and no request is in
    /// flight.
    fn dispatch_next(self: &Arc<Self>, state: &mut SessionState) {
        while let Some(message_id) = state.queue.pop_front() {
            let snapshot = state.store.all();
            let Some(message) = snapshot.get(&message_id).cloned() else {
                tracing::warn!(
                    session_id = %self.id,
                    message_id = %message_id,
                    "Queued message vanished"
                );
                continue;
            };
            // Everything already in the conversation except messages still
            // waiting for their own reply.
            let history: Vec<Message> = snapshot
                .iter()
                .filter(|m| m.id != message_id && !state.queue.contains(&m.id))
                .cloned()
                .collect();

            let cancel = self.root.child_token();
            state.in_flight = Some(PendingRequest {
                message_id,
                cancel: cancel.clone(),
            });
            self.set_phase(state, SessionPhase::AwaitingReply);
            self.typing_started();

            tracing::debug!(
                session_id = %self.id,
                message_id = %message_id,
                history = history.len(),
                "Reply requested"
            );
            let shared = Arc::clone(self);
            self.runtime.spawn(async move {
                let outcome = shared.responder.request(history, message, &cancel).await;
                shared.settle(message_id, &cancel, outcome);
            });
            return;
        }
        self.set_phase(state, SessionPhase::Idle);
    }

    /// Apply a finished request to the conversation.
    fn settle(
        self: &Arc<Self>,
        message_id: MessageId,
        cancel: &CancellationToken,
        outcome: RequestOutcome,
    ) {
        let result = match outcome {
            RequestOutcome::Replied { reply, mode } => Ok((reply, mode)),
            RequestOutcome::Failed { error, .. } => Err(error),
            // Only produced after the token fired; whoever cancelled it
            // already reported the request as cancelled.
            RequestOutcome::Cancelled => return,
        };

        let mut state = match self.lock() {
            Ok(state) => state,
            Err(e) => {
                tracing::error!(session_id = %self.id, error = %e, "Dropping reply");
                return;
            }
        };
        let current = state
            .in_flight
            .as_ref()
            .is_some_and(|p| p.message_id == message_id);
        if cancel.is_cancelled() || state.closed || !current {
            tracing::debug!(
                session_id = %self.id,
                message_id = %message_id,
                "Discarding cancelled reply"
            );
            return;
        }
        state.in_flight = None;

        let appended = match result {
            Ok((reply, mode)) => state
                .store
                .append(NewMessage::assistant(reply.text, reply.attachments, mode)),
            Err(error) => {
                self.emit(SessionEvent::ReplyFailed {
                    session_id: self.id,
                    message_id,
                    retryable: error.retryable,
                    reason: error.message.clone(),
                    timestamp: Timestamp::now(),
                });
                state.store.append(NewMessage::system(failure_message(&error)))
            }
        };
        match appended {
            Ok(id) => self.message_appended(&state, id),
            Err(e) => {
                tracing::warn!(session_id = %self.id, error = %e, "Failed to append reply")
            }
        }

        Self::dispatch_next(self, &mut state);
        self.typing_settled(state.in_flight.is_some());
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use ezra_core::error::{EzraError, Result as EzraResult};
    use ezra_core::ports::InMemoryNotesStore;
    use ezra_core::types::{NoteId, Sender};
    use tokio::sync::{mpsc, oneshot};

    use crate::responder::{AssistantBackend, Reply, ReplyRequest};

    type Call = (ReplyRequest, oneshot::Sender<Result<Reply, BackendError>>);

    /// Hands every request to the test, which answers it when it likes.
    struct ScriptedBackend {
        calls: mpsc::UnboundedSender<Call>,
    }

    #[async_trait]
    impl AssistantBackend for ScriptedBackend {
        async fn reply(&self, request: &ReplyRequest) -> Result<Reply, BackendError> {
            let (tx, rx) = oneshot::channel();
            self.calls
                .send((request.clone(), tx))
                .map_err(|_| BackendError::fatal("script closed"))?;
            rx.await
                .unwrap_or_else(|_| Err(BackendError::fatal("script dropped request")))
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    /// Every call fails with a retryable error.
    #[derive(Default)]
    struct RetryableOutage {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AssistantBackend for RetryableOutage {
        async fn reply(&self, _request: &ReplyRequest) -> Result<Reply, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::retryable("503 service unavailable"))
        }

        fn name(&self) -> &'static str {
            "outage"
        }
    }

    struct UnreachableNotesStore;

    impl NotesStore for UnreachableNotesStore {
        fn create_note(&self, _note: &WisdomNote) -> EzraResult<NoteId> {
            Err(EzraError::Unavailable("notes service down".into()))
        }

        fn note_for_message(&self, _id: &MessageId) -> EzraResult<Option<WisdomNote>> {
            Err(EzraError::Unavailable("notes service down".into()))
        }

        fn list_notes(&self) -> EzraResult<Vec<WisdomNote>> {
            Err(EzraError::Unavailable("notes service down".into()))
        }
    }

    /// Holds every `create_note` until the test releases it.
    struct GatedNotesStore {
        inner: InMemoryNotesStore,
        entered: std::sync::Mutex<std::sync::mpsc::Sender<()>>,
        release: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl NotesStore for GatedNotesStore {
        fn create_note(&self, note: &WisdomNote) -> EzraResult<NoteId> {
            let _ = self.entered.lock().unwrap().send(());
            let _ = self.release.lock().unwrap().recv();
            self.inner.create_note(note)
        }

        fn note_for_message(&self, id: &MessageId) -> EzraResult<Option<WisdomNote>> {
            self.inner.note_for_message(id)
        }

        fn list_notes(&self) -> EzraResult<Vec<WisdomNote>> {
            self.inner.list_notes()
        }
    }

    fn scripted_session_with(
        config: EzraConfig,
        notes: Arc<dyn NotesStore>,
    ) -> (ConversationSession, mpsc::UnboundedReceiver<Call>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let responder = AssistantResponder::new(Arc::new(ScriptedBackend { calls: tx }));
        let session = ConversationSession::new(&config, responder, notes).unwrap();
        (session, rx)
    }

    fn scripted_session() -> (ConversationSession, mpsc::UnboundedReceiver<Call>) {
        scripted_session_with(EzraConfig::default(), Arc::new(InMemoryNotesStore::new()))
    }

    async fn settle(session: &ConversationSession) {
        let mut typing = session.typing_watch();
        tokio::time::timeout(Duration::from_secs(5), typing.wait_for(|t| !*t))
            .await
            .expect("reply did not settle")
            .unwrap();
    }

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_hello_hi_there() {
        let (session, mut calls) = scripted_session();
        let mut events = session.subscribe();
        assert!(!session.is_typing());

        session.submit("Hello", vec![]).unwrap();
        assert_eq!(session.messages().len(), 1);
        assert!(session.is_typing());
        assert_eq!(session.phase(), SessionPhase::AwaitingReply);

        let (request, respond) = calls.recv().await.unwrap();
        assert_eq!(request.message.text, "Hello");
        assert!(request.history.is_empty());
        respond.send(Ok(Reply::text("Hi there"))).unwrap();
        settle(&session).await;

        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages.as_slice()[0].sender, Sender::User);
        assert_eq!(messages.as_slice()[1].sender, Sender::Assistant);
        assert_eq!(messages.as_slice()[1].text, "Hi there");
        assert_eq!(messages.as_slice()[1].mode, Some(ReplyMode::Wisdom));
        assert_eq!(session.phase(), SessionPhase::Idle);

        let typing: Vec<bool> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::TypingChanged { typing, .. } => Some(typing),
                _ => None,
            })
            .collect();
        assert_eq!(typing, vec![true, false]);
    }

    #[tokio::test]
    async fn test_rapid_submissions_are_answered_in_order() {
        let (session, mut calls) = scripted_session();
        let a = session.submit("first", vec![]).unwrap();
        let b = session.submit("second", vec![]).unwrap();
        let c = session.submit("third", vec![]).unwrap();
        assert_eq!(session.queued_len(), 2);
        assert_eq!(session.messages().len(), 3);

        for (expected, reply) in [(a, "one"), (b, "two"), (c, "three")] {
            let (request, respond) = calls.recv().await.unwrap();
            assert_eq!(request.message.id, expected);
            // Still-queued messages are not part of the history
            assert!(request.history.iter().all(|m| m.id < expected || m.sender != Sender::User));
            assert!(session.is_typing());
            respond.send(Ok(Reply::text(reply))).unwrap();
        }
        settle(&session).await;

        let replies: Vec<String> = session
            .messages()
            .iter()
            .filter(|m| m.sender == Sender::Assistant)
            .map(|m| m.text.clone())
            .collect();
        assert_eq!(replies, vec!["one", "two", "three"]);
        assert_eq!(session.messages().len(), 6);
        assert_eq!(session.queued_len(), 0);
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_failure_becomes_system_message() {
        let (session, mut calls) = scripted_session();
        let mut events = session.subscribe();
        session.submit("Hello", vec![]).unwrap();

        let (_, respond) = calls.recv().await.unwrap();
        respond
            .send(Err(BackendError::fatal("model not found")))
            .unwrap();
        settle(&session).await;

        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        let last = &messages.as_slice()[1];
        assert_eq!(last.sender, Sender::System);
        assert!(last.text.contains("model not found"));
        assert!(drain(&mut events)
            .iter()
            .any(|e| matches!(e, SessionEvent::ReplyFailed { retryable: false, .. })));
    }

    #[tokio::test]
    async fn test_reset_during_request_prevents_later_mutation() {
        let (session, mut calls) = scripted_session();
        session.submit("Hello", vec![]).unwrap();
        session.submit("Queued", vec![]).unwrap();
        let (_, respond) = calls.recv().await.unwrap();

        session.reset().unwrap();
        assert!(session.messages().is_empty());
        assert!(!session.is_typing());
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert_eq!(session.queued_len(), 0);

        // The late answer has nowhere to go.
        let _ = respond.send(Ok(Reply::text("too late")));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(session.messages().is_empty());
        assert!(calls.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_during_retry_backoff_stops_retries() {
        let backend = Arc::new(RetryableOutage::default());
        let responder = AssistantResponder::new(backend.clone())
            .with_retry(5, Duration::from_millis(200));
        let session = ConversationSession::new(
            &EzraConfig::default(),
            responder,
            Arc::new(InMemoryNotesStore::new()),
        )
        .unwrap();
        let mut events = session.subscribe();

        session.submit("Hello", vec![]).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(session.is_typing());

        session.reset().unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(session.messages().is_empty());
        assert!(!session.is_typing());
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(!drain(&mut events)
            .iter()
            .any(|e| matches!(e, SessionEvent::ReplyFailed { .. })));
    }

    #[tokio::test]
    async fn test_reset_reseeds_greeting() {
        let mut config = EzraConfig::default();
        config.session.greeting = Some("Hello! I'm Ezra.".into());
        let (session, _calls) =
            scripted_session_with(config, Arc::new(InMemoryNotesStore::new()));
        assert_eq!(session.messages().len(), 1);

        session.submit("Hi", vec![]).unwrap();
        session.reset().unwrap();
        let messages = session.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages.as_slice()[0].sender, Sender::Assistant);
        assert_eq!(messages.as_slice()[0].text, "Hello! I'm Ezra.");
    }

    #[tokio::test]
    async fn test_empty_submission_rejected() {
        let (session, mut calls) = scripted_session();
        let err = session.submit("   \n", vec![]).unwrap_err();
        assert!(matches!(
            err,
            ChatError::Validation(ValidationError::EmptySubmission)
        ));
        assert!(session.messages().is_empty());
        assert!(!session.is_typing());
        assert!(calls.try_recv().is_err());

        // Attachments alone are a valid submission
        session
            .submit("", vec![Attachment::new("photo.png", 10)])
            .unwrap();
        assert_eq!(session.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_too_long_submission_rejected() {
        let mut config = EzraConfig::default();
        config.session.max_message_chars = 5;
        let (session, _calls) =
            scripted_session_with(config, Arc::new(InMemoryNotesStore::new()));
        let err = session.submit("123456", vec![]).unwrap_err();
        assert!(matches!(
            err,
            ChatError::Validation(ValidationError::MessageTooLong(5))
        ));
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn test_double_capture_returns_same_note() {
        let notes = Arc::new(InMemoryNotesStore::new());
        let (session, mut calls) = scripted_session_with(EzraConfig::default(), notes.clone());
        let mut events = session.subscribe();
        session.submit("What is patience?", vec![]).unwrap();
        let (_, respond) = calls.recv().await.unwrap();
        respond
            .send(Ok(Reply::text("Attention, sustained.")))
            .unwrap();
        settle(&session).await;

        let reply_id = session.messages().as_slice()[1].id;
        let first = session.capture(&reply_id, &CaptureOptions::default()).unwrap();
        let second = session.capture(&reply_id, &CaptureOptions::default()).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(notes.len(), 1);
        assert!(session.message(&reply_id).unwrap().wisdom_captured);

        let captured = drain(&mut events)
            .iter()
            .filter(|e| matches!(e, SessionEvent::WisdomCaptured { .. }))
            .count();
        assert_eq!(captured, 1);
    }

    #[tokio::test]
    async fn test_capture_with_unreachable_store_is_retryable() {
        let (session, _calls) =
            scripted_session_with(EzraConfig::default(), Arc::new(UnreachableNotesStore));
        let id = session.submit("Keep this", vec![]).unwrap();
        let err = session.capture(&id, &CaptureOptions::default()).unwrap_err();
        assert!(matches!(err, ChatError::Capture(_)));
        assert!(!session.message(&id).unwrap().wisdom_captured);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_capture_leaves_session_responsive_during_notes_write() {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let notes = Arc::new(GatedNotesStore {
            inner: InMemoryNotesStore::new(),
            entered: std::sync::Mutex::new(entered_tx),
            release: std::sync::Mutex::new(release_rx),
        });
        let (session, _calls) = scripted_session_with(EzraConfig::default(), notes.clone());
        let session = Arc::new(session);
        let id = session.submit("Keep this", vec![]).unwrap();

        let capture = {
            let session = session.clone();
            tokio::task::spawn_blocking(move || session.capture(&id, &CaptureOptions::default()))
        };
        tokio::task::spawn_blocking(move || entered_rx.recv_timeout(Duration::from_secs(5)))
            .await
            .unwrap()
            .expect("capture never reached the notes store");

        // The write is parked inside the store; readers must not wait on it.
        let reader = {
            let session = session.clone();
            tokio::task::spawn_blocking(move || (session.messages().len(), session.phase()))
        };
        let (len, phase) = tokio::time::timeout(Duration::from_secs(5), reader)
            .await
            .expect("session stayed locked during the notes write")
            .unwrap();
        assert_eq!(len, 1);
        assert_eq!(phase, SessionPhase::AwaitingReply);
        assert!(!session.message(&id).unwrap().wisdom_captured);

        release_tx.send(()).unwrap();
        let note = capture.await.unwrap().unwrap();
        assert_eq!(note.source_message_id, id);
        assert!(session.message(&id).unwrap().wisdom_captured);
        assert_eq!(notes.inner.len(), 1);
    }

    #[tokio::test]
    async fn test_wisdom_notes_listed_by_category() {
        let (session, _calls) = scripted_session();
        let first = session.submit("Patience is attention", vec![]).unwrap();
        let second = session.submit("Courage is practice", vec![]).unwrap();
        session
            .capture(&first, &CaptureOptions::with_category("Book"))
            .unwrap();
        session
            .capture(&second, &CaptureOptions::default())
            .unwrap();

        assert_eq!(session.wisdom_notes(None).unwrap().len(), 2);
        let book = session.wisdom_notes(Some("Book")).unwrap();
        assert_eq!(book.len(), 1);
        assert_eq!(book[0].source_message_id, first);
        assert!(session.wisdom_notes(Some("Missing")).unwrap().is_empty());
        assert_eq!(
            session.wisdom_categories().unwrap(),
            vec!["Book".to_string(), "General".to_string()]
        );
    }

    #[tokio::test]
    async fn test_wisdom_listing_with_unreachable_store_fails() {
        let (session, _calls) =
            scripted_session_with(EzraConfig::default(), Arc::new(UnreachableNotesStore));
        assert!(matches!(
            session.wisdom_notes(None),
            Err(ChatError::Capture(CaptureError::NotesStoreUnavailable(_)))
        ));
        assert!(session.wisdom_categories().is_err());
    }

    #[tokio::test]
    async fn test_export_is_stable_modulo_header() {
        let (session, mut calls) = scripted_session();
        session
            .submit("Hello", vec![Attachment::new("notes.pdf", 2048)])
            .unwrap();
        let (_, respond) = calls.recv().await.unwrap();
        respond.send(Ok(Reply::text("Hi there"))).unwrap();
        settle(&session).await;

        let a = session.export(ExportFormat::Markdown).unwrap();
        let b = session.export_named("md").unwrap();
        assert_eq!(a.body, b.body);
        let body = String::from_utf8(a.body).unwrap();
        assert!(body.contains("**You**"));
        assert!(body.contains("[attachment: notes.pdf (2.0 KB, document)]"));
        assert!(body.find("Hello").unwrap() < body.find("Hi there").unwrap());

        assert!(matches!(
            session.export_named("docx"),
            Err(ChatError::Export(_))
        ));
    }

    #[tokio::test]
    async fn test_close_cancels_and_rejects_further_work() {
        let (session, mut calls) = scripted_session();
        let mut events = session.subscribe();
        session.submit("Hello", vec![]).unwrap();
        let (_, respond) = calls.recv().await.unwrap();

        session.close();
        session.close();
        assert!(session.is_closed());
        assert!(!session.is_typing());
        assert!(matches!(
            session.submit("again", vec![]),
            Err(ChatError::SessionClosed)
        ));
        assert!(matches!(session.reset(), Err(ChatError::SessionClosed)));

        let _ = respond.send(Ok(Reply::text("late")));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session.messages().len(), 1);

        let closed = drain(&mut events)
            .iter()
            .filter(|e| matches!(e, SessionEvent::SessionClosed { .. }))
            .count();
        assert_eq!(closed, 1);
    }

    #[tokio::test]
    async fn test_voice_toggles_publish_events() {
        let (session, _calls) = scripted_session();
        let mut events = session.subscribe();

        session.set_tts(true).unwrap();
        session.set_tts(true).unwrap();
        session.set_recording(true).unwrap();
        assert!(session.set_recording(true).is_err());
        session.set_recording(false).unwrap();
        assert!(session.voice().tts_enabled);

        let toggles: Vec<(VoiceControl, bool)> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::VoiceToggled {
                    control, enabled, ..
                } => Some((control, enabled)),
                _ => None,
            })
            .collect();
        assert_eq!(
            toggles,
            vec![
                (VoiceControl::TextToSpeech, true),
                (VoiceControl::Recording, true),
                (VoiceControl::Recording, false),
            ]
        );
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let responder = AssistantResponder::new(Arc::new(crate::responder::SimulatedBackend::new(
            Duration::from_millis(1),
        )));
        let result = ConversationSession::new(
            &EzraConfig::default(),
            responder,
            Arc::new(InMemoryNotesStore::new()),
        );
        assert!(matches!(result, Err(ChatError::Runtime(_))));
    }
}
