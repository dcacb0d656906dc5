//! Append-only message store owned by a conversation session.
//!
//! Messages live in a shared immutable vector. Taking a snapshot clones the
//! `Arc`; the next append copies the vector only while a snapshot is still
//! alive, so readers never observe later writes.

use std::sync::Arc;

use ezra_core::types::{Message, MessageId, NewMessage, Timestamp};

use crate::error::ChatError;

// =============================================================================
// Snapshot
// =============================================================================

/// Point-in-time view of a conversation.
///
/// Iteration is lazy and restartable: call [`Snapshot::iter`] as often as needed.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    messages: Arc<Vec<Message>>,
}

impl Snapshot {
    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        find(&self.messages, id).map(|idx| &self.messages[idx])
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// =============================================================================
// MessageStore
// =============================================================================

/// Ordered, append-only record of one conversation.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Arc<Vec<Message>>,
    /// Keeps counting across `clear` so ids are never reused within a session.
    next_seq: u64,
    closed: bool,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, assigning its id and timestamp.
    ///
    /// Fails only once the owning session has been torn down.
    pub fn append(&mut self, message: NewMessage) -> Result<MessageId, ChatError> {
        if self.closed {
            return Err(ChatError::SessionClosed);
        }
        let id = MessageId::new(self.next_seq);
        self.next_seq += 1;
        Arc::make_mut(&mut self.messages).push(Message {
            id,
            text: message.text,
            sender: message.sender,
            timestamp: Timestamp::now(),
            attachments: message.attachments,
            wisdom_captured: false,
            mode: message.mode,
        });
        Ok(id)
    }

    /// Snapshot of all messages in insertion order.
    pub fn all(&self) -> Snapshot {
        Snapshot {
            messages: Arc::clone(&self.messages),
        }
    }

    pub fn get(&self, id: &MessageId) -> Result<&Message, ChatError> {
        find(&self.messages, id)
            .map(|idx| &self.messages[idx])
            .ok_or(ChatError::MessageNotFound(*id))
    }

    /// Flag a message as captured into Wisdom. The only in-place update the store allows.
    pub fn mark_captured(&mut self, id: &MessageId) -> Result<(), ChatError> {
        if self.closed {
            return Err(ChatError::SessionClosed);
        }
        let idx = find(&self.messages, id).ok_or(ChatError::MessageNotFound(*id))?;
        Arc::make_mut(&mut self.messages)[idx].wisdom_captured = true;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Drop every message at once. Used by session reset.
    pub fn clear(&mut self) {
        self.messages = Arc::new(Vec::new());
    }

    /// Refuse further appends.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Binary search by sequence number, then confirm the full id.
fn find(messages: &[Message], id: &MessageId) -> Option<usize> {
    messages
        .binary_search_by_key(&id.seq, |m| m.id.seq)
        .ok()
        .filter(|&idx| messages[idx].id == *id)
}

// =============================================================================
// Tests
// =============================================================================
