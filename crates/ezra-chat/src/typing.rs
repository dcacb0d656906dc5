//! Typing indicator: true exactly while a reply request is outstanding.

use tokio::sync::watch;

/// Publishes whether a reply request is outstanding.
///
/// The session starts the next queued request before settling the previous
/// one, so draining a queue never flickers the indicator off and on.
#[derive(Debug)]
pub struct TypingIndicator {
    tx: watch::Sender<bool>,
}

impl TypingIndicator {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn is_typing(&self) -> bool {
        *self.tx.borrow()
    }

    /// Receiver that observes every transition.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Returns `true` when the indicator switched on.
    pub fn request_started(&self) -> bool {
        self.publish(true)
    }

    /// A request resolved, failed or was cancelled. `still_outstanding` is
    /// whether another request is already in flight.
    ///
    /// Returns `true` when the indicator switched off.
    pub fn request_settled(&self, still_outstanding: bool) -> bool {
        self.publish(still_outstanding)
    }

    fn publish(&self, typing: bool) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == typing {
                false
            } else {
                *current = typing;
                true
            }
        })
    }
}

impl Default for TypingIndicator {
    fn default() -> Self {
        Self::new()
    }
}
