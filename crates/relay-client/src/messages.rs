//! Local message sequence shared by the chat client and the subscriber.

use std::time::Duration;

use chrono::{TimeDelta, Utc};
use parking_lot::Mutex;
use relay_core::{Message, SenderType};
use tokio::sync::broadcast;

/// Capacity of the new-message notification channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Append-only, insertion-ordered chat messages.
///
/// A message whose text and sender match one appended less than
/// `duplicate_window` ago is dropped. Appended messages are also pushed to
/// every [`subscribe`](Self::subscribe) receiver.
pub struct MessageLog {
    messages: Mutex<Vec<Message>>,
    events: broadcast::Sender<Message>,
    duplicate_window: TimeDelta,
}

impl MessageLog {
    /// Create an empty log.
    pub fn new(duplicate_window: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            messages: Mutex::new(Vec::new()),
            events,
            duplicate_window: TimeDelta::from_std(duplicate_window).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Append a message. Returns `false` if it was suppressed as a duplicate.
    pub fn push(&self, message: Message) -> bool {
        {
            let mut messages = self.messages.lock();
            let now = Utc::now();
            let duplicate = messages.iter().rev().any(|m| {
                m.text == message.text
                    && m.sender == message.sender
                    && now.signed_duration_since(m.timestamp) < self.duplicate_window
            });
            if duplicate {
                tracing::debug!(sender = ?message.sender, "duplicate message suppressed");
                return false;
            }
            messages.push(message.clone());
        }
        let _ = self.events.send(message);
        true
    }

    /// Append a system notice.
    pub fn notice(&self, text: impl Into<String>) -> bool {
        self.push(Message::system(text))
    }

    /// Receive every message appended from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.events.subscribe()
    }

    /// Copy of the sequence, oldest first.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// Messages from one sender, oldest first.
    pub fn by_sender(&self, sender: SenderType) -> Vec<Message> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.sender == sender)
            .cloned()
            .collect()
    }

    /// Number of messages held.
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
