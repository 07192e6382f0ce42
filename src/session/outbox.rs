//! Message hand-off from the listen loop to the polling endpoint

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc;

/// Which pane of the control page a message belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxChannel {
    Assistant,
    Error,
}

/// A `(channel, text)` pair, serialized as a two-element array
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboxMessage(pub OutboxChannel, pub String);

impl OutboxMessage {
    pub fn assistant(text: impl Into<String>) -> Self {
        Self(OutboxChannel::Assistant, text.into())
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self(OutboxChannel::Error, text.into())
    }

    #[must_use]
    pub const fn channel(&self) -> OutboxChannel {
        self.0
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.1
    }
}

/// Unbounded FIFO; each message is handed out by exactly one `drain`
#[derive(Debug)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<OutboxMessage>,
    rx: Mutex<mpsc::UnboundedReceiver<OutboxMessage>>,
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Outbox {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    pub fn push(&self, message: OutboxMessage) {
        tracing::debug!(channel = ?message.channel(), text = message.text(), "queued message");
        // The receiver lives as long as `self`
        let _ = self.tx.send(message);
    }

    /// Take every pending message in insertion order
    #[must_use]
    pub fn drain(&self) -> Vec<OutboxMessage> {
        let mut rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner);
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }
}
