//! Bounded conversation history

use std::collections::VecDeque;

use crate::chat::ChatMessage;

/// System preamble plus the most recent turn messages
#[derive(Debug, Clone)]
pub struct Conversation {
    system: ChatMessage,
    turns: VecDeque<ChatMessage>,
    max_turns: usize,
}

impl Conversation {
    /// Create a history holding at most `max_turns` messages besides the preamble
    pub fn new(system_prompt: impl Into<String>, max_turns: usize) -> Self {
        Self {
            system: ChatMessage::system(system_prompt),
            turns: VecDeque::with_capacity(max_turns + 1),
            max_turns,
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(ChatMessage::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(ChatMessage::assistant(content));
    }

    fn push(&mut self, message: ChatMessage) {
        self.turns.push_back(message);
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    /// All messages for a completion request, preamble first
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        std::iter::once(self.system.clone())
            .chain(self.turns.iter().cloned())
            .collect()
    }

    /// Message count including the preamble
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len() + 1
    }

    /// Never true: the preamble is always present
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }
}
