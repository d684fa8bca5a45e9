use crate::models::chat::{ ChatMessage, Role };
use log::warn;
use std::collections::VecDeque;

pub const MAX_MESSAGES: usize = 50;
pub const DEFAULT_GREETING: &str =
    "Hi! I'm the Headstarter support assistant. How can I help you today?";

/// Ordered message list capped at `capacity`; the oldest messages fall off first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    messages: VecDeque<ChatMessage>,
    capacity: usize,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(MAX_MESSAGES)
    }
}

impl Conversation {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { messages: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn with_greeting(capacity: usize, greeting: impl Into<String>) -> Self {
        let mut conversation = Self::new(capacity);
        conversation.push(ChatMessage::assistant(greeting));
        conversation
    }

    /// Appends `message`. System messages belong to the relay and are not stored.
    pub fn push(&mut self, message: ChatMessage) -> bool {
        if message.role == Role::System {
            warn!("Dropping system message, the relay owns system instructions");
            return false;
        }
        self.messages.push_back(message);
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
        true
    }

    /// Extends the trailing assistant message. Returns false if the tail is not an assistant message.
    pub fn append_to_last(&mut self, text: &str) -> bool {
        match self.messages.back_mut() {
            Some(last) if last.role == Role::Assistant => {
                last.content.push_str(text);
                true
            }
            _ => false,
        }
    }

    /// Snapshot of the messages, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.back()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
