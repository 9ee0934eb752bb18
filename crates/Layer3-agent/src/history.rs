//! Message history management

use pilot_provider::{Message, MessageRole};

/// Conversation sent to the model on every step
#[derive(Debug, Clone, Default)]
pub struct MessageHistory {
    /// Messages in order
    messages: Vec<Message>,

    /// Most recent messages kept; the first message (the task) is always kept
    max_messages: Option<usize>,
}

impl MessageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(max_messages: usize) -> Self {
        Self {
            messages: vec![],
            max_messages: Some(max_messages.max(2)),
        }
    }

    /// Add a user message
    pub fn add_user(&mut self, content: impl Into<String>) {
        self.push(Message::user(content));
    }

    /// Add an assistant message
    pub fn add_assistant(&mut self, content: impl Into<String>) {
        self.push(Message::assistant(content));
    }

    fn push(&mut self, message: Message) {
        self.messages.push(message);

        if let Some(limit) = self.max_messages {
            if self.messages.len() > limit {
                let excess = self.messages.len() - limit;
                self.messages.drain(1..=excess);
            }
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn to_messages(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Get the last user message
    pub fn last_user(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
    }
}
