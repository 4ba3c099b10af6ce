use softhouse_types::{Message, MessageId, Role};

/// Ordered, append-only record of one connection's messages.
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
    last_id: u64,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) -> &Message {
        self.last_id += 1;
        self.messages
            .push(Message::new(MessageId(self.last_id), role, content));
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop every entry and restart id allocation.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.last_id = 0;
    }
}
