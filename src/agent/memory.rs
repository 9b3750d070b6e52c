use std::collections::VecDeque;

use crate::models::ChatMessage;

pub const MAX_HISTORY: usize = 20;

/// Completed turns only: each turn is one Human message followed by the AI
/// answer. Oldest turns go first once the bound is exceeded.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    messages: VecDeque<ChatMessage>,
    limit: usize,
}

impl Default for ConversationMemory {
    fn default() -> Self { Self::with_limit(MAX_HISTORY) }
}

impl ConversationMemory {
    /// `limit` counts messages and is rounded down to whole turns (min one turn).
    pub fn with_limit(limit: usize) -> Self {
        let limit = (limit - limit % 2).max(2);
        Self { messages: VecDeque::with_capacity(limit + 2), limit }
    }

    pub fn append_turn(&mut self, human: impl Into<String>, ai: impl Into<String>) {
        self.messages.push_back(ChatMessage::human(human));
        self.messages.push_back(ChatMessage::ai(ai));
        while self.messages.len() > self.limit {
            self.messages.pop_front();
            self.messages.pop_front();
        }
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> { self.messages.iter().cloned().collect() }

    pub fn len(&self) -> usize { self.messages.len() }

    #[cfg(test)]
    pub fn limit(&self) -> usize { self.limit }
}
