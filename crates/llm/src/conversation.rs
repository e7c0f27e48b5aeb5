//! Conversation history of the chat endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use config::ConversationConfig;
use jiff::Timestamp;
use mini_moka::sync::Cache;

use crate::provider::{Content, Part, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MessageRole {
    User,
    Assistant,
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ConversationMessage {
    pub(crate) role: MessageRole,
    pub(crate) content: String,
    pub(crate) timestamp: Timestamp,
}

impl ConversationMessage {
    pub(crate) fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            timestamp: Timestamp::now(),
        }
    }

    pub(crate) fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            timestamp: Timestamp::now(),
        }
    }
}

impl From<&ConversationMessage> for Content {
    fn from(message: &ConversationMessage) -> Self {
        let role = match message.role {
            MessageRole::User => Role::User,
            MessageRole::Assistant => Role::Model,
        };

        Content {
            role,
            parts: vec![Part::Text(message.content.clone())],
        }
    }
}

/// Where conversation histories live between chat turns.
#[async_trait]
pub(crate) trait ConversationStore: Send + Sync {
    /// The stored history, or `None` for an unknown conversation.
    async fn load(&self, id: &str) -> Option<Vec<ConversationMessage>>;

    /// Replaces the history of the conversation.
    async fn save(&self, id: &str, messages: Vec<ConversationMessage>);
}

/// Histories held in process memory, evicted when idle or over capacity.
pub(crate) struct InMemoryConversationStore {
    cache: Cache<String, Arc<Vec<ConversationMessage>>>,
}

impl InMemoryConversationStore {
    pub(crate) fn new(config: &ConversationConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_conversations)
            .time_to_idle(config.idle_timeout)
            .build();

        Self { cache }
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn load(&self, id: &str) -> Option<Vec<ConversationMessage>> {
        self.cache.get(&id.to_string()).map(|messages| messages.as_ref().clone())
    }

    async fn save(&self, id: &str, messages: Vec<ConversationMessage>) {
        log::debug!("Saving conversation {id} with {} messages", messages.len());
        self.cache.insert(id.to_string(), Arc::new(messages));
    }
}

/// Keeps the `max` most recent messages.
pub(crate) fn trim_history(messages: &mut Vec<ConversationMessage>, max: usize) {
    if messages.len() > max {
        messages.drain(..messages.len() - max);
    }
}
