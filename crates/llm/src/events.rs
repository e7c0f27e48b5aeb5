//! Lifecycle events of one dispatched request and their wire format.

use serde_json::{Value, json};

/// Whether provider output is deliberation or part of the final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FragmentKind {
    Reasoning,
    Answer,
}

/// A piece of provider output delivered incrementally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Fragment {
    pub(crate) kind: FragmentKind,
    pub(crate) text: String,
}

impl Fragment {
    pub(crate) fn answer(text: impl Into<String>) -> Self {
        Self {
            kind: FragmentKind::Answer,
            text: text.into(),
        }
    }

    pub(crate) fn reasoning(text: impl Into<String>) -> Self {
        Self {
            kind: FragmentKind::Reasoning,
            text: text.into(),
        }
    }
}

/// An ordered unit of information relayed to the client.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StreamEvent {
    /// A new conversation was created for this chat turn.
    ConversationId(String),
    Status(String),
    /// Seconds left before the next retry.
    Countdown(u64),
    Fragment(Fragment),
    /// The validated payload.
    Final(Value),
    /// User-safe failure message.
    Error(String),
    Done,
}

/// The endpoint an event stream belongs to. Chat and extraction clients
/// expect different field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Channel {
    Chat,
    Extraction,
}

const DONE: &str = "[DONE]";

impl StreamEvent {
    /// The `data:` line for this event, or `None` when the channel does not
    /// relay it.
    ///
    /// Extraction answers are partial JSON, so they reach the client only
    /// through the final payload.
    pub(crate) fn to_wire(&self, channel: Channel) -> Option<String> {
        let value = match (self, channel) {
            (Self::Done, _) => return Some(DONE.to_string()),
            (Self::ConversationId(id), Channel::Chat) => json!({ "conversationId": id }),
            (Self::ConversationId(_), Channel::Extraction) => return None,
            (Self::Status(text), _) => json!({ "status": text }),
            (Self::Countdown(seconds), _) => json!({ "countdown": seconds }),
            (Self::Fragment(fragment), _) => match (fragment.kind, channel) {
                (FragmentKind::Reasoning, _) => json!({ "thinking": fragment.text }),
                (FragmentKind::Answer, Channel::Chat) => json!({ "chunk": fragment.text }),
                (FragmentKind::Answer, Channel::Extraction) => return None,
            },
            (Self::Final(payload), Channel::Chat) => json!({ "structured": payload }),
            (Self::Final(payload), Channel::Extraction) => json!({ "final": payload }),
            (Self::Error(message), _) => json!({ "error": message }),
        };

        Some(value.to_string())
    }
}
