//! Structured results of the chat and extraction endpoints.

mod chat;
mod extraction;

pub(crate) use chat::ChatResult;
pub(crate) use extraction::ExtractionResult;

/// Upper bound for the short lists in a chat answer.
const MAX_LIST_ITEMS: usize = 5;
