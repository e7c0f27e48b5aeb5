//! Accumulates streamed fragments and reduces the answer to a payload.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::events::{Fragment, FragmentKind};

/// A structured result the provider is asked to produce.
pub(crate) trait Payload: DeserializeOwned + Send + 'static {
    /// Instructions sent as the provider's system prompt.
    fn system_instruction() -> &'static str;

    /// Schema the provider's JSON output is constrained to.
    fn response_schema() -> Value;

    /// Checks constraints that deserialization alone cannot express.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// Adjusts the relayed value after validation.
    fn normalize(_value: &mut Value) {}
}

/// Failure to turn the answer buffer into a payload.
#[derive(Debug, Error)]
pub(crate) enum ParseError {
    #[error("the answer is empty")]
    Empty,

    #[error("the answer is not valid JSON: {0}")]
    Json(serde_json::Error),

    #[error("the answer does not match the expected schema: {0}")]
    Schema(String),
}

/// A validated payload together with the value relayed to the client.
#[derive(Debug)]
pub(crate) struct Assembled<P> {
    pub(crate) payload: P,
    pub(crate) value: Value,
}

/// Keeps reasoning and answer text of one attempt apart.
#[derive(Debug, Default)]
pub(crate) struct ResponseAssembler {
    reasoning: String,
    answer: String,
}

impl ResponseAssembler {
    pub(crate) fn push(&mut self, fragment: &Fragment) {
        match fragment.kind {
            FragmentKind::Reasoning => self.reasoning.push_str(&fragment.text),
            FragmentKind::Answer => self.answer.push_str(&fragment.text),
        }
    }

    /// Forgets everything pushed by a previous attempt.
    pub(crate) fn reset(&mut self) {
        self.reasoning.clear();
        self.answer.clear();
    }

    pub(crate) fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// Parses the answer buffer. Reasoning never takes part.
    pub(crate) fn finalize<P: Payload>(&self) -> Result<Assembled<P>, ParseError> {
        let text = strip_code_fence(&self.answer);

        if text.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut value: Value = serde_json::from_str(text).map_err(ParseError::Json)?;
        let payload: P = serde_json::from_value(value.clone()).map_err(|e| ParseError::Schema(e.to_string()))?;

        payload.validate().map_err(ParseError::Schema)?;
        P::normalize(&mut value);

        Ok(Assembled { payload, value })
    }
}

/// Unwraps a Markdown code fence around the answer, if present.
fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();

    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };

    let Some(body) = rest.strip_suffix("```") else {
        return text;
    };

    // Drop the info string, e.g. "json".
    let body = match body.split_once('\n') {
        Some((info, body)) if info.trim().chars().all(|c| c.is_ascii_alphanumeric()) => body,
        _ => body,
    };

    body.trim()
}
