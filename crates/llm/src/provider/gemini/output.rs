use serde::Deserialize;

use crate::{error::ProviderError, events::Fragment};

/// One `data:` payload of the Gemini event stream.
#[derive(Debug, Deserialize)]
pub(super) struct GeminiStreamChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiCandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: Option<String>,
    /// Set on parts that carry the model's reasoning summary.
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl GeminiStreamChunk {
    /// The fragments of the chunk in order, or the error it carries.
    pub(super) fn into_fragments(self) -> Result<Vec<Fragment>, ProviderError> {
        if let Some(error) = self.error {
            return Err(ProviderError::from_stream_status(error.status.as_deref(), error.message));
        }

        let mut fragments = Vec::new();

        for candidate in self.candidates.into_iter().take(1) {
            if let Some(reason) = candidate.finish_reason.as_deref()
                && !matches!(reason, "STOP" | "MAX_TOKENS" | "FINISH_REASON_UNSPECIFIED")
            {
                log::warn!("Gemini finished the candidate early: {reason}");
            }

            let parts = candidate.content.map(|content| content.parts).unwrap_or_default();

            for part in parts {
                let Some(text) = part.text.filter(|text| !text.is_empty()) else {
                    continue;
                };

                fragments.push(if part.thought {
                    Fragment::reasoning(text)
                } else {
                    Fragment::answer(text)
                });
            }
        }

        Ok(fragments)
    }
}

#[cfg(test)]
mod tests {
    use super::GeminiStreamChunk;
    use crate::{error::ProviderError, events::Fragment};

    fn parse(data: &str) -> Result<Vec<Fragment>, ProviderError> {
        sonic_rs::from_str::<GeminiStreamChunk>(data).unwrap().into_fragments()
    }

    #[test]
    fn parts_are_tagged_by_thought_flag() {
        let fragments = parse(
            r#"{"candidates": [{"content": {"role": "model", "parts": [
                {"text": "Comparing rates", "thought": true},
                {"text": "{\"answer\": "}
            ]}}], "modelVersion": "gemini-2.5-flash"}"#,
        )
        .unwrap();

        assert_eq!(
            fragments,
            vec![Fragment::reasoning("Comparing rates"), Fragment::answer("{\"answer\": ")]
        );
    }

    #[test]
    fn usage_only_chunk_has_no_fragments() {
        let fragments = parse(r#"{"usageMetadata": {"promptTokenCount": 10}}"#).unwrap();
        assert!(fragments.is_empty());
    }

    #[test]
    fn in_stream_error_is_classified() {
        let error = parse(r#"{"error": {"code": 503, "message": "The model is overloaded.", "status": "UNAVAILABLE"}}"#)
            .unwrap_err();

        assert_eq!(error, ProviderError::Unavailable("The model is overloaded.".to_string()));
    }
}
