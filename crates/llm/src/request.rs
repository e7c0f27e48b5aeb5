//! Inbound request bodies of the streaming endpoints.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Deserialize;
use serde_json::Value;

use crate::error::LlmError;

/// Document types the provider can read.
const SUPPORTED_MIME_TYPES: &[&str] = &["application/pdf", "image/png", "image/jpeg", "image/webp", "image/heic"];

/// A conversational turn.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChatRequest {
    /// Continues an existing conversation. A new one is created when absent.
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub message: String,
    /// Financial data the answer may refer to.
    #[serde(default)]
    pub context: Option<Value>,
    /// Names the kind of `context`, e.g. `debts`.
    #[serde(default)]
    pub context_key: Option<String>,
    #[serde(default)]
    pub chosen_model: Option<String>,
}

impl ChatRequest {
    pub(crate) fn validate(&self) -> crate::Result<()> {
        if self.message.trim().is_empty() {
            return Err(LlmError::InvalidRequest("message must not be empty".to_string()));
        }

        let has_context = self.context.as_ref().is_some_and(|context| !context.is_null());

        if self.context_key.is_some() && !has_context {
            return Err(LlmError::InvalidRequest(
                "contextKey was given without context".to_string(),
            ));
        }

        Ok(())
    }

    /// The conversation to continue, ignoring blank ids.
    pub(crate) fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }
}

/// A document to extract a loan schedule from.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExtractRequest {
    /// Base64 content, optionally as a `data:` URL.
    pub encoded_document: String,
    pub mime_type: String,
    #[serde(default)]
    pub chosen_model: Option<String>,
}

/// A validated document, ready to be sent inline.
#[derive(Debug, PartialEq)]
pub(crate) struct Document {
    pub mime_type: String,
    /// Standard base64 without whitespace.
    pub data: String,
}

impl ExtractRequest {
    /// Checks type, encoding and size of the document.
    pub(crate) fn into_document(self, max_bytes: usize) -> crate::Result<Document> {
        let mime_type = self.mime_type.trim().to_ascii_lowercase();

        if !SUPPORTED_MIME_TYPES.contains(&mime_type.as_str()) {
            return Err(LlmError::InvalidRequest(format!(
                "unsupported mimeType '{mime_type}', expected one of {}",
                SUPPORTED_MIME_TYPES.join(", ")
            )));
        }

        let encoded = match self.encoded_document.split_once(";base64,") {
            Some((prefix, data)) if prefix.starts_with("data:") => data,
            _ => self.encoded_document.as_str(),
        };

        let data: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();

        if data.is_empty() {
            return Err(LlmError::InvalidRequest("encodedDocument must not be empty".to_string()));
        }

        let decoded = STANDARD
            .decode(&data)
            .map_err(|_| LlmError::InvalidRequest("encodedDocument is not valid base64".to_string()))?;

        if decoded.is_empty() {
            return Err(LlmError::InvalidRequest("encodedDocument must not be empty".to_string()));
        }

        if decoded.len() > max_bytes {
            return Err(LlmError::InvalidRequest(format!(
                "document is {} bytes, the limit is {max_bytes} bytes",
                decoded.len()
            )));
        }

        Ok(Document { mime_type, data })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ChatRequest, Document, ExtractRequest};

    fn chat(body: serde_json::Value) -> ChatRequest {
        serde_json::from_value(body).unwrap()
    }

    fn extract(document: &str, mime_type: &str) -> ExtractRequest {
        ExtractRequest {
            encoded_document: document.to_string(),
            mime_type: mime_type.to_string(),
            chosen_model: None,
        }
    }

    #[test]
    fn chat_request_fields() {
        let request = chat(json!({
            "conversationId": "c-1",
            "message": "Which debt first?",
            "context": { "debts": [] },
            "contextKey": "debts",
            "chosenModel": "flash"
        }));

        assert!(request.validate().is_ok());
        assert_eq!(request.conversation_id(), Some("c-1"));
        assert_eq!(request.chosen_model.as_deref(), Some("flash"));
    }

    #[test]
    fn blank_message_is_rejected() {
        let error = chat(json!({ "message": "  " })).validate().unwrap_err();
        insta::assert_snapshot!(error, @"Invalid request: message must not be empty");
    }

    #[test]
    fn context_key_requires_context() {
        let error = chat(json!({ "message": "hi", "contextKey": "debts", "context": null }))
            .validate()
            .unwrap_err();

        insta::assert_snapshot!(error, @"Invalid request: contextKey was given without context");
    }

    #[test]
    fn blank_conversation_id_starts_a_new_conversation() {
        let request = chat(json!({ "message": "hi", "conversationId": " " }));
        assert_eq!(request.conversation_id(), None);
    }

    #[test]
    fn document_accepts_data_urls() {
        let document = extract("data:application/pdf;base64,JVBE\nRi0x", "Application/PDF")
            .into_document(1024)
            .unwrap();

        assert_eq!(
            document,
            Document {
                mime_type: "application/pdf".to_string(),
                data: "JVBERi0x".to_string(),
            }
        );
    }

    #[test]
    fn document_validation() {
        let error = extract("JVBERi0x", "text/plain").into_document(1024).unwrap_err();
        insta::assert_snapshot!(error, @"Invalid request: unsupported mimeType 'text/plain', expected one of application/pdf, image/png, image/jpeg, image/webp, image/heic");

        let error = extract("", "image/png").into_document(1024).unwrap_err();
        insta::assert_snapshot!(error, @"Invalid request: encodedDocument must not be empty");

        let error = extract("not base64!", "image/png").into_document(1024).unwrap_err();
        insta::assert_snapshot!(error, @"Invalid request: encodedDocument is not valid base64");

        let error = extract("JVBERi0x", "image/png").into_document(4).unwrap_err();
        insta::assert_snapshot!(error, @"Invalid request: document is 6 bytes, the limit is 4 bytes");
    }
}
