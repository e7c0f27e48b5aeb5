use serde::Serialize;
use serde_json::Value;

use crate::provider::{Content, GenerateRequest, Part, Role};

/// Request body of the Gemini `streamGenerateContent` API.
///
/// See the [Google AI API Reference](https://ai.google.dev/api/generate-content).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GeminiGenerateRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    system_instruction: GeminiSystemInstruction<'a>,
    generation_config: GeminiGenerationConfig<'a>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiSystemInstruction<'a> {
    parts: [GeminiPart<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum GeminiPart<'a> {
    Text(&'a str),
    InlineData(GeminiBlob<'a>),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiBlob<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig<'a> {
    /// Constrains the candidate to JSON matching `response_schema`.
    response_mime_type: &'static str,
    response_schema: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<GeminiThinkingConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiThinkingConfig {
    include_thoughts: bool,
}

impl<'a> GeminiGenerateRequest<'a> {
    pub(super) fn new(request: &'a GenerateRequest, include_thoughts: bool) -> Self {
        Self {
            contents: request.contents.iter().map(GeminiContent::from).collect(),
            system_instruction: GeminiSystemInstruction {
                parts: [GeminiPart::Text(&request.system_instruction)],
            },
            generation_config: GeminiGenerationConfig {
                response_mime_type: "application/json",
                response_schema: &request.response_schema,
                thinking_config: include_thoughts.then_some(GeminiThinkingConfig { include_thoughts }),
            },
        }
    }
}

impl<'a> From<&'a Content> for GeminiContent<'a> {
    fn from(content: &'a Content) -> Self {
        let role = match content.role {
            Role::User => "user",
            Role::Model => "model",
        };

        let parts = content
            .parts
            .iter()
            .map(|part| match part {
                Part::Text(text) => GeminiPart::Text(text),
                Part::InlineData { mime_type, data } => GeminiPart::InlineData(GeminiBlob { mime_type, data }),
            })
            .collect();

        Self { role, parts }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::GeminiGenerateRequest;
    use crate::provider::{Content, GenerateRequest, Part, Role};

    #[test]
    fn request_body() {
        let request = GenerateRequest {
            model: "gemini-2.5-flash".to_string(),
            system_instruction: "Extract the loan.".to_string(),
            contents: vec![
                Content {
                    role: Role::User,
                    parts: vec![
                        Part::InlineData {
                            mime_type: "application/pdf".to_string(),
                            data: "JVBERi0=".to_string(),
                        },
                        Part::Text("Read this".to_string()),
                    ],
                },
                Content {
                    role: Role::Model,
                    parts: vec![Part::Text("{}".to_string())],
                },
            ],
            response_schema: json!({ "type": "OBJECT" }),
        };

        let body = GeminiGenerateRequest::new(&request, true);

        insta::assert_json_snapshot!(body, @r#"
        {
          "contents": [
            {
              "role": "user",
              "parts": [
                {
                  "inlineData": {
                    "mimeType": "application/pdf",
                    "data": "JVBERi0="
                  }
                },
                {
                  "text": "Read this"
                }
              ]
            },
            {
              "role": "model",
              "parts": [
                {
                  "text": "{}"
                }
              ]
            }
          ],
          "systemInstruction": {
            "parts": [
              {
                "text": "Extract the loan."
              }
            ]
          },
          "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
              "type": "OBJECT"
            },
            "thinkingConfig": {
              "includeThoughts": true
            }
          }
        }
        "#);
    }

    #[test]
    fn thinking_config_is_omitted_when_disabled() {
        let request = GenerateRequest {
            model: "m".to_string(),
            system_instruction: String::new(),
            contents: Vec::new(),
            response_schema: json!({}),
        };

        let body = serde_json::to_value(GeminiGenerateRequest::new(&request, false)).unwrap();

        assert!(body["generationConfig"].get("thinkingConfig").is_none());
    }
}
