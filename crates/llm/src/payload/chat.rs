use serde::Deserialize;
use serde_json::{Value, json};

use super::MAX_LIST_ITEMS;
use crate::assembler::Payload;

/// Answer of the conversational assistant.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChatResult {
    pub(crate) answer: String,
    pub(crate) key_points: Vec<String>,
    pub(crate) action_items: Vec<ActionItem>,
    #[serde(default)]
    #[allow(dead_code)]
    pub(crate) warning: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ActionItem {
    #[allow(dead_code)]
    pub(crate) priority: Priority,
    #[allow(dead_code)]
    pub(crate) action: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Priority {
    High,
    Medium,
    Low,
}

const SYSTEM_INSTRUCTION: &str = "\
You are a careful personal-finance assistant. Answer the user's question using the \
financial context and conversation provided. Be concrete and reference the user's own \
numbers when they are available. Reply only with JSON matching the response schema: a \
concise answer, at most five key points, at most five action items each with a priority \
of high, medium or low, and a warning only when something needs urgent attention. Never \
invent figures that are not in the context.";

impl Payload for ChatResult {
    fn system_instruction() -> &'static str {
        SYSTEM_INSTRUCTION
    }

    fn response_schema() -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "answer": { "type": "STRING" },
                "keyPoints": {
                    "type": "ARRAY",
                    "items": { "type": "STRING" },
                    "maxItems": MAX_LIST_ITEMS,
                },
                "actionItems": {
                    "type": "ARRAY",
                    "maxItems": MAX_LIST_ITEMS,
                    "items": {
                        "type": "OBJECT",
                        "properties": {
                            "priority": { "type": "STRING", "enum": ["high", "medium", "low"] },
                            "action": { "type": "STRING" },
                        },
                        "required": ["priority", "action"],
                    },
                },
                "warning": { "type": "STRING", "nullable": true },
            },
            "required": ["answer", "keyPoints", "actionItems"],
            "propertyOrdering": ["answer", "keyPoints", "actionItems", "warning"],
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.key_points.len() > MAX_LIST_ITEMS {
            return Err(format!("keyPoints has {} entries, at most {MAX_LIST_ITEMS} allowed", self.key_points.len()));
        }

        if self.action_items.len() > MAX_LIST_ITEMS {
            return Err(format!(
                "actionItems has {} entries, at most {MAX_LIST_ITEMS} allowed",
                self.action_items.len()
            ));
        }

        Ok(())
    }
}
