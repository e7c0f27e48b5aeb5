use serde::Deserialize;
use serde_json::{Value, json};

use crate::assembler::Payload;

/// Loan details read from an uploaded document.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
pub(crate) struct ExtractionResult {
    #[serde(default)]
    pub(crate) lender: Option<String>,
    #[serde(default)]
    pub(crate) loan_identifier: Option<String>,
    #[serde(default)]
    pub(crate) borrower_name: Option<String>,
    #[serde(default)]
    pub(crate) currency: Option<String>,
    pub(crate) principal_amount: f64,
    #[serde(default)]
    pub(crate) interest_rate: Option<f64>,
    #[serde(default)]
    pub(crate) start_date: Option<String>,
    #[serde(default)]
    pub(crate) end_date: Option<String>,
    pub(crate) installments: Vec<Installment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
pub(crate) struct Installment {
    pub(crate) number: u32,
    pub(crate) due_date: String,
    pub(crate) amount: f64,
    #[serde(default)]
    pub(crate) payment_date: Option<String>,
    #[serde(default)]
    pub(crate) paid: bool,
}

const SYSTEM_INSTRUCTION: &str = "\
You extract loan data from documents such as amortization schedules, loan agreements and \
bank statements. Read the attached document and reply only with JSON matching the \
response schema. Use ISO 8601 dates (YYYY-MM-DD) and plain numbers without currency \
symbols or thousands separators. List every installment in order. Set paymentDate only \
when the document shows the installment was paid, otherwise leave it null. Leave optional \
fields out when the document does not state them.";

impl Payload for ExtractionResult {
    fn system_instruction() -> &'static str {
        SYSTEM_INSTRUCTION
    }

    fn response_schema() -> Value {
        let optional_string = json!({ "type": "STRING", "nullable": true });

        json!({
            "type": "OBJECT",
            "properties": {
                "lender": optional_string,
                "loanIdentifier": optional_string,
                "borrowerName": optional_string,
                "currency": optional_string,
                "principalAmount": { "type": "NUMBER" },
                "interestRate": { "type": "NUMBER", "nullable": true },
                "startDate": optional_string,
                "endDate": optional_string,
                "installments": {
                    "type": "ARRAY",
                    "items": {
                        "type": "OBJECT",
                        "properties": {
                            "number": { "type": "INTEGER" },
                            "dueDate": { "type": "STRING" },
                            "amount": { "type": "NUMBER" },
                            "paymentDate": optional_string,
                            "paid": { "type": "BOOLEAN" },
                        },
                        "required": ["number", "dueDate", "amount", "paid"],
                    },
                },
            },
            "required": ["principalAmount", "installments"],
        })
    }

    /// An installment counts as paid exactly when it carries a payment date.
    fn normalize(value: &mut Value) {
        let Some(installments) = value.get_mut("installments").and_then(Value::as_array_mut) else {
            return;
        };

        for installment in installments.iter_mut().filter_map(Value::as_object_mut) {
            let paid = installment
                .get("paymentDate")
                .and_then(Value::as_str)
                .is_some_and(|date| !date.trim().is_empty());

            installment.insert("paid".to_string(), Value::Bool(paid));
        }
    }
}
