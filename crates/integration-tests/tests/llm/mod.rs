mod chat;
mod extraction;
mod rotation;
mod validation;

use indoc::formatdoc;
use integration_tests::{TestServer, gemini::TestGemini};

pub(crate) const ANSWER: &str = r#"{"answer": "Pay the credit card first.", "keyPoints": ["The card charges 24%"], "actionItems": [{"priority": "high", "action": "Pay 300 extra this month"}]}"#;

/// Starts the gateway in front of `gemini` with the given credentials.
pub(crate) async fn start(gemini: &TestGemini, api_keys: &[&str], max_attempts: u32) -> TestServer {
    let config = formatdoc! {r#"
        [llm]
        default_model = "flash"

        [llm.provider]
        base_url = "{base_url}"
        api_keys = {api_keys:?}
        timeout = "5s"

        [llm.provider.models.flash]
        rename = "gemini-2.5-flash"

        [llm.retry]
        max_attempts = {max_attempts}
        delays = ["0s"]
    "#, base_url = gemini.base_url()};

    TestServer::start(&config).await
}

pub(crate) fn statuses(events: &[serde_json::Value]) -> Vec<&str> {
    events.iter().filter_map(|event| event["status"].as_str()).collect()
}
