use integration_tests::gemini::{GeminiMock, Reply};
use serde_json::json;

use super::{ANSWER, start, statuses};

const SATURATED: &str = "The service is temporarily saturated. Please try again in a few minutes.";

fn chat() -> serde_json::Value {
    json!({ "message": "Which debt first?" })
}

#[tokio::test]
async fn rate_limited_credential_is_rotated() {
    let gemini = GeminiMock::new()
        .replies(Reply::rate_limited(), 3)
        .reply(Reply::answer("", ANSWER, 1000))
        .spawn()
        .await
        .unwrap();

    let server = start(&gemini, &["key-a", "key-b"], 3).await;

    let response = server.client.stream("/llm/chat/stream", &chat()).await;
    let events = response.json();

    assert_eq!(gemini.api_keys(), vec!["key-a", "key-a", "key-a", "key-b"]);
    assert_eq!(
        statuses(&events),
        vec![
            "Contacting gemini",
            "Retrying (attempt 2 of 3)",
            "Retrying (attempt 3 of 3)",
            "Switching to another API key",
        ]
    );
    assert!(events.iter().all(|event| event.get("error").is_none()));
    assert!(events.last().unwrap().get("structured").is_some());

    // The rotation outlives the request.
    gemini.push_reply(Reply::answer("", ANSWER, 1000));
    server.client.stream("/llm/chat/stream", &chat()).await;

    assert_eq!(gemini.api_keys().last().map(String::as_str), Some("key-b"));
}

#[tokio::test]
async fn every_credential_rate_limited() {
    let gemini = GeminiMock::new()
        .replies(Reply::rate_limited(), 2)
        .spawn()
        .await
        .unwrap();

    let server = start(&gemini, &["key-a", "key-b"], 1).await;

    let response = server.client.stream("/llm/chat/stream", &chat()).await;
    let events = response.json();

    assert_eq!(gemini.api_keys(), vec!["key-a", "key-b"]);
    assert_eq!(events.last().unwrap(), &json!({ "error": SATURATED }));
    assert_eq!(response.events.last().map(String::as_str), Some("[DONE]"));
}

#[tokio::test]
async fn overloaded_provider_keeps_the_credential() {
    let gemini = GeminiMock::new()
        .replies(Reply::unavailable(), 3)
        .spawn()
        .await
        .unwrap();

    let server = start(&gemini, &["key-a", "key-b"], 3).await;

    let response = server.client.stream("/llm/chat/stream", &chat()).await;
    let events = response.json();

    assert_eq!(gemini.api_keys(), vec!["key-a", "key-a", "key-a"]);
    assert_eq!(events.last().unwrap(), &json!({ "error": SATURATED }));
}

#[tokio::test]
async fn quota_error_inside_the_stream_rotates() {
    let gemini = GeminiMock::new()
        .reply(Reply::stream_error("RESOURCE_EXHAUSTED", "Quota exceeded for this project."))
        .reply(Reply::answer("", ANSWER, 1000))
        .spawn()
        .await
        .unwrap();

    let server = start(&gemini, &["key-a", "key-b"], 1).await;

    let response = server.client.stream("/llm/chat/stream", &chat()).await;

    assert_eq!(gemini.api_keys(), vec!["key-a", "key-b"]);
    assert!(response.json().last().unwrap().get("structured").is_some());
}

#[tokio::test]
async fn rejected_request_is_not_retried() {
    let gemini = GeminiMock::new()
        .reply(Reply::invalid_argument())
        .spawn()
        .await
        .unwrap();

    let server = start(&gemini, &["key-a", "key-b"], 3).await;

    let response = server.client.stream("/llm/chat/stream", &chat()).await;
    let events = response.json();

    assert_eq!(gemini.api_keys(), vec!["key-a"]);
    assert_eq!(
        events.last().unwrap(),
        &json!({ "error": "The request could not be processed. Please try again later." })
    );
    assert_eq!(response.events.last().map(String::as_str), Some("[DONE]"));
}
