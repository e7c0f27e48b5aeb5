use integration_tests::gemini::GeminiMock;
use serde_json::{Value, json};

use super::start;

#[tokio::test]
async fn blank_message_is_rejected_before_any_provider_call() {
    let gemini = GeminiMock::new().spawn().await.unwrap();
    let server = start(&gemini, &["key-a"], 3).await;

    let response = server
        .client
        .post("/llm/chat/stream", &json!({ "message": "   " }))
        .await
        .unwrap();

    assert_eq!(response.status(), 400);

    let body: Value = response.json().await.unwrap();

    insta::assert_json_snapshot!(body, @r#"
    {
      "error": {
        "code": 400,
        "message": "Invalid request: message must not be empty",
        "type": "invalid_request_error"
      }
    }
    "#);

    assert!(gemini.calls().is_empty());
}

#[tokio::test]
async fn unknown_model_is_not_found() {
    let gemini = GeminiMock::new().spawn().await.unwrap();
    let server = start(&gemini, &["key-a"], 3).await;

    let response = server
        .client
        .post("/llm/chat/stream", &json!({ "message": "hi", "chosenModel": "gpt-4" }))
        .await
        .unwrap();

    assert_eq!(response.status(), 404);

    let body: Value = response.json().await.unwrap();

    insta::assert_json_snapshot!(body, @r#"
    {
      "error": {
        "code": 404,
        "message": "Model 'gpt-4' not found",
        "type": "not_found_error"
      }
    }
    "#);
}

#[tokio::test]
async fn unsupported_document_type_is_rejected() {
    let gemini = GeminiMock::new().spawn().await.unwrap();
    let server = start(&gemini, &["key-a"], 3).await;

    let response = server
        .client
        .post(
            "/llm/extract/stream",
            &json!({ "encodedDocument": "aGVsbG8=", "mimeType": "text/plain" }),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    assert!(gemini.calls().is_empty());
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let gemini = GeminiMock::new().spawn().await.unwrap();
    let server = start(&gemini, &["key-a"], 3).await;

    let response = server
        .client
        .post("/llm/chat/stream", &json!({ "conversationId": "c-1" }))
        .await
        .unwrap();

    assert_eq!(response.status(), 400);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");
}
