use integration_tests::gemini::{GeminiMock, Reply};
use serde_json::{Value, json};

use super::{ANSWER, start};

#[tokio::test]
async fn new_conversation_streams_a_structured_answer() {
    let gemini = GeminiMock::new()
        .reply(Reply::answer("Comparing rates", ANSWER, 1000))
        .spawn()
        .await
        .unwrap();

    let server = start(&gemini, &["key-a"], 3).await;

    let request = json!({
        "message": "Which debt should I pay first?",
        "context": { "debts": [{ "name": "Card", "rate": 24 }, { "name": "Car", "rate": 6 }] },
        "contextKey": "debts"
    });

    let response = server.client.stream("/llm/chat/stream", &request).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.events.last().map(String::as_str), Some("[DONE]"));

    let events = response.json();

    assert_eq!(response.conversation_id().map(|id| id.len()), Some(36));
    assert_eq!(
        &events[1..],
        &[
            json!({ "status": "Contacting gemini" }),
            json!({ "thinking": "Comparing rates" }),
            json!({ "chunk": ANSWER }),
            json!({ "structured": serde_json::from_str::<Value>(ANSWER).unwrap() }),
        ]
    );

    let calls = gemini.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].path, "gemini-2.5-flash:streamGenerateContent");

    let body = &calls[0].body;

    assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    assert_eq!(body["generationConfig"]["thinkingConfig"]["includeThoughts"], true);
    assert_eq!(
        body["contents"],
        json!([{ "role": "user", "parts": [{ "text": "Which debt should I pay first?" }] }])
    );

    let instruction = body["systemInstruction"]["parts"][0]["text"].as_str().unwrap();
    assert!(instruction.contains("Financial context (debts)"));
}

#[tokio::test]
async fn follow_up_turn_sends_the_history() {
    let gemini = GeminiMock::new()
        .replies(Reply::answer("", ANSWER, 1000), 2)
        .spawn()
        .await
        .unwrap();

    let server = start(&gemini, &["key-a"], 3).await;

    let first = server
        .client
        .stream("/llm/chat/stream", &json!({ "message": "Which debt first?" }))
        .await;

    let conversation_id = first.conversation_id().unwrap();

    let second = server
        .client
        .stream(
            "/llm/chat/stream",
            &json!({ "conversationId": conversation_id, "message": "And after that?" }),
        )
        .await;

    assert_eq!(second.conversation_id(), None);
    assert_eq!(second.events.last().map(String::as_str), Some("[DONE]"));

    let calls = gemini.calls();

    assert_eq!(
        calls[1].body["contents"],
        json!([
            { "role": "user", "parts": [{ "text": "Which debt first?" }] },
            { "role": "model", "parts": [{ "text": "Pay the credit card first." }] },
            { "role": "user", "parts": [{ "text": "And after that?" }] }
        ])
    );
}

#[tokio::test]
async fn failed_turn_is_not_remembered() {
    let gemini = GeminiMock::new()
        .reply(Reply::invalid_argument())
        .reply(Reply::answer("", ANSWER, 1000))
        .spawn()
        .await
        .unwrap();

    let server = start(&gemini, &["key-a"], 3).await;

    let first = server
        .client
        .stream("/llm/chat/stream", &json!({ "message": "Which debt first?" }))
        .await;

    let conversation_id = first.conversation_id().unwrap();

    server
        .client
        .stream(
            "/llm/chat/stream",
            &json!({ "conversationId": conversation_id, "message": "Hello again" }),
        )
        .await;

    assert_eq!(
        gemini.calls()[1].body["contents"],
        json!([{ "role": "user", "parts": [{ "text": "Hello again" }] }])
    );
}

#[tokio::test]
async fn answer_missing_a_required_field_is_an_error() {
    let gemini = GeminiMock::new()
        .reply(Reply::answer("", r#"{"keyPoints": [], "actionItems": []}"#, 8))
        .spawn()
        .await
        .unwrap();

    let server = start(&gemini, &["key-a"], 3).await;

    let response = server
        .client
        .stream("/llm/chat/stream", &json!({ "message": "Which debt first?" }))
        .await;

    let events = response.json();

    assert!(!events.iter().any(|event| event.get("structured").is_some()));

    let errors: Vec<_> = events.iter().filter_map(|event| event["error"].as_str()).collect();

    assert_eq!(errors, vec!["Could not parse the response. Please try again."]);
    assert_eq!(response.events.last().map(String::as_str), Some("[DONE]"));
    assert_eq!(gemini.calls().len(), 1);
}

#[tokio::test]
async fn models_are_listed() {
    let gemini = GeminiMock::new().spawn().await.unwrap();
    let server = start(&gemini, &["key-a"], 3).await;

    let body: Value = server.client.get("/llm/models").await.json().await.unwrap();

    insta::assert_json_snapshot!(body, @r#"
    {
      "data": [
        {
          "id": "flash",
          "object": "model",
          "owned_by": "gemini"
        }
      ],
      "object": "list"
    }
    "#);
}
