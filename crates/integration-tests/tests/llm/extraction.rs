use integration_tests::gemini::{GeminiMock, Reply};
use serde_json::json;

use super::start;

#[tokio::test]
async fn document_is_extracted() {
    let answer = json!({
        "lender": "Acme Bank",
        "principalAmount": 12000.0,
        "interestRate": 7.5,
        "installments": [
            { "number": 1, "dueDate": "2024-01-05", "amount": 520.5, "paymentDate": "2024-01-04", "paid": false },
            { "number": 2, "dueDate": "2024-02-05", "amount": 520.5, "paymentDate": null, "paid": true }
        ]
    });

    let gemini = GeminiMock::new()
        .reply(Reply::answer("Reading the schedule", &answer.to_string(), 16))
        .spawn()
        .await
        .unwrap();

    let server = start(&gemini, &["key-a"], 3).await;

    let request = json!({
        "encodedDocument": "data:application/pdf;base64,JVBERi0x",
        "mimeType": "application/pdf"
    });

    let response = server.client.stream("/llm/extract/stream", &request).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.events.last().map(String::as_str), Some("[DONE]"));

    let events = response.json();

    assert_eq!(events[0], json!({ "status": "Contacting gemini" }));
    assert_eq!(events[1], json!({ "thinking": "Reading the schedule" }));
    assert_eq!(events.len(), 3, "answer chunks are not relayed: {events:?}");

    insta::assert_json_snapshot!(events[2], @r#"
    {
      "final": {
        "installments": [
          {
            "amount": 520.5,
            "dueDate": "2024-01-05",
            "number": 1,
            "paid": true,
            "paymentDate": "2024-01-04"
          },
          {
            "amount": 520.5,
            "dueDate": "2024-02-05",
            "number": 2,
            "paid": false,
            "paymentDate": null
          }
        ],
        "interestRate": 7.5,
        "lender": "Acme Bank",
        "principalAmount": 12000.0
      }
    }
    "#);

    let body = &gemini.calls()[0].body;

    assert_eq!(
        body["contents"][0]["parts"][0],
        json!({ "inlineData": { "mimeType": "application/pdf", "data": "JVBERi0x" } })
    );
}

#[tokio::test]
async fn document_larger_than_the_default_body_limit_is_accepted() {
    let answer = json!({ "principalAmount": 5000.0, "installments": [] });

    let gemini = GeminiMock::new()
        .reply(Reply::answer("", &answer.to_string(), 1000))
        .spawn()
        .await
        .unwrap();

    let server = start(&gemini, &["key-a"], 3).await;

    // 4 MiB of base64 decodes to a 3 MiB document.
    let encoded = "A".repeat(4 * 1024 * 1024);

    let request = json!({ "encodedDocument": encoded, "mimeType": "image/png" });
    let response = server.client.stream("/llm/extract/stream", &request).await;

    assert_eq!(response.status, 200);
    assert_eq!(
        response.json().last(),
        Some(&json!({ "final": { "principalAmount": 5000.0, "installments": [] } }))
    );

    let body = &gemini.calls()[0].body;
    let forwarded = body["contents"][0]["parts"][0]["inlineData"]["data"].as_str().unwrap();

    assert_eq!(forwarded.len(), encoded.len());
}
