//! A scripted stand-in for the Gemini `streamGenerateContent` API.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response, Sse, sse::Event},
    routing::post,
};
use futures::stream;
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// One scripted response of the mock.
#[derive(Debug, Clone)]
pub enum Reply {
    /// A non-success HTTP response with a Google error body.
    Error { status: u16, status_text: String, message: String },
    /// A successful event stream made of these chunk objects.
    Stream(Vec<Value>),
}

impl Reply {
    /// HTTP 429 with a quota message.
    pub fn rate_limited() -> Self {
        Self::Error {
            status: 429,
            status_text: "RESOURCE_EXHAUSTED".to_string(),
            message: "Resource has been exhausted (e.g. check quota).".to_string(),
        }
    }

    /// HTTP 503, the model is overloaded.
    pub fn unavailable() -> Self {
        Self::Error {
            status: 503,
            status_text: "UNAVAILABLE".to_string(),
            message: "The model is overloaded. Please try again later.".to_string(),
        }
    }

    /// HTTP 400, the request was rejected.
    pub fn invalid_argument() -> Self {
        Self::Error {
            status: 400,
            status_text: "INVALID_ARGUMENT".to_string(),
            message: "Request contains an invalid argument.".to_string(),
        }
    }

    /// Streams the reasoning as one thought part, then the answer split into
    /// chunks of `chunk_size` characters.
    pub fn answer(reasoning: &str, answer: &str, chunk_size: usize) -> Self {
        let mut chunks = Vec::new();

        if !reasoning.is_empty() {
            chunks.push(text_chunk(reasoning, true));
        }

        let characters: Vec<char> = answer.chars().collect();

        for piece in characters.chunks(chunk_size.max(1)) {
            chunks.push(text_chunk(&piece.iter().collect::<String>(), false));
        }

        chunks.push(json!({
            "candidates": [{ "content": { "role": "model", "parts": [] }, "finishReason": "STOP" }],
            "usageMetadata": { "promptTokenCount": 12, "candidatesTokenCount": 34 }
        }));

        Self::Stream(chunks)
    }

    /// HTTP 200 whose stream carries an error object instead of candidates.
    pub fn stream_error(status_text: &str, message: &str) -> Self {
        Self::Stream(vec![json!({
            "error": { "code": 429, "message": message, "status": status_text }
        })])
    }
}

fn text_chunk(text: &str, thought: bool) -> Value {
    let part = if thought {
        json!({ "text": text, "thought": true })
    } else {
        json!({ "text": text })
    };

    json!({ "candidates": [{ "content": { "role": "model", "parts": [part] } }] })
}

/// A call received by the mock.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// The `x-goog-api-key` header.
    pub api_key: String,
    /// Path after `/v1beta/models/`, e.g. `gemini-2.5-flash:streamGenerateContent`.
    pub path: String,
    pub body: Value,
}

#[derive(Default)]
struct MockState {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<RecordedCall>>,
}

/// Builder for the Gemini mock.
#[derive(Default)]
pub struct GeminiMock {
    replies: Vec<Reply>,
}

impl GeminiMock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a reply. Replies are used in order, one per call.
    pub fn reply(mut self, reply: Reply) -> Self {
        self.replies.push(reply);
        self
    }

    /// Queues the same reply `count` times.
    pub fn replies(mut self, reply: Reply, count: usize) -> Self {
        self.replies.extend(std::iter::repeat_n(reply, count));
        self
    }

    pub async fn spawn(self) -> anyhow::Result<TestGemini> {
        let state = Arc::new(MockState {
            replies: Mutex::new(self.replies.into()),
            calls: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1beta/models/{*path}", post(stream_generate_content))
            .layer(DefaultBodyLimit::disable())
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?;

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(TestGemini { address, state })
    }
}

/// A running Gemini mock.
pub struct TestGemini {
    address: SocketAddr,
    state: Arc<MockState>,
}

impl TestGemini {
    /// Value for `llm.provider.base_url`.
    pub fn base_url(&self) -> String {
        format!("http://{}/v1beta", self.address)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().unwrap().clone()
    }

    /// API keys of all calls so far, in order.
    pub fn api_keys(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.api_key).collect()
    }

    /// Queues more replies on the running mock.
    pub fn push_reply(&self, reply: Reply) {
        self.state.replies.lock().unwrap().push_back(reply);
    }
}

async fn stream_generate_content(
    State(state): State<Arc<MockState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let api_key = headers
        .get("x-goog-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    state.calls.lock().unwrap().push(RecordedCall {
        api_key,
        path: path.clone(),
        body,
    });

    if !path.ends_with(":streamGenerateContent") {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": { "message": "Not found" } }))).into_response();
    }

    let reply = state.replies.lock().unwrap().pop_front();

    match reply {
        Some(Reply::Error {
            status,
            status_text,
            message,
        }) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

            let body = json!({
                "error": { "code": status.as_u16(), "message": message, "status": status_text }
            });

            (status, Json(body)).into_response()
        }
        Some(Reply::Stream(chunks)) => {
            let events = chunks
                .into_iter()
                .map(|chunk| Ok::<_, Infallible>(Event::default().data(chunk.to_string())));

            Sse::new(stream::iter(events)).into_response()
        }
        None => {
            let body = json!({
                "error": { "code": 500, "message": "No scripted reply left", "status": "INTERNAL" }
            });

            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}
