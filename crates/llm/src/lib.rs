//! Streaming chat and document extraction over a rotating pool of Gemini
//! credentials.
//!
//! Each request is driven by a dispatcher that retries rate-limited and
//! overloaded provider calls, rotates to the next credential once local
//! retries run out, and relays its progress to the client as server-sent
//! events until a validated result or an error closes the stream.

use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Json, State, rejection::JsonRejection},
    response::{IntoResponse, Sse},
    routing::{get, post},
};
use config::{LlmConfig, StorageConfig};

mod assembler;
mod backoff;
mod cancel;
mod conversation;
mod dispatcher;
mod error;
mod events;
mod messages;
mod metrics;
mod payload;
mod provider;
mod relay;
mod request;
mod server;

use error::LlmError;
use relay::EventRelay;
use request::{ChatRequest, ExtractRequest};
use server::LlmServer;

pub(crate) type Result<T> = std::result::Result<T, LlmError>;

/// Creates an axum router for the streaming endpoints.
pub async fn router(config: LlmConfig, storage_config: &StorageConfig) -> anyhow::Result<Router> {
    let server = Arc::new(
        LlmServer::new(&config, storage_config)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize LLM server: {e}"))?,
    );

    let routes = Router::new()
        .route("/chat/stream", post(chat_stream))
        .route("/extract/stream", post(extract_stream))
        .route("/models", get(list_models))
        .layer(DefaultBodyLimit::max(body_limit(config.max_document_bytes)))
        .with_state(server);

    Ok(Router::new().nest(&config.path, routes))
}

/// Streams the answer to a conversational turn.
async fn chat_stream(
    State(server): State<Arc<LlmServer>>,
    request: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Sse<EventRelay>> {
    let Json(request) = request.map_err(invalid_body)?;

    log::info!("Chat stream requested");

    Ok(server.chat(request)?.into_sse())
}

/// Streams the extraction of an uploaded document.
async fn extract_stream(
    State(server): State<Arc<LlmServer>>,
    request: std::result::Result<Json<ExtractRequest>, JsonRejection>,
) -> Result<Sse<EventRelay>> {
    let Json(request) = request.map_err(invalid_body)?;

    log::info!("Extraction stream requested for a {} document", request.mime_type);

    Ok(server.extract(request)?.into_sse())
}

/// Handle list models requests.
async fn list_models(State(server): State<Arc<LlmServer>>) -> impl IntoResponse {
    let response = server.models();

    log::debug!("Returning {} models", response.data.len());
    Json(response)
}

/// Room for JSON fields and a `data:` URL prefix next to the document.
const BODY_OVERHEAD: usize = 64 * 1024;

/// Largest request body accepted. Documents arrive base64 encoded, which
/// takes four characters for every three bytes.
fn body_limit(max_document_bytes: usize) -> usize {
    max_document_bytes
        .div_ceil(3)
        .saturating_mul(4)
        .saturating_add(BODY_OVERHEAD)
}

fn invalid_body(rejection: JsonRejection) -> LlmError {
    log::debug!("Rejected request body: {rejection}");
    LlmError::InvalidRequest(rejection.body_text())
}
