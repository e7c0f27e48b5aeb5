mod input;
mod output;

use std::{collections::VecDeque, pin::Pin};

use async_trait::async_trait;
use config::ProviderConfig;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::{Client, header::CONTENT_TYPE};
use rotation::Credential;
use secrecy::ExposeSecret;

use self::{input::GeminiGenerateRequest, output::GeminiStreamChunk};
use crate::{
    error::{LlmError, ProviderError},
    events::Fragment,
    provider::{GenerateRequest, Provider, ProviderSession},
};

const DEFAULT_GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

type ChunkStream = Pin<Box<dyn Stream<Item = Result<GeminiStreamChunk, ProviderError>> + Send>>;

/// Google Gemini, reached through the `streamGenerateContent` SSE endpoint.
pub(crate) struct GeminiProvider {
    client: Client,
    base_url: String,
    include_thoughts: bool,
}

impl GeminiProvider {
    pub fn new(config: &ProviderConfig) -> crate::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build().map_err(|e| {
            log::error!("Failed to create HTTP client for Gemini provider: {e}");
            LlmError::InternalError(None)
        })?;

        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_GEMINI_API_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            base_url,
            include_thoughts: config.include_thoughts,
        })
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    async fn open(
        &self,
        credential: &Credential,
        request: &GenerateRequest,
    ) -> Result<Box<dyn ProviderSession>, ProviderError> {
        let url = format!("{}/models/{}:streamGenerateContent?alt=sse", self.base_url, request.model);
        let body = GeminiGenerateRequest::new(request, self.include_thoughts);

        log::debug!(
            "Opening Gemini stream for model '{}' with credential #{}",
            request.model,
            credential.index()
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", credential.secret().expose_secret())
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            log::debug!("Gemini returned HTTP {status} for credential #{}", credential.index());

            return Err(ProviderError::from_status(status.as_u16(), &text));
        }

        let chunks = response.bytes_stream().eventsource().filter_map(|event| async move {
            let event = match event {
                Ok(event) => event,
                Err(e) => return Some(Err(ProviderError::from_transport(e))),
            };

            parse_chunk(&event.data)
        });

        Ok(Box::new(GeminiSession {
            chunks: Some(Box::pin(chunks)),
            pending: VecDeque::new(),
        }))
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Parses the data of one SSE event. Blank keep-alive data yields nothing.
///
/// The answer is assembled from consecutive chunks, so a chunk that cannot be
/// read fails the attempt instead of leaving a gap in the buffer.
fn parse_chunk(data: &str) -> Option<Result<GeminiStreamChunk, ProviderError>> {
    if data.trim().is_empty() {
        return None;
    }

    match sonic_rs::from_str::<GeminiStreamChunk>(data) {
        Ok(chunk) => Some(Ok(chunk)),
        Err(e) => {
            log::warn!("Failed to parse Gemini stream chunk: {e}");
            log::debug!("Unparseable chunk data: {data}");

            Some(Err(ProviderError::Unavailable(format!("Malformed stream chunk: {e}"))))
        }
    }
}

/// One open `streamGenerateContent` response.
struct GeminiSession {
    /// `None` once the stream ended or was aborted.
    chunks: Option<ChunkStream>,
    /// Fragments of the current chunk not handed out yet.
    pending: VecDeque<Fragment>,
}

#[async_trait]
impl ProviderSession for GeminiSession {
    async fn next_fragment(&mut self) -> Option<Result<Fragment, ProviderError>> {
        loop {
            if let Some(fragment) = self.pending.pop_front() {
                return Some(Ok(fragment));
            }

            let chunks = self.chunks.as_mut()?;

            match chunks.next().await {
                Some(Ok(chunk)) => match chunk.into_fragments() {
                    Ok(fragments) => self.pending.extend(fragments),
                    Err(error) => {
                        self.chunks = None;
                        return Some(Err(error));
                    }
                },
                Some(Err(error)) => {
                    self.chunks = None;
                    return Some(Err(error));
                }
                None => {
                    self.chunks = None;
                    return None;
                }
            }
        }
    }

    fn abort(&mut self) {
        // Dropping the body stream closes the connection.
        self.chunks = None;
        self.pending.clear();
    }
}
