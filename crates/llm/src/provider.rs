pub(crate) mod gemini;
mod model_manager;

pub(crate) use model_manager::ModelManager;

use async_trait::async_trait;
use rotation::Credential;
use serde_json::Value;

use crate::{error::ProviderError, events::Fragment};

/// One generation request, independent of the credential it is sent with.
#[derive(Debug, Clone)]
pub(crate) struct GenerateRequest {
    /// Provider-side model name.
    pub(crate) model: String,
    pub(crate) system_instruction: String,
    pub(crate) contents: Vec<Content>,
    pub(crate) response_schema: Value,
}

/// A turn of the conversation sent to the provider.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Content {
    pub(crate) role: Role,
    pub(crate) parts: Vec<Part>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Part {
    Text(String),
    /// Base64 encoded document.
    InlineData { mime_type: String, data: String },
}

/// A generative provider.
///
/// Note for async_trait: the dispatcher holds providers as trait objects, so
/// the trait must stay dyn-compatible.
#[async_trait]
pub(crate) trait Provider: Send + Sync {
    /// Starts one streaming call with the given credential.
    ///
    /// Errors returned here are classified exactly like errors raised while
    /// iterating the session.
    async fn open(
        &self,
        credential: &Credential,
        request: &GenerateRequest,
    ) -> Result<Box<dyn ProviderSession>, ProviderError>;

    fn name(&self) -> &str;
}

/// The fragment sequence of a single provider call. Not resumable: a
/// retry opens a new session.
#[async_trait]
pub(crate) trait ProviderSession: Send {
    /// Pulls the next fragment. `None` marks the normal end of the answer.
    async fn next_fragment(&mut self) -> Option<Result<Fragment, ProviderError>>;

    /// Stops delivery and releases the connection. No fragment is produced
    /// after this returns.
    fn abort(&mut self);
}
