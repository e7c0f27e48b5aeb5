use std::sync::Arc;

use config::{LlmConfig, StorageConfig};
use rotation::CredentialPool;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    assembler::Payload,
    backoff::BackoffScheduler,
    cancel::CancellationController,
    conversation::{ConversationMessage, ConversationStore, InMemoryConversationStore, trim_history},
    dispatcher::StreamingDispatcher,
    events::{Channel, StreamEvent},
    messages::ModelsResponse,
    metrics::DispatchMetrics,
    payload::{ChatResult, ExtractionResult},
    provider::{Content, GenerateRequest, ModelManager, Part, Provider, Role, gemini::GeminiProvider},
    relay::EventRelay,
    request::{ChatRequest, Document, ExtractRequest},
};

const EXTRACTION_PROMPT: &str = "Extract the loan details and the full installment schedule from this document.";

#[derive(Clone)]
pub(crate) struct LlmServer {
    shared: Arc<LlmServerInner>,
}

struct LlmServerInner {
    provider: Box<dyn Provider>,
    pool: CredentialPool,
    models: ModelManager,
    backoff: BackoffScheduler,
    max_attempts: u32,
    max_history: usize,
    max_document_bytes: usize,
    conversations: Box<dyn ConversationStore>,
    metrics: DispatchMetrics,
}

impl LlmServer {
    pub async fn new(config: &LlmConfig, storage: &StorageConfig) -> anyhow::Result<Self> {
        let provider = GeminiProvider::new(&config.provider)?;
        let pool = CredentialPool::new(config.provider.api_keys.clone(), storage).await?;

        log::debug!(
            "Initializing LLM server with {} credentials and {} models",
            pool.len(),
            config.provider.models.len()
        );

        Ok(Self {
            shared: Arc::new(LlmServerInner {
                models: ModelManager::new(config, provider.name()),
                provider: Box::new(provider),
                pool,
                backoff: BackoffScheduler::new(config.retry.delays.clone()),
                max_attempts: config.retry.max_attempts,
                max_history: config.conversations.max_history,
                max_document_bytes: config.max_document_bytes,
                conversations: Box::new(InMemoryConversationStore::new(&config.conversations)),
                metrics: DispatchMetrics::new(),
            }),
        })
    }

    pub fn models(&self) -> ModelsResponse {
        self.shared.models.list()
    }

    /// Validates a chat turn and starts streaming the answer.
    pub fn chat(&self, request: ChatRequest) -> crate::Result<EventRelay> {
        request.validate()?;

        let model = self.shared.models.resolve(request.chosen_model.as_deref())?;

        let (conversation_id, created) = match request.conversation_id() {
            Some(id) => (id.to_string(), false),
            None => (Uuid::new_v4().to_string(), true),
        };

        log::debug!("Chat turn for conversation {conversation_id} on model '{model}'");

        let server = self.clone();
        let cancel = CancellationController::new();

        Ok(EventRelay::spawn(Channel::Chat, cancel.clone(), move |events| async move {
            if created && events.send(StreamEvent::ConversationId(conversation_id.clone())).await.is_err() {
                cancel.cancel();
                return;
            }

            server
                .run_chat(request, model, conversation_id, &events, &cancel)
                .await;
        }))
    }

    /// Validates a document and starts streaming its extraction.
    pub fn extract(&self, request: ExtractRequest) -> crate::Result<EventRelay> {
        let model = self.shared.models.resolve(request.chosen_model.as_deref())?;
        let document = request.into_document(self.shared.max_document_bytes)?;

        log::debug!(
            "Extracting a {} document of {} base64 characters on model '{model}'",
            document.mime_type,
            document.data.len()
        );

        let server = self.clone();
        let cancel = CancellationController::new();

        Ok(EventRelay::spawn(Channel::Extraction, cancel.clone(), move |events| async move {
            server.run_extraction(document, model, &events, &cancel).await;
        }))
    }

    async fn run_chat(
        &self,
        request: ChatRequest,
        model: String,
        conversation_id: String,
        events: &mpsc::Sender<StreamEvent>,
        cancel: &CancellationController,
    ) {
        let conversations = &self.shared.conversations;

        let mut history = conversations.load(&conversation_id).await.unwrap_or_default();
        history.push(ConversationMessage::user(request.message.as_str()));
        trim_history(&mut history, self.shared.max_history);

        let generate = GenerateRequest {
            model,
            system_instruction: chat_instruction(&request),
            contents: history.iter().map(Content::from).collect(),
            response_schema: ChatResult::response_schema(),
        };

        let mut dispatcher = self.dispatcher(events, cancel);
        let outcome = dispatcher.run::<ChatResult>(&generate).await;

        if let Ok(assembled) = &outcome.result {
            history.push(ConversationMessage::assistant(assembled.payload.answer.as_str()));
            trim_history(&mut history, self.shared.max_history);
            conversations.save(&conversation_id, history).await;
        }

        dispatcher.conclude(&outcome).await;
    }

    async fn run_extraction(
        &self,
        document: Document,
        model: String,
        events: &mpsc::Sender<StreamEvent>,
        cancel: &CancellationController,
    ) {
        let generate = GenerateRequest {
            model,
            system_instruction: ExtractionResult::system_instruction().to_string(),
            contents: vec![Content {
                role: Role::User,
                parts: vec![
                    Part::InlineData {
                        mime_type: document.mime_type,
                        data: document.data,
                    },
                    Part::Text(EXTRACTION_PROMPT.to_string()),
                ],
            }],
            response_schema: ExtractionResult::response_schema(),
        };

        let mut dispatcher = self.dispatcher(events, cancel);
        let outcome = dispatcher.run::<ExtractionResult>(&generate).await;

        if let Ok(assembled) = &outcome.result {
            log::debug!("Extracted {} installments", assembled.payload.installments.len());
        }

        dispatcher.conclude(&outcome).await;
    }

    fn dispatcher<'a>(
        &'a self,
        events: &'a mpsc::Sender<StreamEvent>,
        cancel: &'a CancellationController,
    ) -> StreamingDispatcher<'a> {
        let shared = &self.shared;

        StreamingDispatcher::new(
            shared.provider.as_ref(),
            &shared.pool,
            &shared.backoff,
            shared.max_attempts,
            events,
            cancel,
            &shared.metrics,
        )
    }
}

/// The chat system prompt, followed by the client's financial context.
fn chat_instruction(request: &ChatRequest) -> String {
    let mut instruction = ChatResult::system_instruction().to_string();

    let Some(context) = request.context.as_ref().filter(|context| !context.is_null()) else {
        return instruction;
    };

    let label = request.context_key.as_deref().unwrap_or("user data");
    let context = serde_json::to_string_pretty(context).unwrap_or_else(|_| context.to_string());

    instruction.push_str(&format!("\n\nFinancial context ({label}):\n{context}"));
    instruction
}
