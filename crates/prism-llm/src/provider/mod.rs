//! Provider client trait and implementations for LLM backends
//!
//! Every backend takes the flattened prompt and answers with text; the
//! variants differ only in transport, authentication and wire format.

pub mod anthropic;
pub mod copilot;
pub mod gemini;
pub mod gemini_cookie;
mod openai_compat;
pub mod passthrough;
mod registry;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::de::DeserializeOwned;

pub use registry::ProviderRegistry;

use crate::alias::ResolvedModel;
use crate::error::LlmError;
use crate::protocol::anthropic::AnthropicErrorResponse;
use crate::protocol::google::GoogleErrorResponse;
use crate::protocol::openai::OpenAiErrorResponse;
use crate::transform::Attachment;
use crate::types::{CompletionParams, Message, ToolDefinition};

/// Text fragments produced by a natively streaming provider
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// One provider call, built by the orchestrator
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Provider family and backend model
    pub model: ResolvedModel,
    /// Flattened prompt
    pub prompt: String,
    /// Original messages, kept for providers that want them
    pub messages: Vec<Message>,
    /// Tools described in the prompt
    pub tools: Vec<ToolDefinition>,
    /// Inline images forwarded natively where supported
    pub attachments: Vec<Attachment>,
    /// Sampling parameters
    pub params: CompletionParams,
    /// Whether the client asked for a stream
    pub stream: bool,
}

/// Capabilities advertised by a provider
#[derive(Debug, Clone, Copy)]
pub struct ProviderCapabilities {
    /// Whether the provider supports streaming responses
    pub streaming: bool,
    /// Whether image attachments are forwarded
    pub attachments: bool,
}

/// Trait implemented by each LLM provider backend
///
/// Clients are built once at startup and shared across requests.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Configured provider name
    fn name(&self) -> &str;

    /// Advertised capabilities
    fn capabilities(&self) -> ProviderCapabilities;

    /// Model used when a request names none
    fn default_model(&self) -> &str;

    /// Additional backend models to advertise
    fn models(&self) -> &[String] {
        &[]
    }

    /// Generate a complete answer
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError>;

    /// Generate an answer as a stream of text fragments
    async fn generate_stream(&self, request: &GenerationRequest) -> Result<FragmentStream, LlmError> {
        let _ = request;
        Err(LlmError::Unsupported(format!("provider {} does not stream", self.name())))
    }
}

/// Map a transport failure
fn send_error(provider: &str, error: &reqwest::Error) -> LlmError {
    tracing::error!(provider, error = %error, "upstream request failed");
    LlmError::Upstream(format!("failed to reach {provider}: {error}"))
}

/// Error body of an upstream API
trait UpstreamErrorBody: DeserializeOwned {
    fn into_message(self) -> String;
}

impl UpstreamErrorBody for GoogleErrorResponse {
    fn into_message(self) -> String {
        self.error.message
    }
}

impl UpstreamErrorBody for AnthropicErrorResponse {
    fn into_message(self) -> String {
        self.error.message
    }
}

impl UpstreamErrorBody for OpenAiErrorResponse {
    fn into_message(self) -> String {
        self.error.message
    }
}

/// Map a non-success upstream response
///
/// Uses the message from the API's error body when it parses as `E`,
/// otherwise a bounded excerpt of the raw body.
async fn status_error<E: UpstreamErrorBody>(provider: &str, response: reqwest::Response) -> LlmError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let detail = serde_json::from_str::<E>(&body).map_or(body, E::into_message);
    let excerpt: String = detail.chars().take(512).collect();

    tracing::warn!(provider, status = %status, error = %excerpt, "upstream returned error");
    LlmError::Upstream(format!("{provider} returned {status}: {excerpt}"))
}
