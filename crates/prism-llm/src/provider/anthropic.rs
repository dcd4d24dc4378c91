//! Anthropic Messages API provider implementation

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use prism_config::LlmProviderConfig;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{FragmentStream, GenerationRequest, ProviderCapabilities, ProviderClient, send_error, status_error};
use crate::convert::anthropic::prompt_to_anthropic_request;
use crate::error::LlmError;
use crate::protocol::anthropic::{AnthropicErrorResponse, AnthropicResponse, AnthropicStreamDelta, AnthropicStreamEvent};

/// Default Anthropic API base URL
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub(crate) const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Output cap sent when neither request nor config sets one
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic Messages API provider
pub struct AnthropicProvider {
    name: String,
    client: Client,
    base_url: Url,
    api_key: SecretString,
    default_model: String,
    max_tokens: u32,
    models: Vec<String>,
}

impl AnthropicProvider {
    /// Create from provider configuration
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Configuration` if no API key is configured.
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded default base URL is invalid (should never happen).
    pub fn new(name: String, config: &LlmProviderConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| LlmError::Configuration(format!("provider {name} requires an api_key")))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| Url::parse(DEFAULT_BASE_URL).expect("valid default URL"));

        Ok(Self {
            name,
            client: Client::new(),
            base_url,
            api_key,
            default_model: config.default_model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            models: config.models.clone(),
        })
    }

    /// Build the messages endpoint URL
    fn messages_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/messages")
    }

    async fn send(&self, request: &GenerationRequest, stream: bool) -> Result<reqwest::Response, LlmError> {
        let body = prompt_to_anthropic_request(
            &request.model.model_id,
            &request.prompt,
            &request.attachments,
            &request.params,
            self.max_tokens,
            stream,
        );

        let response = self
            .client
            .post(self.messages_url())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("x-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(&self.name, &e))?;

        if !response.status().is_success() {
            return Err(status_error::<AnthropicErrorResponse>(&self.name, response).await);
        }

        Ok(response)
    }
}

#[async_trait]
impl ProviderClient for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }


    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: true,
            attachments: true,
        }
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn models(&self) -> &[String] {
        &self.models
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        let response = self.send(request, false).await?;

        let wire_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Upstream(format!("failed to parse response: {e}")))?;

        Ok(wire_response.text())
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> Result<FragmentStream, LlmError> {
        let response = self.send(request, true).await?;

        let fragments = response.bytes_stream().eventsource().filter_map(|result| async move {
            match result {
                Ok(event) => {
                    let data = event.data.trim();
                    if data.is_empty() {
                        return None;
                    }

                    match serde_json::from_str::<AnthropicStreamEvent>(data) {
                        Ok(AnthropicStreamEvent::ContentBlockDelta {
                            delta: AnthropicStreamDelta::TextDelta { text },
                            ..
                        }) => Some(Ok(text)),
                        Ok(AnthropicStreamEvent::Error { error }) => Some(Err(LlmError::Streaming(error.message))),
                        Ok(_) => None,
                        Err(e) => {
                            tracing::debug!(error = %e, "skipping unparseable Anthropic SSE event");
                            None
                        }
                    }
                }
                Err(e) => Some(Err(LlmError::Streaming(e.to_string()))),
            }
        });

        Ok(Box::pin(fragments))
    }
}
