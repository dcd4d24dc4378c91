//! Passthrough to any `OpenAI`-compatible gateway

use async_trait::async_trait;
use prism_config::LlmProviderConfig;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::openai_compat::OpenAiCompatClient;
use super::{FragmentStream, GenerationRequest, ProviderCapabilities, ProviderClient};
use crate::error::LlmError;

/// Default local gateway base URL
const DEFAULT_BASE_URL: &str = "http://localhost:8080/v1";

pub(crate) const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// `OpenAI`-compatible passthrough provider
pub struct PassthroughProvider {
    name: String,
    upstream: OpenAiCompatClient,
    api_key: Option<SecretString>,
    default_model: String,
    models: Vec<String>,
}

impl PassthroughProvider {
    /// Create from provider configuration
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded default base URL is invalid (should never happen).
    pub fn new(name: String, config: &LlmProviderConfig) -> Self {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| Url::parse(DEFAULT_BASE_URL).expect("valid default URL"));

        Self {
            name,
            upstream: OpenAiCompatClient::new(base_url, &[]),
            api_key: config.api_key.clone(),
            default_model: config.default_model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            models: config.models.clone(),
        }
    }

    fn bearer(&self) -> Option<&str> {
        self.api_key.as_ref().map(ExposeSecret::expose_secret)
    }
}

#[async_trait]
impl ProviderClient for PassthroughProvider {
    fn name(&self) -> &str {
        &self.name
    }


    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: true,
            attachments: false,
        }
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn models(&self) -> &[String] {
        &self.models
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        self.upstream.generate(&self.name, request, self.bearer()).await
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> Result<FragmentStream, LlmError> {
        self.upstream.generate_stream(&self.name, request, self.bearer()).await
    }
}
