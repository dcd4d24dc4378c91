//! GitHub Copilot chat provider
//!
//! Speaks the `OpenAI` chat completions format. The bearer token comes from
//! the auth profile when one is configured, else from `api_key`. Answers
//! are requested in one shot.

use std::sync::Arc;

use async_trait::async_trait;
use prism_config::LlmProviderConfig;
use prism_core::AuthStore;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::openai_compat::OpenAiCompatClient;
use super::{GenerationRequest, ProviderCapabilities, ProviderClient};
use crate::error::LlmError;

/// Default Copilot API base URL
const DEFAULT_BASE_URL: &str = "https://api.githubcopilot.com";

pub(crate) const DEFAULT_MODEL: &str = "gpt-4o";

/// Headers the Copilot API requires from editor integrations
const COPILOT_HEADERS: &[(&str, &str)] = &[
    ("Editor-Version", "vscode/1.95.0"),
    ("Editor-Plugin-Version", "copilot-chat/0.22.0"),
    ("Copilot-Integration-Id", "vscode-chat"),
];

/// GitHub Copilot provider
pub struct CopilotProvider {
    name: String,
    upstream: OpenAiCompatClient,
    profile: Option<String>,
    api_key: Option<SecretString>,
    auth: Arc<dyn AuthStore>,
    default_model: String,
    models: Vec<String>,
}

impl CopilotProvider {
    /// Create from provider configuration
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Configuration` if neither a profile nor an API key
    /// is configured.
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded default base URL is invalid (should never happen).
    pub fn new(name: String, config: &LlmProviderConfig, auth: Arc<dyn AuthStore>) -> Result<Self, LlmError> {
        if config.profile.is_none() && config.api_key.is_none() {
            return Err(LlmError::Configuration(format!(
                "provider {name} requires an auth profile or an api_key"
            )));
        }

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| Url::parse(DEFAULT_BASE_URL).expect("valid default URL"));

        Ok(Self {
            name,
            upstream: OpenAiCompatClient::new(base_url, COPILOT_HEADERS),
            profile: config.profile.clone(),
            api_key: config.api_key.clone(),
            auth,
            default_model: config.default_model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            models: config.models.clone(),
        })
    }

    fn bearer(&self) -> Result<String, LlmError> {
        let from_profile = self
            .profile
            .as_deref()
            .and_then(|profile| self.auth.get_credential(profile))
            .and_then(|credential| credential.token)
            .map(|token| token.expose_secret().to_owned());

        from_profile
            .or_else(|| self.api_key.as_ref().map(|key| key.expose_secret().to_owned()))
            .ok_or_else(|| {
                tracing::warn!(provider = %self.name, "no Copilot token available");
                LlmError::Upstream(format!("no token available for {}", self.name))
            })
    }
}

#[async_trait]
impl ProviderClient for CopilotProvider {
    fn name(&self) -> &str {
        &self.name
    }


    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: false,
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
        let token = self.bearer()?;
        self.upstream.generate(&self.name, request, Some(&token)).await
    }
}
