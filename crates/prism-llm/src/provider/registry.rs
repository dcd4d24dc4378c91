use std::sync::Arc;

use indexmap::IndexMap;
use prism_config::{LlmConfig, LlmProviderType, ProviderTag};
use prism_core::AuthStore;

use super::ProviderClient;
use super::anthropic::AnthropicProvider;
use super::copilot::CopilotProvider;
use super::gemini::GeminiProvider;
use super::gemini_cookie::GeminiCookieProvider;
use super::passthrough::PassthroughProvider;
use crate::error::LlmError;

/// Provider clients keyed by the family they serve
///
/// Built once at startup and read concurrently afterwards. At most one
/// client serves each family.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: IndexMap<ProviderTag, Arc<dyn ProviderClient>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.clients.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderRegistry {
    /// Build every configured provider
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Configuration` if no provider is configured, two
    /// providers serve the same family or a provider is missing required
    /// settings.
    pub fn from_config(config: &LlmConfig, auth: &Arc<dyn AuthStore>) -> Result<Self, LlmError> {
        if config.providers.is_empty() {
            return Err(LlmError::Configuration("no LLM providers configured".to_owned()));
        }

        let mut registry = Self::empty();

        for (name, provider_config) in &config.providers {
            let client: Arc<dyn ProviderClient> = match provider_config.provider_type {
                LlmProviderType::GeminiApiKey => Arc::new(GeminiProvider::new(name.clone(), provider_config)?),
                LlmProviderType::GeminiCookie => Arc::new(GeminiCookieProvider::new(
                    name.clone(),
                    provider_config,
                    Arc::clone(auth),
                )?),
                LlmProviderType::Anthropic => Arc::new(AnthropicProvider::new(name.clone(), provider_config)?),
                LlmProviderType::Copilot => {
                    Arc::new(CopilotProvider::new(name.clone(), provider_config, Arc::clone(auth))?)
                }
                LlmProviderType::Passthrough => Arc::new(PassthroughProvider::new(name.clone(), provider_config)),
            };

            let tag = provider_config.provider_type.tag();
            if registry.is_configured(tag) {
                return Err(LlmError::Configuration(format!(
                    "provider {name} serves {tag}, which is already configured"
                )));
            }

            tracing::info!(
                provider = %name,
                family = %tag,
                default_model = client.default_model(),
                "registered LLM provider"
            );

            registry.insert(tag, client);
        }

        Ok(registry)
    }

    /// Registry without providers
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register a client for a family, replacing any previous one
    pub fn insert(&mut self, tag: ProviderTag, client: Arc<dyn ProviderClient>) {
        self.clients.insert(tag, client);
    }

    /// Client serving a family
    pub fn get(&self, tag: ProviderTag) -> Option<Arc<dyn ProviderClient>> {
        self.clients.get(&tag).cloned()
    }

    pub fn is_configured(&self, tag: ProviderTag) -> bool {
        self.clients.contains_key(&tag)
    }

    /// Configured families in registration order
    pub fn tags(&self) -> Vec<ProviderTag> {
        self.clients.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProviderTag, &Arc<dyn ProviderClient>)> {
        self.clients.iter().map(|(tag, client)| (*tag, client))
    }
}
