//! Programmatic configuration builder for integration tests

use std::net::SocketAddr;

use prism_config::{
    AliasConfig, Config, CorsConfig, HealthConfig, LlmConfig, LlmProviderConfig, LlmProviderType, ProviderTag,
    ServerConfig,
};
use secrecy::SecretString;

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with minimal defaults
    ///
    /// Synthetic streams are unpaced so tests run quickly.
    pub fn new() -> Self {
        let mut llm = LlmConfig::default();
        llm.streaming.chunk_delay_ms = 0;

        Self {
            config: Config {
                server: ServerConfig {
                    listen_address: Some(SocketAddr::from(([127, 0, 0, 1], 0))),
                    health: HealthConfig::default(),
                    cors: None,
                },
                llm,
                ..Config::default()
            },
        }
    }

    /// Add a Gemini API-key provider pointed at a mock backend
    pub fn with_gemini_provider(self, name: &str, base_url: &str) -> Self {
        self.with_provider(name, LlmProviderType::GeminiApiKey, base_url)
    }

    /// Add an `OpenAI`-compatible passthrough provider pointed at a mock backend
    pub fn with_passthrough_provider(self, name: &str, base_url: &str) -> Self {
        self.with_provider(name, LlmProviderType::Passthrough, base_url)
    }

    fn with_provider(mut self, name: &str, provider_type: LlmProviderType, base_url: &str) -> Self {
        self.config.llm.providers.insert(
            name.to_owned(),
            LlmProviderConfig {
                provider_type,
                api_key: Some(SecretString::from("test-key")),
                base_url: Some(base_url.parse().expect("valid URL")),
                profile: None,
                default_model: None,
                max_tokens: None,
                models: Vec::new(),
            },
        );
        self
    }

    /// Route a client model name to a provider family
    pub fn with_alias(mut self, name: &str, provider: ProviderTag, model: &str) -> Self {
        self.config.llm.aliases.push(AliasConfig {
            name: name.to_owned(),
            provider,
            model: model.to_owned(),
        });
        self
    }

    /// Family serving unknown model names
    pub fn with_default_provider(mut self, provider: ProviderTag) -> Self {
        self.config.llm.default_provider = Some(provider);
        self
    }

    /// Deadline for each provider call
    pub fn with_call_timeout(mut self, timeout: &str) -> Self {
        timeout.clone_into(&mut self.config.llm.call_timeout);
        self
    }

    /// Maximum gap between fragments of a native stream
    pub fn with_stream_idle_timeout(mut self, timeout: &str) -> Self {
        timeout.clone_into(&mut self.config.llm.stream_idle_timeout);
        self
    }

    /// Set CORS configuration
    pub fn with_cors(mut self, config: CorsConfig) -> Self {
        self.config.server.cors = Some(config);
        self
    }

    /// Disable health endpoint
    pub fn without_health(mut self) -> Self {
        self.config.server.health.enabled = false;
        self
    }

    /// Build the final config, validated like a loaded file
    pub fn build(self) -> Config {
        self.config.validate().expect("valid test config");
        self.config
    }
}
