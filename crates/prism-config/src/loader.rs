use std::collections::HashMap;
use std::path::Path;

use crate::{Config, LlmProviderType};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::parse(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing or validation fails
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error describing the first inconsistency found
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_providers()?;
        self.validate_aliases()?;
        self.validate_dispatch()?;
        Ok(())
    }

    /// One provider per family, each with the credentials its variant needs
    fn validate_providers(&self) -> anyhow::Result<()> {
        if self.llm.providers.is_empty() {
            anyhow::bail!("at least one LLM provider must be configured");
        }

        let mut seen = HashMap::new();

        for (name, provider) in &self.llm.providers {
            let tag = provider.provider_type.tag();
            if let Some(previous) = seen.insert(tag, name) {
                anyhow::bail!("providers '{previous}' and '{name}' both serve the '{tag}' family");
            }

            if let Some(ref profile) = provider.profile
                && !self.auth.profiles.contains_key(profile)
            {
                anyhow::bail!("provider '{name}' references unknown auth profile '{profile}'");
            }

            match provider.provider_type {
                LlmProviderType::GeminiCookie if provider.profile.is_none() || provider.base_url.is_none() => {
                    anyhow::bail!("provider '{name}' of type gemini_cookie requires a profile and a base_url");
                }
                LlmProviderType::Copilot if provider.profile.is_none() && provider.api_key.is_none() => {
                    anyhow::bail!("provider '{name}' of type copilot requires an api_key or a profile");
                }
                _ => {}
            }

            if provider.max_tokens == Some(0) {
                anyhow::bail!("provider '{name}' max_tokens must be greater than 0");
            }
        }

        if let Some(tag) = self.llm.default_provider
            && !seen.contains_key(&tag)
        {
            anyhow::bail!("default_provider '{tag}' has no configured provider");
        }

        Ok(())
    }

    /// Configured aliases must target configured families
    fn validate_aliases(&self) -> anyhow::Result<()> {
        for alias in &self.llm.aliases {
            if alias.name.trim().is_empty() {
                anyhow::bail!("alias names must not be empty");
            }

            if alias.model.trim().is_empty() {
                anyhow::bail!("alias '{}' must name a backend model", alias.name);
            }

            let served = self
                .llm
                .providers
                .values()
                .any(|p| p.provider_type.tag() == alias.provider);

            if !served {
                anyhow::bail!(
                    "alias '{}' targets provider '{}' which is not configured",
                    alias.name,
                    alias.provider
                );
            }
        }

        Ok(())
    }

    /// Pool sizing, deadlines and stream cadence
    fn validate_dispatch(&self) -> anyhow::Result<()> {
        self.llm.call_timeout()?;
        self.llm.stream_idle_timeout()?;
        self.llm.queue_timeout()?;

        if self.llm.max_concurrent_calls == 0 {
            anyhow::bail!("llm.max_concurrent_calls must be greater than 0");
        }

        if self.llm.streaming.words_per_chunk == 0 {
            anyhow::bail!("llm.streaming.words_per_chunk must be greater than 0");
        }

        if self.llm.streaming.max_sentence_chars == 0 {
            anyhow::bail!("llm.streaming.max_sentence_chars must be greater than 0");
        }

        Ok(())
    }
}
