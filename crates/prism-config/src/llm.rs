use std::fmt;
use std::time::Duration;

use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Top-level LLM configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Provider family that serves unknown model names
    ///
    /// Defaults to the family of the first configured provider.
    #[serde(default)]
    pub default_provider: Option<ProviderTag>,
    /// Model used when a request omits `model`
    #[serde(default)]
    pub default_model: Option<String>,
    /// Deadline for a single provider call (e.g. "30s")
    #[serde(default = "default_call_timeout")]
    pub call_timeout: String,
    /// Maximum gap between two fragments of a native stream
    #[serde(default = "default_call_timeout")]
    pub stream_idle_timeout: String,
    /// How long a request may wait for a free call slot
    #[serde(default = "default_queue_timeout")]
    pub queue_timeout: String,
    /// Upper bound on provider calls in flight across all requests
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,
    /// Synthetic streaming cadence
    #[serde(default)]
    pub streaming: StreamingConfig,
    /// Provider configurations keyed by name
    #[serde(default)]
    pub providers: IndexMap<String, LlmProviderConfig>,
    /// Model aliases consulted before the built-in table
    #[serde(default)]
    pub aliases: Vec<AliasConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: None,
            default_model: None,
            call_timeout: default_call_timeout(),
            stream_idle_timeout: default_call_timeout(),
            queue_timeout: default_queue_timeout(),
            max_concurrent_calls: default_max_concurrent_calls(),
            streaming: StreamingConfig::default(),
            providers: IndexMap::new(),
            aliases: Vec::new(),
        }
    }
}

impl LlmConfig {
    /// Effective default provider family
    pub fn default_provider_tag(&self) -> Option<ProviderTag> {
        self.default_provider
            .or_else(|| self.providers.values().next().map(|p| p.provider_type.tag()))
    }

    /// Parsed provider call deadline
    ///
    /// # Errors
    ///
    /// Returns an error if the duration string is malformed
    pub fn call_timeout(&self) -> anyhow::Result<Duration> {
        parse_duration("llm.call_timeout", &self.call_timeout)
    }

    /// Parsed idle timeout between native stream fragments
    ///
    /// # Errors
    ///
    /// Returns an error if the duration string is malformed
    pub fn stream_idle_timeout(&self) -> anyhow::Result<Duration> {
        parse_duration("llm.stream_idle_timeout", &self.stream_idle_timeout)
    }

    /// Parsed admission queue timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the duration string is malformed
    pub fn queue_timeout(&self) -> anyhow::Result<Duration> {
        parse_duration("llm.queue_timeout", &self.queue_timeout)
    }
}

fn parse_duration(field: &str, value: &str) -> anyhow::Result<Duration> {
    let duration =
        duration_str::parse(value).map_err(|e| anyhow::anyhow!("invalid duration for {field} '{value}': {e}"))?;

    if duration.is_zero() {
        anyhow::bail!("{field} must be greater than zero");
    }

    Ok(duration)
}

fn default_call_timeout() -> String {
    "30s".to_owned()
}

fn default_queue_timeout() -> String {
    "10s".to_owned()
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_concurrent_calls() -> usize {
    64
}

/// Cadence of synthetic streams built from one-shot responses
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamingConfig {
    /// Pause between two synthetic chunks in milliseconds
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
    /// Words per chunk when a sentence is too long to send whole
    #[serde(default = "default_words_per_chunk")]
    pub words_per_chunk: usize,
    /// Longest sentence sent as a single chunk
    #[serde(default = "default_max_sentence_chars")]
    pub max_sentence_chars: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_delay_ms: default_chunk_delay_ms(),
            words_per_chunk: default_words_per_chunk(),
            max_sentence_chars: default_max_sentence_chars(),
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_chunk_delay_ms() -> u64 {
    10
}

#[allow(clippy::missing_const_for_fn)]
fn default_words_per_chunk() -> usize {
    5
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_sentence_chars() -> usize {
    160
}

/// Configuration for a single LLM provider
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmProviderConfig {
    /// Provider variant
    #[serde(rename = "type")]
    pub provider_type: LlmProviderType,
    /// API key for authentication
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Auth profile holding cookies or tokens for this provider
    #[serde(default)]
    pub profile: Option<String>,
    /// Model used when the default provider receives an empty model name
    #[serde(default)]
    pub default_model: Option<String>,
    /// Output token cap sent to backends that require one
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Extra backend model ids advertised on `/v1/models`
    #[serde(default)]
    pub models: Vec<String>,
}

/// Supported provider variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProviderType {
    /// Google Generative Language API with an API key
    GeminiApiKey,
    /// Gemini reached with browser session cookies
    GeminiCookie,
    /// Anthropic Messages API
    Anthropic,
    /// GitHub Copilot chat API
    Copilot,
    /// Any `OpenAI`-compatible endpoint
    Passthrough,
}

impl LlmProviderType {
    /// Provider family served by this variant
    pub const fn tag(self) -> ProviderTag {
        match self {
            Self::GeminiApiKey | Self::GeminiCookie => ProviderTag::Gemini,
            Self::Anthropic => ProviderTag::Anthropic,
            Self::Copilot => ProviderTag::Copilot,
            Self::Passthrough => ProviderTag::Passthrough,
        }
    }
}

/// Provider family that model aliases route to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderTag {
    Gemini,
    Anthropic,
    Copilot,
    Passthrough,
}

impl ProviderTag {
    pub const ALL: [Self; 4] = [Self::Gemini, Self::Anthropic, Self::Copilot, Self::Passthrough];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Anthropic => "anthropic",
            Self::Copilot => "copilot",
            Self::Passthrough => "passthrough",
        }
    }

    /// Parse a tag from the prefix of an explicit `tag/model` name
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.as_str() == prefix)
    }
}

impl fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A client-facing model name mapped to a provider family and backend model
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AliasConfig {
    /// Name clients send in `model`
    pub name: String,
    /// Provider family that serves the alias
    pub provider: ProviderTag,
    /// Backend model identifier
    pub model: String,
}
