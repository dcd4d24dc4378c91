#![allow(clippy::must_use_candidate)]

pub mod auth;
pub mod cors;
mod env;
pub mod health;
pub mod llm;
mod loader;
pub mod server;
pub mod telemetry;

use serde::Deserialize;

pub use auth::*;
pub use cors::*;
pub use health::*;
pub use llm::*;
pub use server::*;
pub use telemetry::TelemetryConfig;

/// Top-level Prism configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// LLM provider, alias and dispatch configuration
    #[serde(default)]
    pub llm: LlmConfig,
    /// Credential profiles consumed by cookie and token based providers
    #[serde(default)]
    pub auth: AuthConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
