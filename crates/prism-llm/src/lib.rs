//! Protocol translation engine for Prism
//!
//! Accepts `OpenAI` chat completion requests, dispatches them to one of
//! several structurally different backends, recovers tool calls from
//! free-text output and answers with `OpenAI`-shaped responses or
//! server-sent event streams.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod alias;
pub mod auth;
pub mod convert;
pub mod error;
pub mod gateway;
#[cfg(feature = "http")]
pub mod handler;
pub mod pool;
pub mod protocol;
pub mod provider;
pub mod recovery;
pub mod stream;
pub mod transform;
pub mod types;
pub mod usage;

pub use alias::{AliasTable, ResolvedModel};
pub use error::LlmError;
pub use gateway::LlmState;
#[cfg(feature = "http")]
pub use handler::llm_router;
pub use provider::{GenerationRequest, ProviderCapabilities, ProviderClient, ProviderRegistry};
pub use types::{ChatRequest, CompletionResponse, StreamEvent};
