use serde::{Deserialize, Serialize};

use super::message::Message;
use super::tool::{ToolChoice, ToolDefinition};

/// Sampling parameters forwarded to backends that accept them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionParams {
    /// Sampling temperature (0.0 to 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

/// Chat completion request after wire decoding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Client-facing model name, possibly empty
    pub model: String,
    /// Conversation messages in order
    pub messages: Vec<Message>,
    /// Tool definitions available to the model
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    /// How the model should select tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Generation parameters
    #[serde(default)]
    pub params: CompletionParams,
    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,
    /// Emit a usage chunk before the end of the stream
    #[serde(default)]
    pub include_usage: bool,
}

impl ChatRequest {
    /// Tools the model may call, empty when `tool_choice` is "none"
    pub fn active_tools(&self) -> &[ToolDefinition] {
        if self.tool_choice.as_ref().is_some_and(ToolChoice::is_none) {
            &[]
        } else {
            &self.tools
        }
    }
}
