use serde::{Deserialize, Serialize};

use super::message::Role;
use super::response::{FinishReason, Usage};

/// Item of a streamed completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamEvent {
    /// Incremental chunk of the single choice
    Chunk(CompletionChunk),
    /// Usage statistics, sent after the last chunk when requested
    Usage(Usage),
    /// Stream has completed
    Done,
}

/// One incremental piece of a streamed response
///
/// All chunks of a response share `id`; only the last one carries
/// `finish_reason`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionChunk {
    /// Response identifier shared by all chunks
    pub id: String,
    /// Role, present on the first chunk only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Incremental text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Tool call fragments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<StreamToolCall>>,
    /// Reason generation finished (present on final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl CompletionChunk {
    /// Chunk with an empty delta
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: None,
            content: None,
            tool_calls: None,
            finish_reason: None,
        }
    }
}

/// Tool call data within a chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamToolCall {
    /// Index of this tool call in the `tool_calls` array
    pub index: u32,
    /// Tool call ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Function call data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<StreamFunctionCall>,
}

/// Function call data within a streaming tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFunctionCall {
    /// Function name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Arguments JSON text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}
