//! Canonical request, response and stream types
//!
//! Wire formats in [`crate::protocol`] convert to and from these.

pub mod message;
pub mod request;
pub mod response;
pub mod stream;
pub mod tool;

pub use message::{Content, ContentPart, FunctionCall, Message, Role, ToolCall};
pub use request::{ChatRequest, CompletionParams};
pub use response::{Choice, ChoiceMessage, CompletionResponse, FinishReason, Usage};
pub use stream::{CompletionChunk, StreamEvent, StreamFunctionCall, StreamToolCall};
pub use tool::{FunctionDefinition, ToolChoice, ToolChoiceFunction, ToolChoiceFunctionName, ToolChoiceMode, ToolDefinition};
