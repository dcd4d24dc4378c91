//! Conversion between internal types and `OpenAI` wire format

use crate::error::LlmError;
use crate::protocol::openai::{
    OpenAiChoice, OpenAiChoiceMessage, OpenAiContent, OpenAiContentPart, OpenAiFunctionCall, OpenAiMessage,
    OpenAiRequest, OpenAiResponse, OpenAiStreamChoice, OpenAiStreamChunk, OpenAiStreamDelta,
    OpenAiStreamFunctionCall, OpenAiStreamToolCall, OpenAiTool, OpenAiToolCall, OpenAiUsage, UpstreamCompletion,
};
use crate::types::{
    ChatRequest, Choice, CompletionChunk, CompletionParams, CompletionResponse, Content, ContentPart,
    FunctionDefinition, Message, Role, ToolCall, ToolChoice, ToolChoiceFunction, ToolChoiceMode, ToolDefinition,
    Usage,
};

// -- Inbound: OpenAI wire format -> internal types --

impl TryFrom<OpenAiRequest> for ChatRequest {
    type Error = LlmError;

    fn try_from(req: OpenAiRequest) -> Result<Self, Self::Error> {
        let messages = req
            .messages
            .into_iter()
            .map(Message::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            model: req.model,
            messages,
            tools: req
                .tools
                .map(|tools| tools.into_iter().map(Into::into).collect())
                .unwrap_or_default(),
            tool_choice: req.tool_choice.and_then(|v| parse_openai_tool_choice(&v)),
            params: CompletionParams {
                temperature: req.temperature,
                top_p: req.top_p,
                max_tokens: req.max_tokens,
                stop: req.stop,
            },
            stream: req.stream.unwrap_or(false),
            include_usage: req.stream_options.is_some_and(|o| o.include_usage),
        })
    }
}

impl TryFrom<OpenAiMessage> for Message {
    type Error = LlmError;

    fn try_from(msg: OpenAiMessage) -> Result<Self, Self::Error> {
        let role = match msg.role.as_str() {
            "system" | "developer" => Role::System,
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "tool" | "function" => Role::Tool,
            other => return Err(LlmError::InvalidRequest(format!("unknown message role '{other}'"))),
        };

        if role == Role::Tool && msg.tool_call_id.as_deref().is_none_or(str::is_empty) {
            return Err(LlmError::InvalidRequest(
                "tool messages must carry a tool_call_id".to_owned(),
            ));
        }

        let content = msg.content.map(|content| match content {
            OpenAiContent::Text(text) => Content::Text(text),
            OpenAiContent::Parts(parts) => Content::Parts(parts.into_iter().map(Into::into).collect()),
        });

        let tool_calls = msg.tool_calls.map(|calls| {
            calls
                .into_iter()
                .map(|tc| ToolCall::new(tc.id, tc.function.name, tc.function.arguments))
                .collect()
        });

        Ok(Self {
            role,
            content,
            name: msg.name,
            tool_calls,
            tool_call_id: msg.tool_call_id,
        })
    }
}

impl From<OpenAiContentPart> for ContentPart {
    fn from(part: OpenAiContentPart) -> Self {
        match part {
            OpenAiContentPart::Text { text } => Self::Text { text },
            OpenAiContentPart::ImageUrl { image_url } => Self::Image { url: image_url.url },
        }
    }
}

impl From<OpenAiTool> for ToolDefinition {
    fn from(tool: OpenAiTool) -> Self {
        Self {
            tool_type: tool.tool_type,
            function: FunctionDefinition {
                name: tool.function.name,
                description: tool.function.description,
                parameters: tool.function.parameters,
            },
        }
    }
}

/// Parse `OpenAI`'s flexible `tool_choice` field into our internal type
fn parse_openai_tool_choice(value: &serde_json::Value) -> Option<ToolChoice> {
    match value {
        serde_json::Value::String(s) => match s.as_str() {
            "none" => Some(ToolChoice::Mode(ToolChoiceMode::None)),
            "auto" => Some(ToolChoice::Mode(ToolChoiceMode::Auto)),
            "required" => Some(ToolChoice::Mode(ToolChoiceMode::Required)),
            _ => None,
        },
        serde_json::Value::Object(_) => serde_json::from_value::<ToolChoiceFunction>(value.clone())
            .ok()
            .map(ToolChoice::Function),
        _ => None,
    }
}

// -- Outbound: internal types -> OpenAI wire format --

impl From<CompletionResponse> for OpenAiResponse {
    fn from(resp: CompletionResponse) -> Self {
        Self {
            id: resp.id,
            object: "chat.completion".to_owned(),
            created: resp.created,
            model: resp.model,
            choices: resp.choices.into_iter().map(Into::into).collect(),
            usage: resp.usage.map(Into::into),
        }
    }
}

impl From<Choice> for OpenAiChoice {
    fn from(choice: Choice) -> Self {
        let tool_calls = Some(choice.message.tool_calls)
            .filter(|calls| !calls.is_empty())
            .map(|calls| calls.into_iter().map(Into::into).collect());

        Self {
            index: choice.index,
            message: OpenAiChoiceMessage {
                role: "assistant".to_owned(),
                content: choice.message.content,
                tool_calls,
            },
            finish_reason: choice.finish_reason.map(|fr| fr.as_str().to_owned()),
        }
    }
}

impl From<ToolCall> for OpenAiToolCall {
    fn from(tc: ToolCall) -> Self {
        Self {
            id: tc.id,
            tool_type: "function".to_owned(),
            function: OpenAiFunctionCall {
                name: tc.function.name,
                arguments: tc.function.arguments,
            },
        }
    }
}

impl From<Usage> for OpenAiUsage {
    fn from(usage: Usage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

// -- Stream conversion --

/// Convert an internal chunk to an `OpenAI` stream chunk
pub fn chunk_to_openai(chunk: CompletionChunk, model: &str, created: u64) -> OpenAiStreamChunk {
    let tool_calls = chunk.tool_calls.map(|calls| {
        calls
            .into_iter()
            .map(|tc| OpenAiStreamToolCall {
                index: tc.index,
                tool_type: tc.id.as_ref().map(|_| "function".to_owned()),
                id: tc.id,
                function: tc.function.map(|f| OpenAiStreamFunctionCall {
                    name: f.name,
                    arguments: f.arguments,
                }),
            })
            .collect()
    });

    OpenAiStreamChunk {
        id: chunk.id,
        object: "chat.completion.chunk".to_owned(),
        created,
        model: model.to_owned(),
        choices: vec![OpenAiStreamChoice {
            index: 0,
            delta: OpenAiStreamDelta {
                role: chunk.role.map(|r| r.label().to_owned()),
                content: chunk.content,
                tool_calls,
            },
            finish_reason: chunk.finish_reason.map(|fr| fr.as_str().to_owned()),
        }],
        usage: None,
    }
}

/// Convert an internal `Usage` to an `OpenAI` stream chunk with usage data
pub fn usage_to_openai_chunk(usage: Usage, id: &str, model: &str, created: u64) -> OpenAiStreamChunk {
    OpenAiStreamChunk {
        id: id.to_owned(),
        object: "chat.completion.chunk".to_owned(),
        created,
        model: model.to_owned(),
        choices: vec![],
        usage: Some(usage.into()),
    }
}

// -- Outbound: prompt -> OpenAI-compatible upstream --

/// Build an upstream request carrying the flattened prompt as one user turn
pub fn prompt_to_openai_request(model: &str, prompt: &str, params: &CompletionParams, stream: bool) -> OpenAiRequest {
    OpenAiRequest {
        model: model.to_owned(),
        messages: vec![OpenAiMessage {
            role: "user".to_owned(),
            content: Some(OpenAiContent::Text(prompt.to_owned())),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }],
        temperature: params.temperature,
        top_p: params.top_p,
        max_tokens: params.max_tokens,
        stop: params.stop.clone(),
        stream: stream.then_some(true),
        tools: None,
        tool_choice: None,
        stream_options: None,
    }
}

/// Text of the first choice of an upstream response or stream chunk
pub fn upstream_text(completion: &UpstreamCompletion) -> Option<String> {
    let choice = completion.choices.first()?;

    choice
        .message
        .as_ref()
        .or(choice.delta.as_ref())
        .and_then(|text| text.content.clone())
        .filter(|text| !text.is_empty())
}
