//! Chat history flattening
//!
//! Backends reached through this gateway take one prompt string. The
//! message list is rendered as system text, an optional tool instruction
//! block and `role: content` dialogue lines, separated by blank lines.
//! Tool calling is emulated by the instruction block and recovered from
//! the answer by [`crate::recovery`].

use std::fmt::Write as _;

use crate::error::LlmError;
use crate::types::{ChatRequest, Message, Role, ToolChoice, ToolChoiceMode, ToolDefinition};

/// Binary content forwarded next to the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// MIME type taken from the data URI
    pub mime_type: String,
    /// Base64 payload
    pub data: String,
}

/// Flatten messages and tool definitions into one prompt
pub fn flatten(messages: &[Message], tools: &[ToolDefinition]) -> String {
    flatten_with(messages, tools, None)
}

/// Flatten with a tool choice directive
pub fn flatten_with(messages: &[Message], tools: &[ToolDefinition], tool_choice: Option<&ToolChoice>) -> String {
    let system = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(Message::text_content)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let tool_block = if tools.is_empty() {
        String::new()
    } else {
        tool_instructions(tools, tool_choice)
    };

    let dialogue = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role != Role::System)
        .map(|(idx, m)| render_message(m, &messages[..idx]))
        .collect::<Vec<_>>()
        .join("\n");

    [system, tool_block, dialogue]
        .into_iter()
        .filter(|block| !block.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Validate a request and build its prompt
///
/// # Errors
///
/// Returns [`LlmError::InvalidRequest`] for an empty message list, an
/// out-of-range temperature or a prompt that flattens to blank text.
pub fn prompt_for(request: &ChatRequest) -> Result<String, LlmError> {
    if request.messages.is_empty() {
        return Err(LlmError::InvalidRequest("messages must not be empty".to_owned()));
    }

    if let Some(temperature) = request.params.temperature
        && !(0.0..=2.0).contains(&temperature)
    {
        return Err(LlmError::InvalidRequest(format!(
            "temperature must be between 0 and 2, got {temperature}"
        )));
    }

    let prompt = flatten_with(&request.messages, request.active_tools(), request.tool_choice.as_ref());

    if prompt.trim().is_empty() {
        return Err(LlmError::InvalidRequest("prompt is empty after flattening".to_owned()));
    }

    Ok(prompt)
}

/// Inline images carried as `data:` URIs, in message order
///
/// Remote image URLs are not fetched and are skipped.
pub fn attachments(messages: &[Message]) -> Vec<Attachment> {
    messages
        .iter()
        .filter_map(|m| m.content.as_ref())
        .flat_map(|content| content.image_urls())
        .filter_map(|url| {
            let parsed = parse_data_uri(url);
            if parsed.is_none() {
                tracing::debug!("skipping non-inline image reference");
            }
            parsed
        })
        .collect()
}

fn parse_data_uri(url: &str) -> Option<Attachment> {
    let rest = url.strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    let mime_type = header.strip_suffix(";base64")?;

    if mime_type.is_empty() || data.is_empty() {
        return None;
    }

    Some(Attachment {
        mime_type: mime_type.to_owned(),
        data: data.to_owned(),
    })
}

fn render_message(message: &Message, earlier: &[Message]) -> String {
    let text = message.text_content();

    match message.role {
        Role::Tool => {
            let id = message.tool_call_id.as_deref().unwrap_or_default();
            let name = message
                .name
                .as_deref()
                .or_else(|| tool_name_for(id, earlier))
                .unwrap_or("unknown");

            format!("tool: [Tool result for {name} (id: {id})]\n{text}")
        }
        Role::Assistant => match message.tool_calls.as_deref() {
            Some(calls) if !calls.is_empty() => {
                let rendered = calls
                    .iter()
                    .map(|c| format!("Called {}({}) (id={})", c.function.name, c.function.arguments, c.id))
                    .collect::<Vec<_>>()
                    .join(", ");

                if text.is_empty() {
                    format!("assistant: [Tool calls: {rendered}]")
                } else {
                    format!("assistant: {text}\nassistant: [Tool calls: {rendered}]")
                }
            }
            _ => format!("assistant: {text}"),
        },
        role => format!("{}: {text}", role.label()),
    }
}

fn tool_name_for<'a>(id: &str, earlier: &'a [Message]) -> Option<&'a str> {
    earlier
        .iter()
        .rev()
        .filter_map(|m| m.tool_calls.as_deref())
        .flatten()
        .find(|call| call.id == id)
        .map(|call| call.function.name.as_str())
}

fn tool_instructions(tools: &[ToolDefinition], tool_choice: Option<&ToolChoice>) -> String {
    let mut block = String::from(
        "You have access to the following tools. To call one or more tools, reply with a single JSON object \
         in exactly this shape:\n\
         {\"tool_calls\":[{\"id\":\"call_1\",\"type\":\"function\",\"function\":{\"name\":\"<tool name>\",\"arguments\":\"<JSON-encoded arguments object>\"}}]}\n\
         Do not wrap the JSON in prose. If no tool is needed, answer normally without any JSON.",
    );

    match tool_choice {
        Some(ToolChoice::Mode(ToolChoiceMode::Required)) => {
            block.push_str("\nYou must call at least one tool.");
        }
        Some(ToolChoice::Function(forced)) => {
            let _ = write!(block, "\nYou must call the `{}` tool.", forced.function.name);
        }
        _ => {}
    }

    let listing = serde_json::to_string_pretty(tools).unwrap_or_default();
    let _ = write!(block, "\n\nAvailable tools:\n{listing}");

    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        CompletionParams, Content, ContentPart, FunctionDefinition, ToolCall, ToolChoiceFunction,
        ToolChoiceFunctionName,
    };

    fn weather_tool() -> ToolDefinition {
        ToolDefinition {
            tool_type: "function".to_owned(),
            function: FunctionDefinition {
                name: "get_weather".to_owned(),
                description: Some("Current weather".to_owned()),
                parameters: Some(serde_json::json!({
                    "type": "object",
                    "properties": {"city": {"type": "string"}},
                    "required": ["city"]
                })),
            },
        }
    }

    fn request(messages: Vec<Message>) -> ChatRequest {
        ChatRequest {
            model: String::new(),
            messages,
            tools: Vec::new(),
            tool_choice: None,
            params: CompletionParams::default(),
            stream: false,
            include_usage: false,
        }
    }

    #[test]
    fn system_then_dialogue() {
        let messages = vec![
            Message::text(Role::System, "Be terse."),
            Message::text(Role::User, "2+2?"),
        ];

        assert_eq!(flatten(&messages, &[]), "Be terse.\n\nuser: 2+2?");
    }

    #[test]
    fn system_messages_are_hoisted_in_order() {
        let messages = vec![
            Message::text(Role::User, "hi"),
            Message::text(Role::System, "first"),
            Message::text(Role::Assistant, "hello"),
            Message::text(Role::System, "second"),
        ];

        assert_eq!(flatten(&messages, &[]), "first\nsecond\n\nuser: hi\nassistant: hello");
    }

    #[test]
    fn only_text_parts_are_rendered() {
        let messages = vec![Message {
            role: Role::User,
            content: Some(Content::Parts(vec![
                ContentPart::Text { text: "look".to_owned() },
                ContentPart::Image {
                    url: "data:image/png;base64,AAAA".to_owned(),
                },
                ContentPart::Text { text: "here".to_owned() },
            ])),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }];

        assert_eq!(flatten(&messages, &[]), "user: look\nhere");
        assert_eq!(
            attachments(&messages),
            vec![Attachment {
                mime_type: "image/png".to_owned(),
                data: "AAAA".to_owned()
            }]
        );
    }

    #[test]
    fn tool_block_sits_between_system_and_dialogue() {
        let messages = vec![
            Message::text(Role::System, "sys"),
            Message::text(Role::User, "weather in Paris?"),
        ];

        let prompt = flatten(&messages, &[weather_tool()]);
        let blocks: Vec<&str> = prompt.split("\n\n").collect();

        assert_eq!(blocks.first(), Some(&"sys"));
        assert_eq!(blocks.last(), Some(&"user: weather in Paris?"));
        assert!(prompt.contains("\"tool_calls\""));
        assert!(prompt.contains("\"get_weather\""));
    }

    #[test]
    fn tool_history_is_rendered() {
        let mut assistant = Message::text(Role::Assistant, "");
        assistant.tool_calls = Some(vec![ToolCall::new("call_1", "get_weather", r#"{"city":"Paris"}"#)]);

        let mut result = Message::text(Role::Tool, "18C");
        result.tool_call_id = Some("call_1".to_owned());

        let messages = vec![Message::text(Role::User, "weather?"), assistant, result];

        assert_eq!(
            flatten(&messages, &[]),
            "user: weather?\n\
             assistant: [Tool calls: Called get_weather({\"city\":\"Paris\"}) (id=call_1)]\n\
             tool: [Tool result for get_weather (id: call_1)]\n18C"
        );
    }

    #[test]
    fn unmatched_tool_result_is_unknown() {
        let mut result = Message::text(Role::Tool, "ok");
        result.tool_call_id = Some("call_9".to_owned());

        assert_eq!(flatten(&[result], &[]), "tool: [Tool result for unknown (id: call_9)]\nok");
    }

    #[test]
    fn forced_function_adds_directive() {
        let choice = ToolChoice::Function(ToolChoiceFunction {
            tool_type: "function".to_owned(),
            function: ToolChoiceFunctionName {
                name: "get_weather".to_owned(),
            },
        });

        let prompt = flatten_with(&[Message::text(Role::User, "x")], &[weather_tool()], Some(&choice));
        assert!(prompt.contains("You must call the `get_weather` tool."));
    }

    #[test]
    fn flatten_is_deterministic() {
        let messages = vec![
            Message::text(Role::System, "s"),
            Message::text(Role::User, "u"),
        ];
        let tools = vec![weather_tool()];

        assert_eq!(flatten(&messages, &tools), flatten(&messages, &tools));
    }

    #[test]
    fn rejects_empty_messages() {
        assert!(matches!(prompt_for(&request(Vec::new())), Err(LlmError::InvalidRequest(_))));
    }

    #[test]
    fn rejects_blank_prompt() {
        let req = request(vec![Message::text(Role::System, "")]);
        assert!(matches!(prompt_for(&req), Err(LlmError::InvalidRequest(_))));
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let mut req = request(vec![Message::text(Role::User, "hi")]);
        req.params.temperature = Some(2.5);

        assert!(matches!(prompt_for(&req), Err(LlmError::InvalidRequest(_))));
    }

    #[test]
    fn tool_choice_none_drops_tool_block() {
        let mut req = request(vec![Message::text(Role::User, "hi")]);
        req.tools = vec![weather_tool()];
        req.tool_choice = Some(ToolChoice::Mode(ToolChoiceMode::None));

        assert_eq!(prompt_for(&req).unwrap(), "user: hi");
    }

    #[test]
    fn remote_images_are_not_attachments() {
        let messages = vec![Message {
            role: Role::User,
            content: Some(Content::Parts(vec![ContentPart::Image {
                url: "https://example.com/cat.png".to_owned(),
            }])),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }];

        assert!(attachments(&messages).is_empty());
    }
}
