//! Conversion between internal types and Anthropic Messages wire format

use crate::protocol::anthropic::{AnthropicContentBlock, AnthropicImageSource, AnthropicMessage, AnthropicRequest};
use crate::transform::Attachment;
use crate::types::CompletionParams;

/// Build a single-turn Messages request from a flattened prompt
///
/// Images precede the text block, which is the layout Anthropic
/// recommends for vision prompts.
pub fn prompt_to_anthropic_request(
    model: &str,
    prompt: &str,
    attachments: &[Attachment],
    params: &CompletionParams,
    default_max_tokens: u32,
    stream: bool,
) -> AnthropicRequest {
    let mut content: Vec<AnthropicContentBlock> = attachments
        .iter()
        .map(|a| AnthropicContentBlock::Image {
            source: AnthropicImageSource {
                source_type: "base64".to_owned(),
                media_type: a.mime_type.clone(),
                data: a.data.clone(),
            },
        })
        .collect();

    content.push(AnthropicContentBlock::Text {
        text: prompt.to_owned(),
    });

    AnthropicRequest {
        model: model.to_owned(),
        max_tokens: params.max_tokens.unwrap_or(default_max_tokens),
        messages: vec![AnthropicMessage {
            role: "user".to_owned(),
            content,
        }],
        // Anthropic caps temperature at 1.0
        temperature: params.temperature.map(|t| t.min(1.0)),
        top_p: params.top_p,
        stop_sequences: params.stop.clone(),
        stream: stream.then_some(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::anthropic::{AnthropicResponse, AnthropicStreamDelta, AnthropicStreamEvent};

    #[test]
    fn builds_request_with_default_max_tokens() {
        let params = CompletionParams {
            temperature: Some(1.7),
            ..CompletionParams::default()
        };

        let req = prompt_to_anthropic_request("claude-3-5-sonnet-20241022", "hi", &[], &params, 4096, false);
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["max_tokens"], 4096);
        assert_eq!(json["temperature"], 1.0);
        assert_eq!(json["messages"][0]["content"][0]["type"], "text");
        assert!(json.get("stream").is_none());
    }

    #[test]
    fn images_come_before_text() {
        let attachments = vec![Attachment {
            mime_type: "image/jpeg".to_owned(),
            data: "BBBB".to_owned(),
        }];

        let req = prompt_to_anthropic_request("m", "what is this", &attachments, &CompletionParams::default(), 1, true);
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["messages"][0]["content"][0]["source"]["media_type"], "image/jpeg");
        assert_eq!(json["messages"][0]["content"][1]["text"], "what is this");
        assert_eq!(json["stream"], true);
    }

    #[test]
    fn response_text_ignores_other_blocks() {
        let resp: AnthropicResponse = serde_json::from_value(serde_json::json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "model": "claude",
            "content": [
                {"type": "thinking", "thinking": "hmm", "signature": "x"},
                {"type": "text", "text": "4"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 3, "output_tokens": 1}
        }))
        .unwrap();

        assert_eq!(resp.text(), "4");
    }

    #[test]
    fn stream_events_tolerate_unknown_kinds() {
        let ping: AnthropicStreamEvent = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(ping, AnthropicStreamEvent::Other));

        let delta: AnthropicStreamEvent = serde_json::from_str(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#,
        )
        .unwrap();
        assert!(matches!(
            delta,
            AnthropicStreamEvent::ContentBlockDelta {
                delta: AnthropicStreamDelta::TextDelta { .. },
                ..
            }
        ));
    }
}
