//! Conversion between internal types and Google Generative Language wire format

use crate::protocol::google::{GoogleContent, GoogleGenerationConfig, GooglePart, GoogleRequest, GoogleResponse};
use crate::transform::Attachment;
use crate::types::CompletionParams;

/// Build a single-turn request from a flattened prompt
///
/// Attachments follow the text part in their original order.
pub fn prompt_to_google_request(prompt: &str, attachments: &[Attachment], params: &CompletionParams) -> GoogleRequest {
    let mut parts = Vec::with_capacity(1 + attachments.len());
    parts.push(GooglePart::text(prompt));
    parts.extend(
        attachments
            .iter()
            .map(|a| GooglePart::inline_data(a.mime_type.clone(), a.data.clone())),
    );

    let generation_config = Some(GoogleGenerationConfig {
        temperature: params.temperature,
        top_p: params.top_p,
        max_output_tokens: params.max_tokens,
        stop_sequences: params.stop.clone(),
    })
    .filter(|c| c.temperature.is_some() || c.top_p.is_some() || c.max_output_tokens.is_some() || c.stop_sequences.is_some());

    GoogleRequest {
        contents: vec![GoogleContent {
            role: Some("user".to_owned()),
            parts,
        }],
        generation_config,
    }
}

/// Answer text of the first candidate, reasoning parts skipped
pub fn google_response_text(resp: &GoogleResponse) -> String {
    resp.candidates
        .first()
        .map(|candidate| {
            candidate
                .content
                .parts
                .iter()
                .filter(|p| p.thought != Some(true))
                .filter_map(|p| p.text.as_deref())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_prompt_then_attachments() {
        let attachments = vec![Attachment {
            mime_type: "image/png".to_owned(),
            data: "AAAA".to_owned(),
        }];

        let req = prompt_to_google_request("describe", &attachments, &CompletionParams::default());
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "describe");
        assert_eq!(json["contents"][0]["parts"][1]["inlineData"]["mimeType"], "image/png");
        assert!(json.get("generationConfig").is_none());
    }

    #[test]
    fn generation_config_only_when_params_set() {
        let params = CompletionParams {
            temperature: Some(0.2),
            ..CompletionParams::default()
        };

        let json = serde_json::to_value(prompt_to_google_request("x", &[], &params)).unwrap();
        assert_eq!(json["generationConfig"]["temperature"], 0.2);
    }

    #[test]
    fn response_text_skips_thoughts() {
        let resp: GoogleResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "thinking...", "thought": true},
                    {"text": "Hello "},
                    {"text": "world"}
                ]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();

        assert_eq!(google_response_text(&resp), "Hello world");
    }

    #[test]
    fn blocked_candidate_yields_empty_text() {
        let resp: GoogleResponse =
            serde_json::from_value(serde_json::json!({"candidates": [{"finishReason": "SAFETY"}]})).unwrap();
        assert_eq!(google_response_text(&resp), "");
    }
}
