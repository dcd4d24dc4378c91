//! Tool-call recovery from free-text model output
//!
//! Backends reached with a flattened prompt answer in plain text. When the
//! prompt asked for tool calls, the answer is expected to contain a JSON
//! object with a `tool_calls` array somewhere in it, possibly surrounded by
//! prose, fenced, truncated or slightly malformed.
//!
//! The scan is bounded: a text where `tool_calls` never appears as an object
//! key costs one substring search, the number of decode attempts is capped
//! at [`MAX_ATTEMPTS`] and large texts are reduced to a window around the
//! first key. Recovery never fails; a miss is an empty result.

mod repair;

use std::ops::Range;

use serde_json::Value;

use crate::types::ToolCall;

/// Key that must appear in the text before any decoding is attempted
///
/// Only occurrences used as an object key count, so prose mentioning it
/// does not steer the scan.
const MARKER: &str = "tool_calls";

/// Texts longer than this are reduced to a window around the marker
const MAX_SCAN_BYTES: usize = 50_000;

/// Window bytes kept before the marker
const WINDOW_BEFORE: usize = 5_000;

/// Window bytes kept from the marker on
const WINDOW_AFTER: usize = 45_000;

/// Upper bound on decode attempts per text
const MAX_ATTEMPTS: usize = 10;

/// Tool calls found in a response and the prose around them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovered {
    /// Validated tool calls, empty on a miss
    pub tool_calls: Vec<ToolCall>,
    /// Text with the tool-call JSON removed
    ///
    /// Trimmed when calls were found, the untouched input otherwise.
    pub content: String,
}

/// Recover tool calls from raw model output
pub fn recover(raw: &str) -> Vec<ToolCall> {
    extract(raw).tool_calls
}

/// Recover tool calls and the residual text
pub fn extract(raw: &str) -> Recovered {
    let Some(found) = scan(raw).found else {
        return Recovered {
            tool_calls: Vec::new(),
            content: raw.to_owned(),
        };
    };

    let (before, after) = strip_fence(&raw[..found.span.start], &raw[found.span.end..]);

    Recovered {
        tool_calls: found.calls,
        content: format!("{before}{after}").trim().to_owned(),
    }
}

struct Found {
    calls: Vec<ToolCall>,
    /// Byte range of the JSON object in the input
    span: Range<usize>,
}

struct Scan {
    found: Option<Found>,
    attempts: usize,
}

fn scan(raw: &str) -> Scan {
    let mut scan = Scan {
        found: None,
        attempts: 0,
    };

    let Some(marker) = key_positions(raw).next() else {
        return scan;
    };

    let (offset, window) = scan_window(raw, marker);
    let marker = marker - offset;

    let mut tried = Vec::with_capacity(MAX_ATTEMPTS);

    for start in candidates(window, marker) {
        if tried.len() == MAX_ATTEMPTS {
            break;
        }
        if tried.contains(&start) {
            continue;
        }
        tried.push(start);
        scan.attempts += 1;

        if let Some((calls, end)) = decode_at(window, start) {
            scan.found = Some(Found {
                calls,
                span: offset + start..offset + end,
            });
            break;
        }
    }

    scan
}

/// Offsets where the marker is used as an object key
fn key_positions(text: &str) -> impl Iterator<Item = usize> + '_ {
    text.match_indices(MARKER).map(|(pos, _)| pos).filter(|&pos| {
        let rest = &text[pos + MARKER.len()..];
        let rest = rest.strip_prefix(['"', '\'']).unwrap_or(rest);
        rest.trim_start().starts_with(':')
    })
}

/// Object starts in the order they are decoded
///
/// The brace enclosing each key comes first. The fallback then walks
/// outward from the first key, alternating between the nearest unseen `{`
/// before it and the next `{` after it.
fn candidates(window: &str, marker: usize) -> impl Iterator<Item = usize> + '_ {
    let enclosing = key_positions(&window[marker..])
        .take(MAX_ATTEMPTS)
        .filter_map(move |pos| enclosing_brace(window, marker + pos));

    let mut before = window[..marker].rmatch_indices('{').map(|(pos, _)| pos);
    let mut after = window[marker..].match_indices('{').map(move |(pos, _)| marker + pos);
    let mut backward = true;

    let outward = std::iter::from_fn(move || {
        let next = if backward {
            before.next().or_else(|| after.next())
        } else {
            after.next().or_else(|| before.next())
        };
        backward = !backward;
        next
    });

    enclosing.chain(outward)
}

/// Restrict a long text to the region around the marker
fn scan_window(raw: &str, marker: usize) -> (usize, &str) {
    if raw.len() <= MAX_SCAN_BYTES {
        return (0, raw);
    }

    let mut start = marker.saturating_sub(WINDOW_BEFORE);
    while !raw.is_char_boundary(start) {
        start -= 1;
    }

    let mut end = marker.saturating_add(WINDOW_AFTER).min(raw.len());
    while !raw.is_char_boundary(end) {
        end += 1;
    }

    (start, &raw[start..end])
}

/// Nearest `{` before `marker` that is not closed before it
fn enclosing_brace(text: &str, marker: usize) -> Option<usize> {
    let mut depth = 0usize;

    for (pos, byte) in text.as_bytes()[..marker].iter().enumerate().rev() {
        match byte {
            b'}' => depth += 1,
            b'{' if depth == 0 => return Some(pos),
            b'{' => depth -= 1,
            _ => {}
        }
    }

    None
}

/// Decode an object at `start` carrying a valid, non-empty `tool_calls` list
///
/// Returns the calls and the offset where the object ends.
fn decode_at(text: &str, start: usize) -> Option<(Vec<ToolCall>, usize)> {
    let slice = &text[start..];
    let (value, len) = decode_strict(slice).or_else(|| decode_repaired(slice))?;

    let calls = validate(value.get(MARKER)?)?;
    (!calls.is_empty()).then_some((calls, start + len))
}

fn decode_strict(text: &str) -> Option<(Value, usize)> {
    let mut stream = serde_json::Deserializer::from_str(text).into_iter::<Value>();
    let value = stream.next()?.ok()?;

    Some((value, stream.byte_offset()))
}

fn decode_repaired(text: &str) -> Option<(Value, usize)> {
    let (repaired, consumed) = repair::repair(text)?;
    let value = serde_json::from_str(&repaired).ok()?;

    Some((value, consumed))
}

/// Validate every entry; a single bad entry discards the whole list
fn validate(list: &Value) -> Option<Vec<ToolCall>> {
    list.as_array()?.iter().map(validate_call).collect()
}

fn validate_call(entry: &Value) -> Option<ToolCall> {
    let function = entry.get("function").filter(|f| f.is_object()).unwrap_or(entry);

    let name = function.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }

    let arguments = normalize_arguments(function.get("arguments"))?;

    let id = entry
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map_or_else(synthesize_id, ToOwned::to_owned);

    Some(ToolCall::new(id, name, arguments))
}

/// Arguments as compact JSON object text
fn normalize_arguments(arguments: Option<&Value>) -> Option<String> {
    match arguments {
        None | Some(Value::Null) => Some("{}".to_owned()),
        Some(object @ Value::Object(_)) => Some(object.to_string()),
        Some(Value::String(text)) if text.trim().is_empty() => Some("{}".to_owned()),
        Some(Value::String(text)) => {
            let text = text.trim();
            let parsed = serde_json::from_str::<Value>(text)
                .ok()
                .or_else(|| decode_repaired(text).map(|(value, _)| value))?;

            parsed.is_object().then(|| parsed.to_string())
        }
        Some(_) => None,
    }
}

fn synthesize_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("call_{}", &hex[..12])
}

/// Drop a markdown fence that wrapped the removed JSON
fn strip_fence<'a>(before: &'a str, after: &'a str) -> (&'a str, &'a str) {
    let head = before.trim_end();
    let tail = after.trim_start();

    if let Some(rest) = tail.strip_prefix("```")
        && let Some(pos) = head.rfind("```")
        && head[pos + 3..].chars().all(|c| c.is_ascii_alphanumeric())
    {
        return (&head[..pos], rest);
    }

    (before, after)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weather_call() -> &'static str {
        r#"{"tool_calls":[{"id":"call_1","type":"function","function":{"name":"get_weather","arguments":"{\"city\":\"Paris\"}"}}]}"#
    }

    #[test]
    fn finds_calls_inside_prose() {
        let raw = format!("Let me check that for you.\n{}\nOne moment.", weather_call());
        let recovered = extract(&raw);

        assert_eq!(
            recovered.tool_calls,
            vec![ToolCall::new("call_1", "get_weather", r#"{"city":"Paris"}"#)]
        );
        assert_eq!(recovered.content, "Let me check that for you.\n\nOne moment.");
    }

    #[test]
    fn text_without_marker_is_a_miss_without_attempts() {
        let raw = "Paris is sunny today {mostly}.";
        let result = scan(raw);

        assert!(result.found.is_none());
        assert_eq!(result.attempts, 0);
        assert_eq!(extract(raw).content, raw);
    }

    #[test]
    fn garbage_after_marker_is_a_miss() {
        let raw = "{\"tool_calls\": \u{0}\u{1}\u{fffd}\u{7f} ]]]} {{{";
        assert!(recover(raw).is_empty());
    }

    #[test]
    fn fenced_json_is_removed_with_its_fence() {
        let raw = format!("Sure.\n```json\n{}\n```\nDone.", weather_call());
        let recovered = extract(&raw);

        assert_eq!(recovered.tool_calls.len(), 1);
        assert_eq!(recovered.content, "Sure.\n\nDone.");
    }

    #[test]
    fn only_json_leaves_no_content() {
        let recovered = extract(weather_call());
        assert_eq!(recovered.tool_calls.len(), 1);
        assert!(recovered.content.is_empty());
    }

    #[test]
    fn repairs_malformed_json() {
        let raw = "Calling now: {tool_calls: [{'function': {'name': 'search', 'arguments': {'q': 'rust',},},},]} ok";
        let calls = recover(raw);

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.name, "search");
        assert_eq!(calls[0].function.arguments, r#"{"q":"rust"}"#);
    }

    #[test]
    fn recovers_truncated_output() {
        let raw = r#"{"tool_calls": [{"function": {"name": "search", "arguments": {"q": "tokio"#;
        let calls = recover(raw);

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.arguments, r#"{"q":"tokio"}"#);
    }

    #[test]
    fn accepts_flat_shape_and_synthesizes_ids() {
        let raw = r#"{"tool_calls": [{"name": "list_files"}, {"name": "read", "arguments": {"path": "a.rs"}}]}"#;
        let calls = recover(raw);

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].function.arguments, "{}");
        assert_eq!(calls[1].function.arguments, r#"{"path":"a.rs"}"#);

        for call in &calls {
            let hex = call.id.strip_prefix("call_").unwrap();
            assert_eq!(hex.len(), 12);
            assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn repairs_string_arguments() {
        let raw = r#"{"tool_calls": [{"function": {"name": "f", "arguments": "{'a': 1,}"}}]}"#;
        assert_eq!(recover(raw)[0].function.arguments, r#"{"a":1}"#);
    }

    #[test]
    fn any_invalid_call_discards_all() {
        let bad_args = r#"{"tool_calls": [{"name": "ok"}, {"name": "f", "arguments": 42}]}"#;
        assert!(recover(bad_args).is_empty());

        let empty_name = r#"{"tool_calls": [{"function": {"name": "  ", "arguments": "{}"}}]}"#;
        assert!(recover(empty_name).is_empty());

        let unparsable = r#"{"tool_calls": [{"name": "f", "arguments": "not json"}]}"#;
        assert!(recover(unparsable).is_empty());

        let empty_list = r#"{"tool_calls": []}"#;
        assert!(recover(empty_list).is_empty());
    }

    #[test]
    fn prose_mentions_of_the_key_are_skipped() {
        let call = r#"{"tool_calls":[{"name":"get_weather","arguments":{"city":"Paris"}}]}"#;

        for lead in ["I will answer with tool_calls below.", r#"Per the "tool_calls" format:"#] {
            let raw = format!("{lead}\n{call}");
            let result = scan(&raw);

            assert_eq!(result.attempts, 1, "{lead}");

            let calls = result.found.unwrap().calls;
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].function.name, "get_weather");
            assert_eq!(calls[0].function.arguments, r#"{"city":"Paris"}"#);
        }
    }

    #[test]
    fn prose_only_mention_is_a_miss_without_attempts() {
        let result = scan("No tool_calls are needed here, the \"tool_calls\" list stays empty.");

        assert!(result.found.is_none());
        assert_eq!(result.attempts, 0);
    }

    #[test]
    fn echoed_format_example_does_not_hide_the_real_call() {
        let raw = concat!(
            "The format is ",
            r#"{"tool_calls":[{"id":"call_1","type":"function","function":{"name":"<tool name>","arguments":"<JSON-encoded arguments object>"}}]}"#,
            " so here goes: ",
            r#"{"tool_calls":[{"id":"call_9","type":"function","function":{"name":"search","arguments":"{\"q\":\"rust\"}"}}]}"#,
        );

        let calls = recover(raw);

        assert_eq!(calls, vec![ToolCall::new("call_9", "search", r#"{"q":"rust"}"#)]);
    }

    #[test]
    fn falls_back_when_nearest_brace_is_wrong() {
        // The brace inside the string balances the real opener, so the
        // backward search lands on the stray brace in the prose.
        let raw = r#"Use {braces wisely {"note": "}", "tool_calls": [{"name": "f"}]}"#;
        let result = scan(raw);

        assert!(result.found.is_some());
        assert!(result.attempts > 1);
        assert_eq!(recover(raw)[0].function.name, "f");
    }

    #[test]
    fn bounded_attempts_on_large_noisy_input() {
        let mut raw = String::with_capacity(210_000);
        for i in 0..500 {
            raw.push_str(&format!("chunk {i} opens {{ and never closes. "));
            while raw.len() < (i + 1) * 400 {
                raw.push_str("lorem ipsum ");
            }
        }
        raw.push_str(r#"{"note": "}", "tool_calls": [{"name": "final", "arguments": {"ok": true}}]}"#);

        assert!(raw.len() > 200_000);

        let result = scan(&raw);
        assert!(result.attempts <= MAX_ATTEMPTS);

        let found = result.found.unwrap();
        assert_eq!(found.calls[0].function.name, "final");
        assert_eq!(found.calls[0].function.arguments, r#"{"ok":true}"#);
    }

    #[test]
    fn window_respects_char_boundaries() {
        let mut raw = "é".repeat(40_000);
        raw.push_str(r#"{"tool_calls": [{"name": "f"}]}"#);
        raw.push_str(&"ü".repeat(30_000));

        assert_eq!(recover(&raw).len(), 1);
    }
}
