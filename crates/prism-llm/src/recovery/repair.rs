//! Lenient JSON repair
//!
//! Rewrites the near-JSON models tend to produce into strict JSON:
//! single-quoted strings, unquoted keys, Python literals, raw control
//! characters inside strings, trailing commas and unterminated input.
//! Anything else is rejected rather than guessed at.

use std::fmt::Write as _;

/// Repair the object starting at the beginning of `input`
///
/// Returns the repaired text and the number of input bytes it covers.
/// Input that runs out before the object closes is completed by closing
/// the open string and containers.
pub fn repair(input: &str) -> Option<(String, usize)> {
    if !input.starts_with('{') {
        return None;
    }

    let mut out = String::with_capacity(input.len() + 8);
    let mut closers: Vec<char> = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut chars = input.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
                if c == '\'' {
                    out.push('\'');
                } else {
                    out.push('\\');
                    out.push(c);
                }
                continue;
            }

            match c {
                '\\' => escaped = true,
                c if c == q => {
                    out.push('"');
                    quote = None;
                }
                '"' => out.push_str("\\\""),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => {
                    let _ = write!(out, "\\u{:04x}", u32::from(c));
                }
                c => out.push(c),
            }
            continue;
        }

        match c {
            '"' | '\'' => {
                quote = Some(c);
                out.push('"');
            }
            '{' => {
                closers.push('}');
                out.push(c);
            }
            '[' => {
                closers.push(']');
                out.push(c);
            }
            '}' | ']' => {
                strip_trailing_comma(&mut out);
                if closers.pop() != Some(c) {
                    return None;
                }
                out.push(c);

                if closers.is_empty() {
                    return Some((out, idx + c.len_utf8()));
                }
            }
            ',' | ':' => out.push(c),
            c if c.is_whitespace() => out.push(c),
            c if c.is_ascii_digit() || c == '-' => {
                out.push(c);
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_ascii_alphanumeric() || matches!(next, '.' | '+' | '-') {
                        out.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let mut word = String::from(c);
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_alphanumeric() || matches!(next, '_' | '$' | '-') {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }

                let rest = chars.peek().map_or("", |&(i, _)| &input[i..]);
                if rest.trim_start().starts_with(':') {
                    out.push('"');
                    out.push_str(&word);
                    out.push('"');
                } else {
                    out.push_str(literal(&word)?);
                }
            }
            _ => return None,
        }
    }

    // Input ended inside the object
    if quote.is_some() {
        out.push('"');
    }

    let len = out.trim_end().len();
    out.truncate(len);

    if out.ends_with(':') {
        out.push_str("null");
    }

    while let Some(closer) = closers.pop() {
        strip_trailing_comma(&mut out);
        out.push(closer);
    }

    Some((out, input.len()))
}

fn literal(word: &str) -> Option<&'static str> {
    match word {
        "true" | "True" => Some("true"),
        "false" | "False" => Some("false"),
        "null" | "None" | "Null" | "nil" => Some("null"),
        _ => None,
    }
}

fn strip_trailing_comma(out: &mut String) {
    let trimmed = out.trim_end();
    if trimmed.ends_with(',') {
        let len = trimmed.len() - 1;
        out.truncate(len);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn repaired(input: &str) -> Value {
        let (text, _) = repair(input).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn strict_json_is_unchanged() {
        let input = r#"{"a": [1, 2.5, -3e2], "b": {"c": null}}"#;
        let (text, consumed) = repair(input).unwrap();

        assert_eq!(text, input);
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn fixes_quotes_keys_and_literals() {
        assert_eq!(
            repaired("{name: 'get_weather', 'ok': True, missing: None}"),
            json!({"name": "get_weather", "ok": true, "missing": null})
        );
    }

    #[test]
    fn drops_trailing_commas() {
        assert_eq!(repaired(r#"{"a": [1, 2, ], "b": 3,}"#), json!({"a": [1, 2], "b": 3}));
    }

    #[test]
    fn escapes_control_characters_in_strings() {
        assert_eq!(repaired("{\"text\": \"line one\nline\ttwo\"}"), json!({"text": "line one\nline\ttwo"}));
    }

    #[test]
    fn handles_quotes_inside_single_quoted_strings() {
        assert_eq!(repaired(r#"{'say': 'he said "hi" and it\'s fine'}"#), json!({"say": "he said \"hi\" and it's fine"}));
    }

    #[test]
    fn closes_truncated_input() {
        assert_eq!(
            repaired(r#"{"tool_calls": [{"name": "f", "arguments": {"q": "rust"#),
            json!({"tool_calls": [{"name": "f", "arguments": {"q": "rust"}}]})
        );
        assert_eq!(repaired(r#"{"a":"#), json!({"a": null}));
    }

    #[test]
    fn stops_at_the_matching_brace() {
        let input = r#"{"a": 1} and then some prose"#;
        let (text, consumed) = repair(input).unwrap();

        assert_eq!(text, r#"{"a": 1}"#);
        assert_eq!(&input[consumed..], " and then some prose");
    }

    #[test]
    fn rejects_garbage() {
        assert!(repair("{ this is prose }").is_none());
        assert!(repair("{\"a\": @@@}").is_none());
        assert!(repair("{\"a\": [1}").is_none());
        assert!(repair("not an object").is_none());
    }
}
