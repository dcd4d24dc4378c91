use std::sync::OnceLock;

use regex::{Captures, Regex};

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\{\{\s*(?P<key>[a-zA-Z0-9_.]+)\s*(?:\|\s*default\("(?P<default>[^"]*)"\))?\s*\}\}"#)
            .expect("must be valid regex")
    })
}

/// Substitute `{{ env.VAR }}` and `{{ env.VAR | default("x") }}` in raw config text
///
/// Comment lines are copied through untouched so that commented-out
/// secrets never have to exist in the environment.
pub fn expand_env(input: &str) -> Result<String, String> {
    let mut lines = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_owned());
        } else {
            lines.push(expand_line(line)?);
        }
    }

    let mut output = lines.join("\n");
    if input.ends_with('\n') {
        output.push('\n');
    }

    Ok(output)
}

fn expand_line(line: &str) -> Result<String, String> {
    let mut failure = None;

    let expanded = placeholder().replace_all(line, |caps: &Captures<'_>| {
        match resolve(caps) {
            Ok(value) => value,
            Err(e) => {
                if failure.is_none() {
                    failure = Some(e);
                }
                String::new()
            }
        }
    });

    match failure {
        Some(e) => Err(e),
        None => Ok(expanded.into_owned()),
    }
}

fn resolve(caps: &Captures<'_>) -> Result<String, String> {
    let key = &caps["key"];

    let Some(var_name) = key.strip_prefix("env.").filter(|name| !name.contains('.')) else {
        return Err(format!("only variables scoped with 'env.' are supported: `{key}`"));
    };

    match std::env::var(var_name) {
        Ok(value) => Ok(value),
        Err(_) => caps
            .name("default")
            .map(|m| m.as_str().to_owned())
            .ok_or_else(|| format!("environment variable not found: `{var_name}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_without_placeholders_is_unchanged() {
        let input = "[llm]\ndefault_provider = \"gemini\"\n";
        assert_eq!(expand_env(input).unwrap(), input);
    }

    #[test]
    fn api_key_is_read_from_environment() {
        temp_env::with_var("PRISM_TEST_GEMINI_KEY", Some("abc123"), || {
            let result = expand_env("api_key = \"{{ env.PRISM_TEST_GEMINI_KEY }}\"").unwrap();
            assert_eq!(result, "api_key = \"abc123\"");
        });
    }

    #[test]
    fn several_placeholders_on_separate_lines() {
        let vars = [("PRISM_TEST_A", Some("a")), ("PRISM_TEST_B", Some("b"))];
        temp_env::with_vars(vars, || {
            let result = expand_env("a = \"{{ env.PRISM_TEST_A }}\"\nb = \"{{env.PRISM_TEST_B}}\"").unwrap();
            assert_eq!(result, "a = \"a\"\nb = \"b\"");
        });
    }

    #[test]
    fn missing_variable_names_the_variable() {
        temp_env::with_var_unset("PRISM_TEST_MISSING", || {
            let err = expand_env("key = \"{{ env.PRISM_TEST_MISSING }}\"").unwrap_err();
            assert!(err.contains("PRISM_TEST_MISSING"));
        });
    }

    #[test]
    fn default_applies_only_when_unset() {
        temp_env::with_var_unset("PRISM_TEST_OPTIONAL", || {
            let result = expand_env("key = \"{{ env.PRISM_TEST_OPTIONAL | default(\"30s\") }}\"").unwrap();
            assert_eq!(result, "key = \"30s\"");
        });
        temp_env::with_var("PRISM_TEST_OPTIONAL", Some("5s"), || {
            let result = expand_env("key = \"{{ env.PRISM_TEST_OPTIONAL | default(\"30s\") }}\"").unwrap();
            assert_eq!(result, "key = \"5s\"");
        });
    }

    #[test]
    fn non_env_scope_is_rejected() {
        let err = expand_env("key = \"{{ vault.SECRET }}\"").unwrap_err();
        assert!(err.contains("only variables scoped with 'env.'"));
    }

    #[test]
    fn comment_lines_are_not_expanded() {
        temp_env::with_var_unset("PRISM_TEST_MISSING", || {
            let input = "  # api_key = \"{{ env.PRISM_TEST_MISSING }}\"\nname = \"x\"";
            assert_eq!(expand_env(input).unwrap(), input);
        });
    }
}
