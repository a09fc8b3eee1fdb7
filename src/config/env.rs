//! `.env` parsing and `${NAME}` environment reference expansion.

use std::collections::HashMap;
use std::path::Path;

/// Parses a `.env`-style file: `KEY=VALUE` per line, blank lines and lines
/// starting with `#` ignored. A value wrapped in a single matching pair of
/// `'` or `"` has those quotes stripped.
pub fn parse_dotenv(content: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            vars.insert(key.trim().to_string(), strip_quotes(value.trim()).to_string());
        }
    }
    vars
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['\'', '"'] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Builds the environment lookup table used for `${NAME}` expansion: values
/// from `dotenv_path` (if it exists) overlaid with the process's real
/// environment, which always wins on conflict.
pub fn build_env_table(dotenv_path: &Path) -> HashMap<String, String> {
    let mut vars = if let Ok(content) = std::fs::read_to_string(dotenv_path) {
        parse_dotenv(&content)
    } else {
        HashMap::new()
    };
    for (key, value) in std::env::vars() {
        vars.insert(key, value);
    }
    vars
}

/// Recursively expands `${NAME}` references inside every string in a JSON
/// value, using `vars` as the lookup table. References to names absent from
/// `vars` are left untouched so a misconfigured reference is visible in the
/// resulting config rather than silently becoming an empty string.
pub fn expand_value(value: serde_json::Value, vars: &HashMap<String, String>) -> serde_json::Value {
    use serde_json::Value;
    match value {
        Value::String(s) => Value::String(expand_string(&s, vars)),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| expand_value(v, vars)).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, expand_value(v, vars)))
                .collect(),
        ),
        other => other,
    }
}

fn expand_string(input: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find("${") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match vars.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[pos..]);
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}
