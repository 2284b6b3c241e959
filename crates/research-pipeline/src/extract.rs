//! Structured extraction from free-form model output
//!
//! Language models are asked for JSON but routinely wrap it in prose, use
//! single quotes or leave keys bare. `extract_structured` runs an ordered
//! list of strict strategies (each `text -> Option<JsonMap>`), then a
//! line-based heuristic as a separate last resort, and finally returns
//! `{"error": "Could not parse JSON"}`. It never panics.
//!
//! Callers that need a particular shape must backfill missing keys
//! themselves; nothing here knows about summaries or evaluations.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// A JSON object
pub type JsonMap = Map<String, Value>;

/// Value of the `error` key when every strategy failed
pub const PARSE_FAILURE: &str = "Could not parse JSON";

/// A single parsing strategy
pub type Strategy = fn(&str) -> Option<JsonMap>;

/// Strict strategies, tried in order. First success wins.
pub const STRICT_STRATEGIES: &[(&str, Strategy)] = &[
    ("direct", parse_direct),
    ("balanced_braces", parse_balanced_braces),
    ("single_quotes", parse_single_quotes),
    ("bare_keys", parse_bare_keys),
];

fn bare_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)(\s*):").expect("valid regex"))
}

fn key_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^"?([^":]+)"?\s*:\s*(.*)$"#).expect("valid regex"))
}

fn bracket_span_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\[(.*?)\]").expect("valid regex"))
}

fn quoted_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""([^"]*)""#).expect("valid regex"))
}

/// Coerce `text` into a JSON object using every strategy in turn.
pub fn extract_structured(text: &str) -> JsonMap {
    for (name, strategy) in STRICT_STRATEGIES {
        if let Some(map) = strategy(text) {
            debug!(strategy = *name, keys = map.len(), "Extracted structured output");
            return map;
        }
    }

    if let Some(map) = heuristic_key_values(text) {
        warn!(keys = map.len(), "Structured output recovered with line heuristics");
        return map;
    }

    warn!(len = text.len(), "Could not extract structured output");
    parse_failure()
}

/// The canonical failure mapping
pub fn parse_failure() -> JsonMap {
    let mut map = JsonMap::new();
    map.insert("error".to_string(), Value::String(PARSE_FAILURE.to_string()));
    map
}

/// True when `map` is the canonical failure mapping
pub fn is_parse_failure(map: &JsonMap) -> bool {
    map.len() == 1 && map.get("error").and_then(Value::as_str) == Some(PARSE_FAILURE)
}

/// Parse the whole text as a JSON object.
pub fn parse_direct(text: &str) -> Option<JsonMap> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Parse the first balanced `{...}` span that is valid JSON.
pub fn parse_balanced_braces(text: &str) -> Option<JsonMap> {
    balanced_spans(text).into_iter().find_map(parse_direct)
}

/// Replace single quotes with double quotes and retry.
pub fn parse_single_quotes(text: &str) -> Option<JsonMap> {
    if !text.contains('\'') {
        return None;
    }
    let normalized = text.replace('\'', "\"");
    parse_direct(&normalized).or_else(|| parse_balanced_braces(&normalized))
}

/// Quote bare object keys and retry, with and without quote normalisation.
pub fn parse_bare_keys(text: &str) -> Option<JsonMap> {
    let mut candidates = vec![text.to_string()];
    if text.contains('\'') {
        candidates.push(text.replace('\'', "\""));
    }

    candidates.iter().find_map(|candidate| {
        let quoted = bare_key_re().replace_all(candidate, r#"$1"$2"$3:"#);
        if quoted == candidate.as_str() {
            return None;
        }
        parse_direct(&quoted).or_else(|| parse_balanced_braces(&quoted))
    })
}

/// Line-by-line fallback with weaker guarantees than the strict strategies.
///
/// `key: value` lines become entries; a bracketed value is parsed as a JSON
/// list (or split on commas); bullet lines are appended to the most recent
/// key. Returns `None` if nothing looked like a key.
pub fn heuristic_key_values(text: &str) -> Option<JsonMap> {
    let mut data = JsonMap::new();
    let mut current_key: Option<String> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(key) = current_key.as_deref() {
            if let Some(item) = bullet_item(line) {
                append_item(&mut data, key, item);
                continue;
            }
        }

        let Some(caps) = key_value_re().captures(line) else {
            continue;
        };
        let key = caps[1].trim().trim_matches(is_quote).trim().to_string();
        if key.is_empty() {
            continue;
        }
        let value = caps[2]
            .trim()
            .trim_end_matches(',')
            .trim()
            .trim_matches(is_quote)
            .trim();

        data.insert(key.clone(), heuristic_value(value));
        current_key = Some(key);
    }

    if data.is_empty() {
        None
    } else {
        Some(data)
    }
}

/// Permissive parse of a list of strings (used for generated search queries).
///
/// JSON array, then the quoted strings inside the first `[...]` span, then
/// every quoted string in the text.
pub fn extract_string_list(text: &str) -> Option<Vec<String>> {
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(text.trim()) {
        let strings: Vec<String> = items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if !strings.is_empty() {
            return Some(strings);
        }
    }

    if let Some(caps) = bracket_span_re().captures(text) {
        let strings = quoted_strings(&caps[1]);
        if !strings.is_empty() {
            return Some(strings);
        }
    }

    let strings = quoted_strings(text);
    if strings.is_empty() {
        None
    } else {
        Some(strings)
    }
}

/// Coerce a JSON value into a list of strings.
pub fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Null => vec![],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .collect(),
        Value::String(s) if s.trim().is_empty() => vec![],
        Value::String(s) => vec![s.clone()],
        other => vec![other.to_string()],
    }
}

fn is_quote(c: char) -> bool {
    c == '"' || c == '\''
}

fn quoted_strings(text: &str) -> Vec<String> {
    quoted_re()
        .captures_iter(text)
        .map(|caps| caps[1].trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn bullet_item(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix('-').or_else(|| line.strip_prefix('•')) {
        return Some(rest.trim());
    }
    // "**bold**" is not a bullet
    line.strip_prefix("* ").map(str::trim)
}

fn append_item(data: &mut JsonMap, key: &str, item: &str) {
    if item.is_empty() {
        return;
    }
    let item = Value::String(item.to_string());
    match data.get_mut(key) {
        Some(Value::Array(items)) => items.push(item),
        Some(existing) => {
            *existing = match existing.take() {
                Value::Null => Value::Array(vec![item]),
                Value::String(s) if s.is_empty() => Value::Array(vec![item]),
                previous => Value::Array(vec![previous, item]),
            };
        }
        None => {
            data.insert(key.to_string(), Value::Array(vec![item]));
        }
    }
}

fn heuristic_value(value: &str) -> Value {
    if value.is_empty() {
        return Value::Array(vec![]);
    }
    if value.starts_with('[') && value.ends_with(']') {
        if let Ok(parsed) = serde_json::from_str::<Value>(value) {
            return parsed;
        }
        let inner = &value[1..value.len() - 1];
        let items = inner
            .split(',')
            .map(|item| item.trim().trim_matches(is_quote).trim())
            .filter(|item| !item.is_empty())
            .map(|item| Value::String(item.to_string()))
            .collect();
        return Value::Array(items);
    }
    Value::String(value.to_string())
}

/// Every balanced `{...}` span, ordered by starting position.
///
/// Braces inside double-quoted strings don't count.
fn balanced_spans(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();

    for (start, _) in text.match_indices('{') {
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        for (offset, &b) in bytes[start..].iter().enumerate() {
            if in_string {
                match b {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        spans.push(&text[start..=start + offset]);
                        break;
                    }
                }
                _ => {}
            }
        }
    }

    spans
}
