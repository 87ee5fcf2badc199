//! Normalization of raw extraction payloads before they are saved to history.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Markdown code fence opening at the first byte, with optional language
/// tag, up to the first closing fence. Anything after that fence is dropped.
static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)\r?\n?[ \t]*```")
        .expect("Invalid regex pattern: CODE_FENCE")
});

/// Text form of an extraction plus its JSON parse, when it parses.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResult {
    pub text: String,
    pub parsed: Option<Value>,
    /// Parser message when `text` is not valid JSON.
    pub parse_error: Option<String>,
}

/// Normalizes a raw payload. Returns `None` for absent or falsy payloads.
///
/// Never fails: text that is not JSON is returned with `parsed: None`.
pub fn normalize(raw: Option<&Value>) -> Option<NormalizedResult> {
    let raw = raw.filter(|value| is_truthy(value))?;

    let unwrapped = match raw {
        Value::Object(map) => map.get("text").unwrap_or(raw),
        other => other,
    };

    let text = match unwrapped {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    };

    let text = strip_code_fence(&text);

    match serde_json::from_str::<Value>(&text) {
        Ok(parsed) => Some(NormalizedResult {
            text,
            parsed: Some(parsed),
            parse_error: None,
        }),
        Err(e) => Some(NormalizedResult {
            text,
            parsed: None,
            parse_error: Some(e.to_string()),
        }),
    }
}

/// Removes one code fence opening at the start of `text`, keeping the inner
/// content.
pub fn strip_code_fence(text: &str) -> String {
    match CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim().to_string(),
        None => text.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::Array(_) | Value::Object(_) => true,
    }
}
