//! Best-effort cleanup and validation of model output
//!
//! Model text is normalized with a fixed sequence of textual fixes, parsed, and
//! on failure sent back to the model exactly once with a request to correct it.

use std::{sync::LazyLock, time::Duration};

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{domain::prompt::build_repair_prompt, errors::AppError, generation::TextGenerator};

static ELLIPSIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.…]{3,}|…").expect("valid ellipsis pattern"));

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("valid trailing comma pattern"));

/// Applies the textual fixes in order. Text that is already a valid object
/// without fences, ellipses or trailing commas comes back unchanged.
pub fn normalize(raw: &str) -> String {
    let text = strip_code_fences(raw);
    let text = ELLIPSIS.replace_all(&text, "").into_owned();
    let text = unwrap_response_envelope(&text).unwrap_or(text);
    let text = slice_outer_object(&text).to_string();
    let text = TRAILING_COMMA.replace_all(&text, "$1").into_owned();
    balance_braces(text)
}

fn strip_code_fences(raw: &str) -> String {
    raw.trim()
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// A non-streaming reply wraps the document in `{"response": "<json>", ...}`.
fn unwrap_response_envelope(text: &str) -> Option<String> {
    let Ok(Value::Object(envelope)) = serde_json::from_str::<Value>(text) else {
        return None;
    };
    match envelope.get("response") {
        Some(Value::String(inner)) if inner.contains('{') => Some(inner.trim().to_string()),
        _ => None,
    }
}

fn slice_outer_object(text: &str) -> &str {
    let Some(start) = text.find('{') else {
        return text;
    };
    match text.rfind('}') {
        Some(end) if end > start => &text[start..=end],
        _ => &text[start..],
    }
}

/// Naive count: braces inside string literals are counted too.
fn balance_braces(mut text: String) -> String {
    let opened = text.matches('{').count();
    let closed = text.matches('}').count();
    if opened <= closed {
        return text;
    }
    // a cut-off document often ends in a dangling comma
    let kept = text.trim_end().trim_end_matches(',').len();
    text.truncate(kept);
    text.extend(std::iter::repeat('}').take(opened - closed));
    text
}

/// Parses `text` and requires a top-level object.
pub fn validate(text: &str) -> Result<Value, String> {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(format!("expected a JSON object, found {}", json_type(&other))),
        Err(err) => Err(err.to_string()),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Returns the normalized document text once it parses as an object, asking
/// `generator` for a corrected version at most once.
pub async fn normalize_and_validate(
    generator: &dyn TextGenerator,
    raw: &str,
    hard_timeout: Duration,
) -> Result<String, AppError> {
    let first = normalize(raw);
    let first_error = match validate(&first) {
        Ok(_) => {
            debug!(len = first.len(), "model output validated");
            return Ok(first);
        }
        Err(err) => err,
    };

    warn!(
        error = %first_error,
        len = first.len(),
        "model output failed validation, requesting a corrected document"
    );

    let repaired = generator
        .generate(&build_repair_prompt(&first), hard_timeout)
        .await?;
    let second = normalize(repaired.text());

    match validate(&second) {
        Ok(_) => {
            info!(len = second.len(), "corrected model output validated");
            Ok(second)
        }
        Err(err) => {
            warn!(error = %err, len = second.len(), "corrected model output is still invalid");
            Err(AppError::InvalidJson(err))
        }
    }
}
