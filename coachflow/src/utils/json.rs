//! Parsing of JSON embedded in completion output.
//!
//! Model output is untrusted: it may wrap JSON in prose or code fences, or
//! omit fields. Everything here returns a `Result` tagged with a
//! [`ResponseFormatError`] instead of assuming structure.

use crate::errors::{AgentError, CoachError};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::LazyLock;
use thiserror::Error;

static FENCED_BLOCK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").ok());

/// Why a completion could not be read as the expected JSON.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseFormatError {
    /// No JSON value could be located.
    #[error("No JSON found in response")]
    NoJson,
    /// JSON was found but did not decode into the target type.
    #[error("Invalid JSON structure: {0}")]
    Invalid(String),
    /// Required top-level keys are absent.
    #[error("Missing required keys: {}", .0.join(", "))]
    MissingKeys(Vec<String>),
}

impl From<ResponseFormatError> for CoachError {
    fn from(err: ResponseFormatError) -> Self {
        AgentError::processing(format!("Completion returned an invalid structure: {err}")).into()
    }
}

fn try_parse(candidate: &str) -> Option<Value> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }
    serde_json::from_str(candidate).ok()
}

fn outermost_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// Locates a JSON value in free-form text.
///
/// Tries the whole text, then fenced code blocks, then the outermost
/// `{...}` and `[...]` spans.
pub fn extract_json(text: &str) -> Result<Value, ResponseFormatError> {
    if let Some(value) = try_parse(text) {
        return Ok(value);
    }

    if let Some(fence) = FENCED_BLOCK.as_ref() {
        for captures in fence.captures_iter(text) {
            if let Some(value) = captures.get(1).and_then(|m| try_parse(m.as_str())) {
                return Ok(value);
            }
        }
    }

    [('{', '}'), ('[', ']')]
        .into_iter()
        .filter_map(|(open, close)| outermost_span(text, open, close))
        .find_map(try_parse)
        .ok_or(ResponseFormatError::NoJson)
}

/// Fails with the keys of `required` missing from `value`.
pub fn require_keys(value: &Value, required: &[&str]) -> Result<(), ResponseFormatError> {
    let missing: Vec<String> = required
        .iter()
        .filter(|key| value.get(**key).map_or(true, Value::is_null))
        .map(|key| (*key).to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ResponseFormatError::MissingKeys(missing))
    }
}

/// Extracts JSON from `text`, checks `required` keys and decodes into `T`.
pub fn parse_llm_json<T: DeserializeOwned>(
    text: &str,
    required: &[&str],
) -> Result<T, ResponseFormatError> {
    let value = extract_json(text)?;
    require_keys(&value, required)?;
    serde_json::from_value(value).map_err(|e| ResponseFormatError::Invalid(e.to_string()))
}

/// Serializes an artifact for storage.
pub fn to_content<T: Serialize>(value: &T) -> Result<Value, CoachError> {
    serde_json::to_value(value)
        .map_err(|e| AgentError::processing(format!("Failed to serialize content: {e}")).into())
}
