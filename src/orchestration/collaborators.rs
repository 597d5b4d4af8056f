//! Seams to the collaborators the orchestrator drives but does not own.
//!
//! Prompt validation, execution, and response parsing are injected as
//! trait objects. Simple default validator and parser implementations are
//! provided for hosts that have nothing better.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default ceiling for [`LengthPromptValidator`].
pub const DEFAULT_MAX_PROMPT_BYTES: usize = 100_000;

/// Verdict of a prompt validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ValidationOutcome {
    pub fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Checks a task prompt before it is dispatched.
pub trait PromptValidator: Send + Sync {
    fn validate(&self, prompt: &str) -> ValidationOutcome;
}

/// Turns a raw executor reply into a structured payload.
pub trait ResponseParser: Send + Sync {
    fn parse(&self, raw: &str) -> Result<serde_json::Value>;
}

/// What an executor reports for one prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_used: Option<String>,
}

impl ExecutorResponse {
    pub fn ok(response: impl Into<String>, provider_used: Option<String>) -> Self {
        Self {
            success: true,
            response: Some(response.into()),
            error: None,
            provider_used,
        }
    }

    pub fn failed(error: impl Into<String>, provider_used: Option<String>) -> Self {
        Self {
            success: false,
            response: None,
            error: Some(error.into()),
            provider_used,
        }
    }
}

/// Performs the actual work for a prompt.
///
/// Timeouts are the executor's business; the orchestrator awaits it as-is.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, prompt: &str) -> ExecutorResponse;
}

/// Rejects blank prompts and prompts longer than a byte limit.
#[derive(Debug, Clone)]
pub struct LengthPromptValidator {
    max_prompt_bytes: usize,
}

impl LengthPromptValidator {
    pub fn new(max_prompt_bytes: usize) -> Self {
        Self { max_prompt_bytes }
    }
}

impl Default for LengthPromptValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PROMPT_BYTES)
    }
}

impl PromptValidator for LengthPromptValidator {
    fn validate(&self, prompt: &str) -> ValidationOutcome {
        if prompt.trim().is_empty() {
            return ValidationOutcome::invalid("prompt is empty");
        }
        if prompt.len() > self.max_prompt_bytes {
            return ValidationOutcome::invalid(format!(
                "prompt too large ({} bytes, limit {})",
                prompt.len(),
                self.max_prompt_bytes
            ));
        }
        ValidationOutcome::valid()
    }
}

/// Extracts JSON from agent replies.
///
/// Tries the whole reply, then a fenced ```json block, then the first
/// balanced `{...}` object. Unless `strict`, a reply with no JSON becomes
/// a JSON string holding the trimmed text.
#[derive(Debug, Clone, Default)]
pub struct JsonResponseParser {
    strict: bool,
}

impl JsonResponseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail instead of falling back to plain text.
    pub fn strict() -> Self {
        Self { strict: true }
    }
}

impl ResponseParser for JsonResponseParser {
    fn parse(&self, raw: &str) -> Result<serde_json::Value> {
        let trimmed = raw.trim();
        let candidates = [
            Some(trimmed),
            fenced_block(trimmed),
            first_json_object(trimmed),
        ];
        for candidate in candidates.into_iter().flatten() {
            if let Ok(value) = serde_json::from_str(candidate) {
                return Ok(value);
            }
        }
        if self.strict {
            return Err(Error::Parse(format!(
                "no JSON found in {} byte response",
                raw.len()
            )));
        }
        Ok(serde_json::Value::String(trimmed.to_string()))
    }
}

/// Body of the first ``` fenced block, with an optional `json` tag.
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let body_start = after.find('\n')? + 1;
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

fn first_json_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' if start.is_some() => in_string = !in_string,
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|s| &text[s..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
