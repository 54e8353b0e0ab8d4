//! Parsing the model's structured THINK output.
//!
//! Models wrap JSON in prose and code fences, use 0–100 instead of 0–1
//! and rename fields. Parsing is lenient about presentation and strict
//! about meaning: anything that cannot be turned into a usable decision
//! is a [`ParseError`], which the executor answers with the keyword
//! fallback.

use super::memory::NextAction;
use serde::Deserialize;
use thiserror::Error;

/// Confidence assumed when the model omits one.
pub const DEFAULT_CONFIDENCE: f32 = 0.7;

/// A decision the executor can act on.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDecision {
    pub action: NextAction,
    pub tool_name: Option<String>,
    pub args: serde_json::Value,
    /// Final text for `respond`; `None` asks the provider to write it
    pub response: Option<String>,
    /// 0.0..=1.0
    pub confidence: f32,
    pub reasoning: String,
}

impl ParsedDecision {
    pub fn use_tool(tool: impl Into<String>, args: serde_json::Value, confidence: f32) -> Self {
        Self {
            action: NextAction::UseTool,
            tool_name: Some(tool.into()),
            args,
            response: None,
            confidence,
            reasoning: String::new(),
        }
    }

    pub fn respond(response: Option<String>, confidence: f32) -> Self {
        Self {
            action: NextAction::Respond,
            tool_name: None,
            args: serde_json::json!({}),
            response,
            confidence,
            reasoning: String::new(),
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("empty model output")]
    Empty,

    #[error("no JSON object in model output")]
    NoJsonObject,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("use_tool without a tool name")]
    MissingToolName,
}

#[derive(Deserialize)]
struct RawDecision {
    action: String,
    #[serde(default, alias = "tool")]
    tool_name: Option<String>,
    #[serde(default, alias = "arguments", alias = "input")]
    args: Option<serde_json::Value>,
    #[serde(default, alias = "answer")]
    response: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default, alias = "thought")]
    reasoning: Option<String>,
}

/// The outermost `{ ... }` span, ignoring fences and surrounding prose.
fn json_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn parse_action(raw: &str) -> Result<NextAction, ParseError> {
    match raw.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
        "use_tool" | "tool" | "tool_call" | "call_tool" => Ok(NextAction::UseTool),
        "respond" | "response" | "answer" | "final_answer" => Ok(NextAction::Respond),
        "retry" => Ok(NextAction::Retry),
        other => Err(ParseError::UnknownAction(other.to_string())),
    }
}

fn normalize_confidence(raw: Option<f64>) -> f32 {
    match raw {
        None => DEFAULT_CONFIDENCE,
        Some(v) if v.is_nan() => DEFAULT_CONFIDENCE,
        Some(v) if v > 1.0 => (v / 100.0).clamp(0.0, 1.0) as f32,
        Some(v) => v.clamp(0.0, 1.0) as f32,
    }
}

pub fn parse_decision(text: &str) -> Result<ParsedDecision, ParseError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ParseError::Empty);
    }
    let span = json_span(text).ok_or(ParseError::NoJsonObject)?;
    let raw: RawDecision =
        serde_json::from_str(span).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    let action = parse_action(&raw.action)?;
    let tool_name = raw
        .tool_name
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    if action == NextAction::UseTool && tool_name.is_none() {
        return Err(ParseError::MissingToolName);
    }

    let args = match raw.args {
        Some(serde_json::Value::Object(map)) => serde_json::Value::Object(map),
        Some(serde_json::Value::String(s)) => serde_json::from_str(&s)
            .ok()
            .filter(serde_json::Value::is_object)
            .unwrap_or_else(|| serde_json::json!({})),
        _ => serde_json::json!({}),
    };

    Ok(ParsedDecision {
        action,
        tool_name,
        args,
        response: raw
            .response
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty()),
        confidence: normalize_confidence(raw.confidence),
        reasoning: raw.reasoning.unwrap_or_default(),
    })
}
