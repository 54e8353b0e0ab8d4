//! Input extraction helpers shared by the tool handlers.

use chrono::{NaiveDate, NaiveTime};
use orquesta_core::error::ToolError;
use serde_json::Value;

/// A non-blank string field, trimmed.
pub fn optional_str<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn required_str<'a>(input: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    optional_str(input, key)
        .ok_or_else(|| ToolError::InvalidArguments(format!("'{key}' is required")))
}

/// A number given either as JSON number or as numeric text ("1,500.50").
pub fn number(input: &Value, key: &str) -> Option<f64> {
    match input.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .trim_start_matches('$')
            .replace(',', "")
            .parse()
            .ok(),
        _ => None,
    }
}

pub fn date(input: &Value, key: &str) -> Result<Option<NaiveDate>, ToolError> {
    optional_str(input, key)
        .map(|raw| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                ToolError::InvalidArguments(format!("'{key}' must be a date as YYYY-MM-DD"))
            })
        })
        .transpose()
}

pub fn time(input: &Value, key: &str) -> Result<Option<NaiveTime>, ToolError> {
    optional_str(input, key)
        .map(|raw| {
            NaiveTime::parse_from_str(raw, "%H:%M")
                .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
                .map_err(|_| {
                    ToolError::InvalidArguments(format!("'{key}' must be a time as HH:MM"))
                })
        })
        .transpose()
}

/// Structured payload for a tool result.
pub fn data(value: &impl serde::Serialize) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Loose email shape check: one `@`, a dot in the domain, no spaces.
pub fn looks_like_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !s.contains(char::is_whitespace)
}

/// A phone number carries at least 7 digits and only dialing punctuation.
pub fn looks_like_phone(s: &str) -> bool {
    let digits = s.chars().filter(char::is_ascii_digit).count();
    (7..=15).contains(&digits)
        && s
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')' | '.'))
}
