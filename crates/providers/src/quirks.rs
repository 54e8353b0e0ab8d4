//! Per-model request quirks for OpenAI-compatible endpoints.
//!
//! Reasoning-style models reject `temperature` and expect
//! `max_completion_tokens` instead of `max_tokens`.

/// Request-shaping rules for a model id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelQuirks {
    /// Send `max_completion_tokens` instead of `max_tokens`
    pub max_completion_tokens: bool,
    /// Whether `temperature` may be sent at all
    pub temperature: bool,
}

const REASONING_PREFIXES: &[&str] = &["o1", "o3", "o4", "gpt-5"];

impl ModelQuirks {
    /// Quirks for a model id, ignoring any `vendor/` routing prefix.
    pub fn for_model(model: &str) -> Self {
        let bare = base_model(model).to_ascii_lowercase();
        let reasoning = REASONING_PREFIXES.iter().any(|p| {
            bare == *p
                || bare
                    .strip_prefix(p)
                    .is_some_and(|rest| rest.starts_with('-') || rest.starts_with('.'))
        });
        Self {
            max_completion_tokens: reasoning,
            temperature: !reasoning,
        }
    }

    /// Apply the quirks to a JSON request body.
    pub fn apply(&self, body: &mut serde_json::Value, temperature: f32, max_tokens: Option<u32>) {
        if self.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(max) = max_tokens {
            let key = if self.max_completion_tokens {
                "max_completion_tokens"
            } else {
                "max_tokens"
            };
            body[key] = serde_json::json!(max);
        }
    }
}

/// Strip a routing prefix such as `openai/` from a model id.
pub fn base_model(model: &str) -> &str {
    model.rsplit('/').next().unwrap_or(model)
}
