//! Tool-calling capability table.
//!
//! The decision engine penalises models that cannot call tools and the
//! registry returns no tools for them, so a wrong answer here silently
//! disables every integration. Config overrides win over the table.

use crate::quirks::base_model;

/// Model families known to support native function calling.
const TOOL_CAPABLE_PREFIXES: &[&str] = &[
    "gpt-4",
    "gpt-3.5-turbo",
    "gpt-5",
    "o1",
    "o3",
    "o4",
    "claude-3",
    "claude-sonnet",
    "claude-opus",
    "claude-haiku",
    "gemini-1.5",
    "gemini-2",
    "mistral-large",
    "mistral-small",
    "command-r",
    "llama-3.1",
    "llama-3.2",
    "llama-3.3",
    "qwen-2.5",
    "qwen2.5",
    "deepseek-chat",
];

/// Whether the built-in table considers `model` tool-capable.
pub fn supports_tools(model: &str) -> bool {
    let bare = base_model(model).to_ascii_lowercase();
    TOOL_CAPABLE_PREFIXES.iter().any(|p| bare.starts_with(p))
}

/// Capability lookup with configured overrides.
#[derive(Debug, Clone, Default)]
pub struct ModelCapabilities {
    tool_capable: Vec<String>,
    without_tools: Vec<String>,
}

impl ModelCapabilities {
    pub fn from_config(config: &orquesta_config::ModelsConfig) -> Self {
        Self {
            tool_capable: config.tool_capable.clone(),
            without_tools: config.without_tools.clone(),
        }
    }

    pub fn supports_tools(&self, model: &str) -> bool {
        if self.without_tools.iter().any(|m| m == model) {
            return false;
        }
        if self.tool_capable.iter().any(|m| m == model) {
            return true;
        }
        supports_tools(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_families() {
        assert!(supports_tools("gpt-4o-mini"));
        assert!(supports_tools("openai/gpt-4o"));
        assert!(supports_tools("anthropic/claude-3-haiku"));
        assert!(!supports_tools("tinyllama"));
        assert!(!supports_tools("meta-llama/llama-2-7b"));
    }

    #[test]
    fn overrides_take_precedence() {
        let caps = ModelCapabilities::from_config(&orquesta_config::ModelsConfig {
            tool_capable: vec!["my-finetune".into()],
            without_tools: vec!["gpt-4o-mini".into()],
        });
        assert!(caps.supports_tools("my-finetune"));
        assert!(!caps.supports_tools("gpt-4o-mini"));
        assert!(caps.supports_tools("gpt-4o"));
    }
}
