//! When does a tool result finish the task?
//!
//! The default policy looks for success language in the tool's message.
//! It is tied to the wording of the built-in tools and to Spanish and
//! English; deployments with other tools or locales plug in their own.

use crate::decision::patterns::{contains_phrase, normalize, words};
use orquesta_core::tool::ToolResult;

pub trait CompletionPolicy: Send + Sync {
    /// Whether `result` of `tool` completes the user's request.
    fn is_complete(&self, tool: &str, result: &ToolResult) -> bool;
}

/// Completion by lexical markers in a successful result.
#[derive(Debug, Clone)]
pub struct LexicalCompletion {
    markers: Vec<String>,
}

impl LexicalCompletion {
    pub fn new(markers: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        Self {
            markers: markers
                .into_iter()
                .map(|m| normalize(m.as_ref()))
                .filter(|m| !m.trim().is_empty())
                .collect(),
        }
    }
}

impl Default for LexicalCompletion {
    fn default() -> Self {
        Self::new(orquesta_config::AgentConfig::default().completion_markers)
    }
}

impl CompletionPolicy for LexicalCompletion {
    fn is_complete(&self, _tool: &str, result: &ToolResult) -> bool {
        if !result.success {
            return false;
        }
        let normalized = normalize(&result.message);
        let words = words(&normalized);
        self.markers.iter().any(|m| contains_phrase(&words, m))
    }
}

/// Never completes on a tool result; only explicit responses end the run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplicitCompletion;

impl CompletionPolicy for ExplicitCompletion {
    fn is_complete(&self, _tool: &str, _result: &ToolResult) -> bool {
        false
    }
}
