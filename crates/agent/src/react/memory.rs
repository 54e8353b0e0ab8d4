//! Per-run agent memory.
//!
//! An append-only sequence of thought → action → observation records,
//! owned by a single executor run and dropped when it ends. Entries are
//! only ever created whole, so an action never exists without its thought
//! and an observation never exists without its action.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the model declared it wants to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    UseTool,
    Respond,
    Retry,
}

/// Where a thought came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtSource {
    /// Parsed from the model's JSON decision
    Model,
    /// A native function call returned by the provider
    NativeToolCall,
    /// The deterministic keyword fallback
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    pub reasoning: String,
    /// 0.0..=1.0
    pub confidence: f32,
    pub next: NextAction,
    pub source: ThoughtSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    ToolCall {
        tool: String,
        input: serde_json::Value,
    },
    Response {
        content: String,
    },
    Retry {
        reason: String,
    },
}

impl Action {
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            Self::ToolCall { tool, .. } => Some(tool),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub success: bool,
    pub content: String,
    pub is_complete: bool,
    /// Structured tool output, when the tool returned any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// 1-based
    pub iteration: u32,
    pub thought: Thought,
    pub action: Action,
    pub observation: Observation,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMemory {
    entries: Vec<MemoryEntry>,
}

impl AgentMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one complete cycle. The iteration number is the new length.
    pub fn record(&mut self, thought: Thought, action: Action, observation: Observation) -> &MemoryEntry {
        let iteration = self.entries.len() as u32 + 1;
        self.entries.push(MemoryEntry {
            iteration,
            thought,
            action,
            observation,
            timestamp: Utc::now(),
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[MemoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&MemoryEntry> {
        self.entries.last()
    }

    /// Tools that ran successfully, in order.
    pub fn tools_used(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.observation.success)
            .filter_map(|e| e.action.tool_name().map(String::from))
            .collect()
    }

    /// Every tool call made, failed or not, in order.
    pub fn tools_attempted(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|e| e.action.tool_name().map(String::from))
            .collect()
    }

    /// Whether `tool` was already attempted in this run.
    pub fn attempted(&self, tool: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.action.tool_name() == Some(tool))
    }

    pub fn any_success(&self) -> bool {
        self.entries.iter().any(|e| e.observation.success)
    }

    /// The observation that ended the run, if one did.
    pub fn terminal(&self) -> Option<&Observation> {
        self.entries
            .last()
            .map(|e| &e.observation)
            .filter(|o| o.is_complete)
    }

    /// Latest successful structured output of `tool`.
    pub fn latest_data(&self, tool: &str) -> Option<&serde_json::Value> {
        self.entries
            .iter()
            .rev()
            .filter(|e| e.observation.success && e.action.tool_name() == Some(tool))
            .find_map(|e| e.observation.data.as_ref())
    }

    /// Render the trace for a THINK prompt.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&format!(
                "[{}] Pensamiento: {}\n",
                entry.iteration, entry.thought.reasoning
            ));
            match &entry.action {
                Action::ToolCall { tool, input } => {
                    out.push_str(&format!("[{}] Acción: {tool}({input})\n", entry.iteration));
                }
                Action::Response { .. } => {
                    out.push_str(&format!("[{}] Acción: responder\n", entry.iteration));
                }
                Action::Retry { reason } => {
                    out.push_str(&format!("[{}] Acción: reintentar ({reason})\n", entry.iteration));
                }
            }
            let status = if entry.observation.success { "✓" } else { "✗" };
            out.push_str(&format!(
                "[{}] Observación {status}: {}\n",
                entry.iteration, entry.observation.content
            ));
        }
        out
    }
}
