//! Agent-level streaming events.
//!
//! `AgentEvent` is the contract with the presentation layer: the chat API
//! forwards these over SSE as-is.
//!
//! - `thinking`: a THINK cycle started
//! - `tool-start`: a tool is about to run
//! - `chunk`: partial answer text
//! - `done`: the run finished; final metadata
//! - `error`: the run failed; `content` is safe to show users

use serde::{Deserialize, Serialize};

/// Final metadata attached to `done`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DoneMetadata {
    pub tools_used: Vec<String>,
    pub iterations: u32,
    pub success: bool,
    pub request_id: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentEvent {
    Thinking { iteration: u32 },

    ToolStart { tool: String },

    Chunk { content: String },

    Done { metadata: DoneMetadata },

    Error {
        content: String,
        /// Diagnostic detail for logs, never rendered to end users
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl AgentEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Thinking { .. } => "thinking",
            Self::ToolStart { .. } => "tool-start",
            Self::Chunk { .. } => "chunk",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_tool_start() {
        let event = AgentEvent::ToolStart {
            tool: "create_payment_link".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool-start""#));
        assert!(json.contains(r#""tool":"create_payment_link""#));
    }

    #[test]
    fn event_serialization_done() {
        let event = AgentEvent::Done {
            metadata: DoneMetadata {
                tools_used: vec!["schedule_reminder".into()],
                iterations: 2,
                success: true,
                request_id: "req-1".into(),
                model: "openai/gpt-4o-mini".into(),
                provider: None,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"done""#));
        assert!(json.contains(r#""iterations":2"#));
        assert!(!json.contains("provider"));
    }

    #[test]
    fn event_serialization_error() {
        let event = AgentEvent::Error {
            content: "Hubo un error, intenta de nuevo.".into(),
            detail: Some("401".into()),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(event.is_terminal());
    }

    #[test]
    fn event_roundtrip_thinking() {
        let event = AgentEvent::Thinking { iteration: 3 };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"thinking","iteration":3}"#);
        let back: AgentEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.event_type(), "thinking");
    }
}
