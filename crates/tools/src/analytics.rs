//! `get_chatbot_stats`: conversation metrics for the business owner.

use crate::args;
use crate::backends::{AnalyticsSource, StatsPeriod};
use async_trait::async_trait;
use orquesta_core::error::ToolError;
use orquesta_core::tenant::ToolContext;
use orquesta_core::tool::{ToolHandler, ToolResult};
use std::sync::Arc;

pub const NAME: &str = "get_chatbot_stats";

pub struct GetChatbotStatsTool {
    source: Arc<dyn AnalyticsSource>,
}

impl GetChatbotStatsTool {
    pub fn new(source: Arc<dyn AnalyticsSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl ToolHandler for GetChatbotStatsTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Consulta estadísticas del chatbot: conversaciones, mensajes y leads en un periodo."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "period": {
                    "type": "string",
                    "enum": ["day", "week", "month"],
                    "description": "Periodo a consultar (por defecto week)"
                }
            }
        })
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let period = match args::optional_str(&input, "period") {
            None => StatsPeriod::Week,
            Some(raw) => StatsPeriod::parse(raw).ok_or_else(|| {
                ToolError::InvalidArguments(format!("unknown period '{raw}'"))
            })?,
        };

        let stats = self
            .source
            .stats(&ctx.chatbot_id, period)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: NAME.into(),
                reason: e.to_string(),
            })?;

        let avg = if stats.conversations == 0 {
            0.0
        } else {
            stats.messages as f64 / stats.conversations as f64
        };

        Ok(ToolResult::ok_with_data(
            format!(
                "📊 Estadísticas de {}:\n• Conversaciones: {}\n• Mensajes: {} ({avg:.1} por conversación)\n• Leads capturados: {}",
                period.label(),
                stats.conversations,
                stats.messages,
                stats.leads
            ),
            serde_json::json!({
                "period": period,
                "conversations": stats.conversations,
                "messages": stats.messages,
                "leads": stats.leads,
                "avg_messages_per_conversation": avg,
            }),
        ))
    }
}
