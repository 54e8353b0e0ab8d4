//! `get_current_datetime`: the one tool every plan gets.

use async_trait::async_trait;
use chrono::{Datelike, FixedOffset, Utc, Weekday};
use orquesta_core::error::ToolError;
use orquesta_core::tenant::ToolContext;
use orquesta_core::tool::{ToolHandler, ToolResult};

pub const NAME: &str = "get_current_datetime";

pub struct GetCurrentDatetimeTool;

fn weekday_es(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "lunes",
        Weekday::Tue => "martes",
        Weekday::Wed => "miércoles",
        Weekday::Thu => "jueves",
        Weekday::Fri => "viernes",
        Weekday::Sat => "sábado",
        Weekday::Sun => "domingo",
    }
}

#[async_trait]
impl ToolHandler for GetCurrentDatetimeTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Devuelve la fecha y hora actuales. Úsalo antes de agendar para resolver 'mañana' o 'el viernes'."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "utc_offset_hours": {
                    "type": "integer",
                    "description": "Desfase respecto a UTC en horas (ej. -6 para Ciudad de México)"
                }
            }
        })
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let hours = input
            .get("utc_offset_hours")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(0);
        let offset = i32::try_from(hours)
            .ok()
            .filter(|h| (-12..=14).contains(h))
            .and_then(|h| FixedOffset::east_opt(h * 3600))
            .ok_or_else(|| {
                ToolError::InvalidArguments("'utc_offset_hours' must be within -12..=14".into())
            })?;

        let now = Utc::now().with_timezone(&offset);
        Ok(ToolResult::ok_with_data(
            format!(
                "Hoy es {} {}, {} (UTC{:+}).",
                weekday_es(now.weekday()),
                now.format("%d/%m/%Y"),
                now.format("%H:%M"),
                hours
            ),
            serde_json::json!({
                "iso": now.to_rfc3339(),
                "date": now.format("%Y-%m-%d").to_string(),
                "time": now.format("%H:%M").to_string(),
                "weekday": weekday_es(now.weekday()),
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orquesta_core::tenant::PlanTier;

    #[tokio::test]
    async fn reports_date_with_offset() {
        let ctx = ToolContext::new("acme", PlanTier::Free);
        let result = GetCurrentDatetimeTool
            .execute(serde_json::json!({"utc_offset_hours": -6}), &ctx)
            .await
            .unwrap();
        assert!(result.message.contains("UTC-6"));
        let data = result.data.unwrap();
        assert!(data["iso"].as_str().unwrap().ends_with("-06:00"));
    }

    #[tokio::test]
    async fn rejects_impossible_offsets() {
        let ctx = ToolContext::new("acme", PlanTier::Free);
        assert!(
            GetCurrentDatetimeTool
                .execute(serde_json::json!({"utc_offset_hours": 30}), &ctx)
                .await
                .is_err()
        );
    }
}
