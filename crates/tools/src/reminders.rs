//! Reminder tools: schedule, list, update and cancel.
//!
//! All four share one [`ReminderStore`] and scope every operation to the
//! chatbot in the tool context.

use crate::args;
use crate::backends::{NewReminder, Reminder, ReminderPatch, ReminderStatus, ReminderStore};
use async_trait::async_trait;
use orquesta_core::error::{CollaboratorError, ToolError};
use orquesta_core::tenant::ToolContext;
use orquesta_core::tool::{ToolHandler, ToolResult};
use std::sync::Arc;

pub const SCHEDULE: &str = "schedule_reminder";
pub const LIST: &str = "list_reminders";
pub const UPDATE: &str = "update_reminder";
pub const CANCEL: &str = "cancel_reminder";

fn store_error(tool: &str, e: CollaboratorError) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: tool.into(),
        reason: e.to_string(),
    }
}

fn describe(r: &Reminder) -> String {
    format!(
        "[{}] {} el {} a las {}",
        r.id,
        r.title,
        r.date.format("%d/%m/%Y"),
        r.time.format("%H:%M")
    )
}

fn today() -> chrono::NaiveDate {
    chrono::Utc::now().date_naive()
}

pub struct ScheduleReminderTool {
    store: Arc<dyn ReminderStore>,
}

impl ScheduleReminderTool {
    pub fn new(store: Arc<dyn ReminderStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for ScheduleReminderTool {
    fn name(&self) -> &str {
        SCHEDULE
    }

    fn description(&self) -> &str {
        "Agenda un recordatorio o cita en una fecha y hora. Úsalo cuando el cliente quiera agendar, programar o reservar algo."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "Qué se recuerda" },
                "date": { "type": "string", "description": "Fecha en formato YYYY-MM-DD" },
                "time": { "type": "string", "description": "Hora en formato HH:MM (24h)" },
                "email": { "type": "string", "description": "Correo para notificar (opcional)" },
                "notes": { "type": "string", "description": "Notas adicionales (opcional)" }
            },
            "required": ["title", "date", "time"]
        })
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let title = args::required_str(&input, "title")?;
        let date = args::date(&input, "date")?
            .ok_or_else(|| ToolError::InvalidArguments("'date' is required".into()))?;
        let time = args::time(&input, "time")?
            .ok_or_else(|| ToolError::InvalidArguments("'time' is required".into()))?;
        if date < today() {
            return Err(ToolError::InvalidArguments(
                "'date' must not be in the past".into(),
            ));
        }
        let email = args::optional_str(&input, "email");
        if let Some(email) = email
            && !args::looks_like_email(email)
        {
            return Err(ToolError::InvalidArguments(format!(
                "'{email}' is not a valid email"
            )));
        }

        let (reminder, created) = self
            .store
            .create(NewReminder {
                chatbot_id: ctx.chatbot_id.clone(),
                title: title.to_string(),
                date,
                time,
                email: email.map(String::from),
                notes: args::optional_str(&input, "notes").map(String::from),
            })
            .await
            .map_err(|e| store_error(SCHEDULE, e))?;

        let message = if created {
            format!("✅ Recordatorio agendado exitosamente: {}", describe(&reminder))
        } else {
            format!("✅ Ese recordatorio ya estaba agendado: {}", describe(&reminder))
        };
        Ok(ToolResult::ok_with_data(message, args::data(&reminder)))
    }
}

pub struct ListRemindersTool {
    store: Arc<dyn ReminderStore>,
}

impl ListRemindersTool {
    pub fn new(store: Arc<dyn ReminderStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for ListRemindersTool {
    fn name(&self) -> &str {
        LIST
    }

    fn description(&self) -> &str {
        "Lista los recordatorios y citas agendados."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "enum": ["pending", "all"],
                    "description": "pending (por defecto) o all para incluir cancelados"
                }
            }
        })
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let include_cancelled = match args::optional_str(&input, "status") {
            None | Some("pending") => false,
            Some("all") => true,
            Some(other) => {
                return Err(ToolError::InvalidArguments(format!(
                    "unknown status '{other}'"
                )));
            }
        };

        let reminders = self
            .store
            .list(&ctx.chatbot_id, include_cancelled)
            .await
            .map_err(|e| store_error(LIST, e))?;

        if reminders.is_empty() {
            return Ok(ToolResult::ok("No hay recordatorios agendados."));
        }

        let lines: Vec<String> = reminders
            .iter()
            .map(|r| match r.status {
                ReminderStatus::Pending => format!("• {}", describe(r)),
                ReminderStatus::Cancelled => format!("• {} (cancelado)", describe(r)),
            })
            .collect();
        Ok(ToolResult::ok_with_data(
            format!("Recordatorios ({}):\n{}", reminders.len(), lines.join("\n")),
            args::data(&reminders),
        ))
    }
}

pub struct UpdateReminderTool {
    store: Arc<dyn ReminderStore>,
}

impl UpdateReminderTool {
    pub fn new(store: Arc<dyn ReminderStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for UpdateReminderTool {
    fn name(&self) -> &str {
        UPDATE
    }

    fn description(&self) -> &str {
        "Cambia el título, la fecha o la hora de un recordatorio existente."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "Id del recordatorio" },
                "title": { "type": "string" },
                "date": { "type": "string", "description": "Nueva fecha YYYY-MM-DD" },
                "time": { "type": "string", "description": "Nueva hora HH:MM" }
            },
            "required": ["id"]
        })
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let id = args::required_str(&input, "id")?;
        let patch = ReminderPatch {
            title: args::optional_str(&input, "title").map(String::from),
            date: args::date(&input, "date")?,
            time: args::time(&input, "time")?,
        };
        if patch.is_empty() {
            return Err(ToolError::InvalidArguments(
                "nothing to update: give a title, date or time".into(),
            ));
        }
        if patch.date.is_some_and(|d| d < today()) {
            return Err(ToolError::InvalidArguments(
                "'date' must not be in the past".into(),
            ));
        }

        let reminder = self
            .store
            .update(&ctx.chatbot_id, id, patch)
            .await
            .map_err(|e| store_error(UPDATE, e))?;
        Ok(ToolResult::ok_with_data(
            format!("✅ Recordatorio actualizado exitosamente: {}", describe(&reminder)),
            args::data(&reminder),
        ))
    }
}

pub struct CancelReminderTool {
    store: Arc<dyn ReminderStore>,
}

impl CancelReminderTool {
    pub fn new(store: Arc<dyn ReminderStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for CancelReminderTool {
    fn name(&self) -> &str {
        CANCEL
    }

    fn description(&self) -> &str {
        "Cancela un recordatorio o cita por su id."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "Id del recordatorio" }
            },
            "required": ["id"]
        })
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let id = args::required_str(&input, "id")?;
        let reminder = self
            .store
            .cancel(&ctx.chatbot_id, id)
            .await
            .map_err(|e| store_error(CANCEL, e))?;
        Ok(ToolResult::ok(format!(
            "✅ Recordatorio cancelado: {}",
            describe(&reminder)
        )))
    }
}
