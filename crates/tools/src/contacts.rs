//! `save_contact_info`: lead capture.

use crate::args;
use crate::backends::{Contact, ContactStore};
use async_trait::async_trait;
use orquesta_core::error::ToolError;
use orquesta_core::tenant::ToolContext;
use orquesta_core::tool::{ToolHandler, ToolResult};
use std::sync::Arc;
use tracing::info;

pub const NAME: &str = "save_contact_info";

pub struct SaveContactInfoTool {
    store: Arc<dyn ContactStore>,
}

impl SaveContactInfoTool {
    pub fn new(store: Arc<dyn ContactStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for SaveContactInfoTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Guarda los datos de contacto de un cliente interesado (nombre, email, teléfono, empresa). Requiere email o teléfono."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "email": { "type": "string" },
                "phone": { "type": "string" },
                "company": { "type": "string" },
                "notes": { "type": "string", "description": "Qué le interesa al cliente" }
            }
        })
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let email = args::optional_str(&input, "email");
        let phone = args::optional_str(&input, "phone");

        if email.is_none() && phone.is_none() {
            return Err(ToolError::InvalidArguments(
                "an 'email' or 'phone' is required".into(),
            ));
        }
        if let Some(email) = email
            && !args::looks_like_email(email)
        {
            return Err(ToolError::InvalidArguments(format!(
                "'{email}' is not a valid email"
            )));
        }
        if let Some(phone) = phone
            && !args::looks_like_phone(phone)
        {
            return Err(ToolError::InvalidArguments(format!(
                "'{phone}' is not a valid phone number"
            )));
        }

        let contact = Contact {
            chatbot_id: ctx.chatbot_id.clone(),
            name: args::optional_str(&input, "name").map(String::from),
            email: email.map(str::to_lowercase),
            phone: phone.map(String::from),
            company: args::optional_str(&input, "company").map(String::from),
            notes: args::optional_str(&input, "notes").map(String::from),
        };

        let (stored, created) =
            self.store
                .upsert(contact)
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: NAME.into(),
                    reason: e.to_string(),
                })?;

        info!(tenant = %ctx.tenant_id, created, "Contact saved");

        let who = stored
            .name
            .clone()
            .or_else(|| stored.email.clone())
            .or_else(|| stored.phone.clone())
            .unwrap_or_default();
        let message = if created {
            format!("✅ Contacto guardado exitosamente: {who}")
        } else {
            format!("✅ Contacto actualizado exitosamente: {who}")
        };
        Ok(ToolResult::ok_with_data(message, args::data(&stored)))
    }
}
