//! Built-in business tools for Orquesta chatbots.
//!
//! Tools let a chatbot act for the business: charge through Stripe, book
//! reminders, capture leads, report usage and tell the time. Each tool is
//! a [`ToolHandler`](orquesta_core::ToolHandler) over a backend trait from
//! [`backends`], gated by plan tier and integrations in the catalog.

mod args;
pub mod analytics;
pub mod backends;
pub mod contacts;
pub mod datetime;
pub mod payment_link;
pub mod reminders;

use orquesta_config::ToolsConfig;
use orquesta_core::error::ToolError;
use orquesta_core::tenant::{IntegrationKey, PlanTier};
use orquesta_core::tool::{ToolDefinition, ToolGate, ToolRegistry};
use std::sync::Arc;

pub use backends::ToolBackends;

/// Tool names, for callers that refer to tools without a registry at hand.
pub mod names {
    pub use crate::analytics::NAME as GET_CHATBOT_STATS;
    pub use crate::contacts::NAME as SAVE_CONTACT_INFO;
    pub use crate::datetime::NAME as GET_CURRENT_DATETIME;
    pub use crate::payment_link::NAME as CREATE_PAYMENT_LINK;
    pub use crate::reminders::{
        CANCEL as CANCEL_REMINDER, LIST as LIST_REMINDERS, SCHEDULE as SCHEDULE_REMINDER,
        UPDATE as UPDATE_REMINDER,
    };
}

/// Every paid tier, trial included.
pub const PAID_PLANS: [PlanTier; 4] = [
    PlanTier::Trial,
    PlanTier::Starter,
    PlanTier::Pro,
    PlanTier::Enterprise,
];

pub const ANALYTICS_PLANS: [PlanTier; 2] = [PlanTier::Pro, PlanTier::Enterprise];

/// Build the tool catalog over the given backends.
///
/// Tools named in `config.disabled` stay in the catalog with
/// `enabled = false`, so the executor can tell the user they are off.
pub fn catalog(backends: &ToolBackends, config: &ToolsConfig) -> Result<ToolRegistry, ToolError> {
    let store = &backends.reminders;
    let definitions = [
        ToolDefinition::new(
            Arc::new(payment_link::CreatePaymentLinkTool::new(
                backends.payments.clone(),
                &config.default_currency,
            )),
            ToolGate::plans(PAID_PLANS).requires(IntegrationKey::Stripe),
        ),
        ToolDefinition::new(
            Arc::new(reminders::ScheduleReminderTool::new(store.clone())),
            ToolGate::plans(PAID_PLANS),
        ),
        ToolDefinition::new(
            Arc::new(reminders::ListRemindersTool::new(store.clone())),
            ToolGate::plans(PAID_PLANS),
        ),
        ToolDefinition::new(
            Arc::new(reminders::UpdateReminderTool::new(store.clone())),
            ToolGate::plans(PAID_PLANS),
        ),
        ToolDefinition::new(
            Arc::new(reminders::CancelReminderTool::new(store.clone())),
            ToolGate::plans(PAID_PLANS),
        ),
        ToolDefinition::new(
            Arc::new(contacts::SaveContactInfoTool::new(backends.contacts.clone())),
            ToolGate::plans(PAID_PLANS),
        ),
        ToolDefinition::new(
            Arc::new(analytics::GetChatbotStatsTool::new(backends.analytics.clone())),
            ToolGate::plans(ANALYTICS_PLANS),
        ),
        ToolDefinition::new(Arc::new(datetime::GetCurrentDatetimeTool), ToolGate::open()),
    ];

    for name in &config.disabled {
        if !definitions.iter().any(|d| &d.name == name) {
            tracing::warn!(tool = %name, "Disabled tool is not in the catalog");
        }
    }

    let mut registry = ToolRegistry::new();
    for definition in definitions {
        let enabled = !config.disabled.contains(&definition.name);
        registry.register(definition.with_enabled(enabled))?;
    }
    Ok(registry)
}
