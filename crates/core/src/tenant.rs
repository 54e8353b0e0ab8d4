//! Tenant entitlements and the per-invocation tool context.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// A tenant's subscription level. Ordered from least to most entitled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanTier {
    Free,
    Trial,
    Starter,
    Pro,
    Enterprise,
}

impl PlanTier {
    pub const ALL: [PlanTier; 5] = [
        PlanTier::Free,
        PlanTier::Trial,
        PlanTier::Starter,
        PlanTier::Pro,
        PlanTier::Enterprise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Trial => "TRIAL",
            Self::Starter => "STARTER",
            Self::Pro => "PRO",
            Self::Enterprise => "ENTERPRISE",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FREE" => Ok(Self::Free),
            "TRIAL" => Ok(Self::Trial),
            "STARTER" => Ok(Self::Starter),
            "PRO" => Ok(Self::Pro),
            "ENTERPRISE" => Ok(Self::Enterprise),
            other => Err(format!("unknown plan tier '{other}'")),
        }
    }
}

/// An external integration a tenant can connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationKey {
    Stripe,
    GoogleCalendar,
    WhatsApp,
    Email,
}

impl IntegrationKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
            Self::GoogleCalendar => "google_calendar",
            Self::WhatsApp => "whats_app",
            Self::Email => "email",
        }
    }
}

impl fmt::Display for IntegrationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntegrationKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "stripe" => Ok(Self::Stripe),
            "google_calendar" | "calendar" => Ok(Self::GoogleCalendar),
            "whatsapp" | "whats_app" => Ok(Self::WhatsApp),
            "email" => Ok(Self::Email),
            other => Err(format!("unknown integration '{other}'")),
        }
    }
}

/// Opaque credential values for one integration (API keys, account ids).
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials(pub BTreeMap<String, String>);

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|k| (k, "[REDACTED]")))
            .finish()
    }
}

/// Active integrations for a tenant, keyed by integration.
pub type ActiveIntegrations = HashMap<IntegrationKey, Credentials>;

/// Per-invocation context handed to every tool handler.
///
/// Built by the call that dispatches the tool and never shared between
/// concurrent requests.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub tenant_id: String,
    pub user_id: String,
    pub chatbot_id: String,
    pub conversation_id: String,
    pub plan: PlanTier,
    /// The raw inbound message that triggered this run
    pub user_message: String,
    pub integrations: ActiveIntegrations,
}

impl ToolContext {
    pub fn new(tenant_id: impl Into<String>, plan: PlanTier) -> Self {
        let tenant_id = tenant_id.into();
        Self {
            user_id: tenant_id.clone(),
            chatbot_id: String::new(),
            conversation_id: String::new(),
            tenant_id,
            plan,
            user_message: String::new(),
            integrations: HashMap::new(),
        }
    }

    pub fn with_chatbot(mut self, chatbot_id: impl Into<String>) -> Self {
        self.chatbot_id = chatbot_id.into();
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = conversation_id.into();
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = message.into();
        self
    }

    pub fn with_integration(mut self, key: IntegrationKey, credentials: Credentials) -> Self {
        self.integrations.insert(key, credentials);
        self
    }

    pub fn has_integration(&self, key: IntegrationKey) -> bool {
        self.integrations.contains_key(&key)
    }

    pub fn credentials(&self, key: IntegrationKey) -> Option<&Credentials> {
        self.integrations.get(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_tier_parse_and_display() {
        assert_eq!("pro".parse::<PlanTier>().unwrap(), PlanTier::Pro);
        assert_eq!(PlanTier::Enterprise.to_string(), "ENTERPRISE");
        assert!("platinum".parse::<PlanTier>().is_err());
    }

    #[test]
    fn plan_tiers_are_ordered() {
        assert!(PlanTier::Free < PlanTier::Starter);
        assert!(PlanTier::Pro < PlanTier::Enterprise);
    }

    #[test]
    fn plan_tier_serde_uses_upper_case() {
        let json = serde_json::to_string(&PlanTier::Starter).unwrap();
        assert_eq!(json, r#""STARTER""#);
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = Credentials::new().with("secret_key", "sk_live_123");
        let debug = format!("{creds:?}");
        assert!(debug.contains("secret_key"));
        assert!(!debug.contains("sk_live_123"));
    }

    #[test]
    fn context_builder() {
        let ctx = ToolContext::new("tenant-1", PlanTier::Pro)
            .with_chatbot("bot-9")
            .with_message("hola")
            .with_integration(IntegrationKey::Stripe, Credentials::new());
        assert_eq!(ctx.user_id, "tenant-1");
        assert!(ctx.has_integration(IntegrationKey::Stripe));
        assert!(!ctx.has_integration(IntegrationKey::WhatsApp));
    }

    #[test]
    fn integration_key_aliases() {
        assert_eq!(
            "WhatsApp".parse::<IntegrationKey>().unwrap(),
            IntegrationKey::WhatsApp
        );
        assert_eq!(
            "google-calendar".parse::<IntegrationKey>().unwrap(),
            IntegrationKey::GoogleCalendar
        );
    }
}
