//! Subcommand implementations and the tenant flags they share.

pub mod chat;
pub mod config_cmd;
pub mod decide;
pub mod tools;

use orquesta_core::tenant::{ActiveIntegrations, Credentials, IntegrationKey, PlanTier};
use orquesta_core::collaborator::StaticTenantDirectory;

/// Who the CLI acts as.
#[derive(clap::Args, Debug, Clone)]
pub struct TenantArgs {
    /// Tenant (business) identifier
    #[arg(long, default_value = "demo", env = "ORQUESTA_TENANT")]
    pub tenant: String,

    #[arg(long, default_value = "cli-bot")]
    pub chatbot: String,

    /// Plan tier: FREE, TRIAL, STARTER, PRO, ENTERPRISE
    #[arg(long, default_value = "PRO")]
    pub plan: PlanTier,

    /// Connected integrations (repeatable): stripe, google_calendar, whatsapp, email
    #[arg(long = "integration", short = 'i')]
    pub integrations: Vec<IntegrationKey>,
}

impl TenantArgs {
    /// Integrations with local test credentials.
    pub fn active_integrations(&self) -> ActiveIntegrations {
        self.integrations
            .iter()
            .map(|key| {
                let credentials = match key {
                    IntegrationKey::Stripe => Credentials::new().with(
                        "secret_key",
                        std::env::var("ORQUESTA_STRIPE_KEY").unwrap_or_else(|_| "sk_test_local".into()),
                    ),
                    _ => Credentials::new().with("token", "local"),
                };
                (*key, credentials)
            })
            .collect()
    }

    /// A directory that knows exactly this tenant.
    pub fn directory(&self) -> StaticTenantDirectory {
        let directory = StaticTenantDirectory::new();
        directory.upsert(&self.tenant, self.plan, self.active_integrations());
        directory
    }
}
