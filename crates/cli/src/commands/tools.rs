//! `orquesta tools`: List the tool catalog and a tenant's access to it.

use super::TenantArgs;
use orquesta_config::AppConfig;
use orquesta_core::tool::GateCheck;
use orquesta_tools::ToolBackends;

fn status(check: &GateCheck) -> String {
    match check {
        GateCheck::Allowed => "✅ disponible".into(),
        GateCheck::Disabled => "⛔ deshabilitada".into(),
        GateCheck::Unknown => "? desconocida".into(),
        GateCheck::PlanRequired { .. } => "🔒 requiere otro plan".into(),
        GateCheck::IntegrationRequired { missing } => {
            let missing: Vec<&str> = missing.iter().map(|k| k.as_str()).collect();
            format!("🔌 falta {}", missing.join(", "))
        }
    }
}

pub async fn run(tenant: &TenantArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let registry = orquesta_tools::catalog(&ToolBackends::in_memory(), &config.tools)?;
    let integrations = tenant.active_integrations();

    println!("Tools for {} ({})", tenant.tenant, tenant.plan);
    println!("─────────────────────────────────────");
    for tool in registry.iter() {
        let plans: Vec<&str> = tool.required_plans.iter().map(|p| p.as_str()).collect();
        println!("  {:<22} {}", tool.name, status(&tool.check(tenant.plan, &integrations)));
        println!("  {:<22} plans: {}", "", plans.join(", "));
    }
    println!();
    println!("  {} tools registered", registry.len());
    Ok(())
}
