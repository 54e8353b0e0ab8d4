//! `orquesta decide`: Show the tool-need decision for a message.
//!
//! Runs the pattern scan and deep analysis only; the LLM reminder
//! classifier is left out so no network call is made.

use super::TenantArgs;
use orquesta_agent::decision::{DecisionThresholds, PatternScanner};
use orquesta_agent::{DecisionCache, DecisionContext, DecisionEngine};
use orquesta_config::AppConfig;
use orquesta_core::tenant::ToolContext;
use orquesta_providers::ModelCapabilities;
use std::sync::Arc;

pub async fn run(message: &str, tenant: &TenantArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let scanner = Arc::new(PatternScanner::new()?);
    let engine = DecisionEngine::new(
        scanner.clone(),
        Arc::new(DecisionCache::from_config(&config.decision)),
    )
    .with_thresholds(DecisionThresholds::from_config(&config.decision));

    let supports_tools =
        ModelCapabilities::from_config(&config.models).supports_tools(&config.default_model);
    let mut ctx = ToolContext::new(&tenant.tenant, tenant.plan).with_chatbot(&tenant.chatbot);
    ctx.integrations = tenant.active_integrations();

    let decision = engine
        .decide(message, &DecisionContext::new(&ctx, supports_tools))
        .await;
    let scan = scanner.scan(message);

    println!("{}", serde_json::to_string_pretty(&decision)?);
    eprintln!();
    eprintln!("  model:    {} (tools: {})", config.default_model, supports_tools);
    eprintln!("  families: {}", scan.describe().join(", "));
    Ok(())
}
