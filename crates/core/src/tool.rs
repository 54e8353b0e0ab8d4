//! Tool trait and the plan-gated tool registry.
//!
//! Tools are the side-effecting capabilities a chatbot can use: payment
//! links, reminders, contact capture, analytics. The registry is an
//! immutable catalog built at startup; it filters tools by plan tier and
//! connected integrations and dispatches calls by name.
//!
//! The registry boundary never raises: unknown tools, disabled tools,
//! entitlement failures, handler errors and handler panics all come back
//! as a [`ToolResult`] with `success: false`.

use crate::error::ToolError;
use crate::provider::ToolSpec;
use crate::tenant::{ActiveIntegrations, IntegrationKey, PlanTier, ToolContext};
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// The outcome of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,

    /// Human-readable outcome, surfaced to the model and possibly the user
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn ok_with_data(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

/// The handler behind a catalog entry.
///
/// Each built-in tool implements this trait. Handlers receive already
/// gated calls; they validate their own input and report business
/// failures as `Ok(ToolResult::failure(..))` or `Err(ToolError)`.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Unique name (e.g. "create_payment_link").
    fn name(&self) -> &str;

    /// Natural-language description surfaced to the LLM.
    fn description(&self) -> &str;

    /// JSON Schema of the accepted input object.
    fn input_schema(&self) -> serde_json::Value;

    async fn execute(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> std::result::Result<ToolResult, ToolError>;
}

/// Entitlements a tool requires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolGate {
    pub plans: BTreeSet<PlanTier>,
    pub integrations: BTreeSet<IntegrationKey>,
}

impl ToolGate {
    /// Available on every plan, no integration needed.
    pub fn open() -> Self {
        Self::plans(PlanTier::ALL)
    }

    pub fn plans(plans: impl IntoIterator<Item = PlanTier>) -> Self {
        Self {
            plans: plans.into_iter().collect(),
            integrations: BTreeSet::new(),
        }
    }

    pub fn requires(mut self, integration: IntegrationKey) -> Self {
        self.integrations.insert(integration);
        self
    }
}

/// An immutable catalog entry.
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub required_plans: BTreeSet<PlanTier>,
    pub required_integrations: BTreeSet<IntegrationKey>,
    pub enabled: bool,
    handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("required_plans", &self.required_plans)
            .field("required_integrations", &self.required_integrations)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl ToolDefinition {
    pub fn new(handler: Arc<dyn ToolHandler>, gate: ToolGate) -> Self {
        Self {
            name: handler.name().to_string(),
            description: handler.description().to_string(),
            input_schema: handler.input_schema(),
            required_plans: gate.plans,
            required_integrations: gate.integrations,
            enabled: true,
            handler,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// The LLM-facing projection of this entry.
    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.input_schema.clone(),
        }
    }

    /// Entitlement check for a plan and set of connected integrations.
    pub fn check(&self, plan: PlanTier, integrations: &ActiveIntegrations) -> GateCheck {
        if !self.enabled {
            return GateCheck::Disabled;
        }
        if !self.required_plans.contains(&plan) {
            return GateCheck::PlanRequired {
                plans: self.required_plans.iter().copied().collect(),
            };
        }
        let missing: Vec<IntegrationKey> = self
            .required_integrations
            .iter()
            .filter(|key| !integrations.contains_key(key))
            .copied()
            .collect();
        if !missing.is_empty() {
            return GateCheck::IntegrationRequired { missing };
        }
        GateCheck::Allowed
    }

    /// Names of the required properties declared by the input schema.
    pub fn required_fields(&self) -> Vec<&str> {
        self.input_schema["required"]
            .as_array()
            .map(|fields| fields.iter().filter_map(|f| f.as_str()).collect())
            .unwrap_or_default()
    }
}

/// Why a tool can or cannot be used by a tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateCheck {
    Allowed,
    Unknown,
    Disabled,
    /// The tenant's plan is not in the tool's plan set.
    PlanRequired { plans: Vec<PlanTier> },
    /// One or more required integrations are not connected.
    IntegrationRequired { missing: Vec<IntegrationKey> },
}

impl GateCheck {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// The immutable tool catalog.
///
/// Registration order is preserved and is the order tools are offered to
/// the model. Shared between requests as `Arc<ToolRegistry>`.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition.
    ///
    /// Duplicate names and input schemas that are not JSON object schemas
    /// are programmer errors and are rejected.
    pub fn register(&mut self, definition: ToolDefinition) -> std::result::Result<(), ToolError> {
        if definition.name.trim().is_empty() {
            return Err(ToolError::InvalidDefinition("tool name is empty".into()));
        }
        if self.index.contains_key(&definition.name) {
            return Err(ToolError::InvalidDefinition(format!(
                "duplicate tool name '{}'",
                definition.name
            )));
        }
        if definition.input_schema["type"] != "object" {
            return Err(ToolError::InvalidDefinition(format!(
                "tool '{}' input schema must be an object schema",
                definition.name
            )));
        }
        if definition.required_plans.is_empty() {
            return Err(ToolError::InvalidDefinition(format!(
                "tool '{}' is not available on any plan",
                definition.name
            )));
        }
        self.index
            .insert(definition.name.clone(), self.tools.len());
        self.tools.push(definition);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// All registered names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tools a tenant may offer to the model.
    ///
    /// Returns nothing when the model cannot call tools; otherwise the
    /// enabled tools whose plan set contains `plan` and whose required
    /// integrations are all connected.
    pub fn list_available(
        &self,
        plan: PlanTier,
        integrations: &ActiveIntegrations,
        model_supports_tools: bool,
    ) -> Vec<&ToolDefinition> {
        if !model_supports_tools {
            return Vec::new();
        }
        self.tools
            .iter()
            .filter(|t| t.check(plan, integrations).is_allowed())
            .collect()
    }

    /// LLM-facing specs for [`list_available`](Self::list_available).
    pub fn specs_for(
        &self,
        plan: PlanTier,
        integrations: &ActiveIntegrations,
        model_supports_tools: bool,
    ) -> Vec<ToolSpec> {
        self.list_available(plan, integrations, model_supports_tools)
            .into_iter()
            .map(ToolDefinition::spec)
            .collect()
    }

    /// Entitlement check by name.
    pub fn gate_for(
        &self,
        name: &str,
        plan: PlanTier,
        integrations: &ActiveIntegrations,
    ) -> GateCheck {
        match self.get(name) {
            Some(def) => def.check(plan, integrations),
            None => GateCheck::Unknown,
        }
    }

    /// Dispatch a call by name inside a failure boundary.
    pub async fn dispatch(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> ToolResult {
        let Some(def) = self.get(name) else {
            warn!(tool = %name, "Dispatch to unknown tool");
            return ToolResult::failure(format!("La herramienta '{name}' no existe."));
        };

        match def.check(ctx.plan, &ctx.integrations) {
            GateCheck::Allowed => {}
            GateCheck::Disabled => {
                return ToolResult::failure(format!(
                    "La herramienta '{name}' está deshabilitada."
                ));
            }
            GateCheck::PlanRequired { .. } => {
                return ToolResult::failure(format!(
                    "La herramienta '{name}' no está incluida en el plan {}.",
                    ctx.plan
                ));
            }
            GateCheck::IntegrationRequired { missing } => {
                let missing: Vec<&str> = missing.iter().map(|k| k.as_str()).collect();
                return ToolResult::failure(format!(
                    "La herramienta '{name}' requiere la integración: {}.",
                    missing.join(", ")
                ));
            }
            GateCheck::Unknown => {
                return ToolResult::failure(format!("La herramienta '{name}' no existe."));
            }
        }

        debug!(tool = %name, tenant = %ctx.tenant_id, "Dispatching tool");
        let call = def.handler.execute(input, ctx);
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(tool = %name, error = %e, "Tool returned an error");
                ToolResult::failure(e.to_string())
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                error!(tool = %name, reason = %reason, "Tool handler panicked");
                ToolResult::failure(format!("Tool '{name}' failed internally: {reason}"))
            }
        }
    }
}
