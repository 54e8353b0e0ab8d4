//! Phase 2: deep contextual analysis.
//!
//! Re-weights a phase-1 scan with what the scan cannot see: whether the
//! tenant connected the integrations a tool needs, the plan tier and
//! whether the selected model can call tools at all.

use super::DecisionContext;
use super::patterns::PatternScan;
use orquesta_core::tenant::{IntegrationKey, PlanTier};
use orquesta_tools::names;

pub const STRIPE_BONUS: i32 = 10;
pub const STRIPE_MISSING_PENALTY: i32 = -25;
pub const FREE_PLAN_PENALTY: i32 = -30;
pub const ENTERPRISE_BONUS: i32 = 5;
pub const NO_TOOL_SUPPORT_PENALTY: i32 = -40;

/// Result of deep analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    /// 0..=100
    pub confidence: u8,
    pub suggested_tools: Vec<String>,
    /// Every adjustment, in the order applied
    pub reasoning: Vec<String>,
}

pub fn analyze(scan: &PatternScan, ctx: &DecisionContext<'_>) -> Analysis {
    let mut confidence = i32::from(scan.confidence);
    let mut reasoning = scan.describe();
    let mut suggested_tools = scan.suggested_tools.clone();

    let mut adjust = |delta: i32, why: String| {
        confidence += delta;
        reasoning.push(format!("{why} {delta:+}"));
    };

    if suggested_tools.iter().any(|t| t == names::CREATE_PAYMENT_LINK) {
        if ctx.integrations.contains_key(&IntegrationKey::Stripe) {
            adjust(STRIPE_BONUS, "stripe connected".into());
        } else {
            adjust(STRIPE_MISSING_PENALTY, "stripe not connected".into());
            suggested_tools.retain(|t| t != names::CREATE_PAYMENT_LINK);
        }
    }

    match ctx.plan {
        PlanTier::Free => adjust(FREE_PLAN_PENALTY, "plan FREE".into()),
        PlanTier::Enterprise => adjust(ENTERPRISE_BONUS, "plan ENTERPRISE".into()),
        _ => {}
    }

    if !ctx.model_supports_tools {
        adjust(NO_TOOL_SUPPORT_PENALTY, "model cannot call tools".into());
    }

    Analysis {
        confidence: confidence.clamp(0, 100) as u8,
        suggested_tools,
        reasoning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::patterns::PatternScanner;
    use orquesta_core::tenant::{ActiveIntegrations, Credentials};

    fn scan(message: &str) -> PatternScan {
        PatternScanner::new().unwrap().scan(message)
    }

    fn ctx(plan: PlanTier, integrations: &ActiveIntegrations, tools: bool) -> DecisionContext<'_> {
        DecisionContext {
            tenant_id: "acme",
            plan,
            integrations,
            model_supports_tools: tools,
        }
    }

    fn stripe() -> ActiveIntegrations {
        [(IntegrationKey::Stripe, Credentials::new().with("secret_key", "sk"))]
            .into_iter()
            .collect()
    }

    #[test]
    fn stripe_boosts_payment() {
        let integrations = stripe();
        let analysis = analyze(
            &scan("quiero pagar"),
            &ctx(PlanTier::Pro, &integrations, true),
        );
        assert_eq!(analysis.confidence, 50);
        assert_eq!(analysis.suggested_tools, vec![names::CREATE_PAYMENT_LINK]);
        assert!(analysis.reasoning.iter().any(|r| r == "stripe connected +10"));
    }

    #[test]
    fn missing_stripe_drops_payment_tool() {
        let none = ActiveIntegrations::new();
        let analysis = analyze(
            &scan("quiero pagar, mi correo es ana@example.com"),
            &ctx(PlanTier::Pro, &none, true),
        );
        assert_eq!(analysis.confidence, 100 - 25);
        assert_eq!(analysis.suggested_tools, vec![names::SAVE_CONTACT_INFO]);
    }

    #[test]
    fn plan_and_model_adjustments() {
        let integrations = stripe();
        let message = "link de pago por $500";

        let free = analyze(&scan(message), &ctx(PlanTier::Free, &integrations, true));
        assert_eq!(free.confidence, 80);

        let enterprise = analyze(
            &scan("quiero pagar"),
            &ctx(PlanTier::Enterprise, &integrations, true),
        );
        assert_eq!(enterprise.confidence, 55);

        let no_tools = analyze(&scan(message), &ctx(PlanTier::Pro, &integrations, false));
        assert_eq!(no_tools.confidence, 70);
        assert!(no_tools.reasoning.last().unwrap().contains("-40"));
    }

    #[test]
    fn never_leaves_range() {
        let none = ActiveIntegrations::new();
        let analysis = analyze(&scan("pagar"), &ctx(PlanTier::Free, &none, false));
        assert_eq!(analysis.confidence, 0);
    }
}
