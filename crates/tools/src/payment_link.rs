//! `create_payment_link`: hosted checkout links through the tenant's
//! connected Stripe account.

use crate::args;
use crate::backends::PaymentGateway;
use async_trait::async_trait;
use orquesta_core::error::ToolError;
use orquesta_core::tenant::{IntegrationKey, ToolContext};
use orquesta_core::tool::{ToolHandler, ToolResult};
use std::sync::Arc;
use tracing::info;

pub const NAME: &str = "create_payment_link";

pub struct CreatePaymentLinkTool {
    gateway: Arc<dyn PaymentGateway>,
    default_currency: String,
}

impl CreatePaymentLinkTool {
    pub fn new(gateway: Arc<dyn PaymentGateway>, default_currency: impl Into<String>) -> Self {
        Self {
            gateway,
            default_currency: default_currency.into().to_lowercase(),
        }
    }
}

#[async_trait]
impl ToolHandler for CreatePaymentLinkTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Crea un link de pago de Stripe por un monto y concepto. Úsalo cuando el cliente quiera pagar, cobrar o comprar algo."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "amount": {
                    "type": "number",
                    "description": "Monto a cobrar en unidades de la moneda (ej. 500 para $500)"
                },
                "description": {
                    "type": "string",
                    "description": "Concepto del cobro"
                },
                "currency": {
                    "type": "string",
                    "description": "Código ISO de la moneda (mxn, usd, ...)"
                }
            },
            "required": ["amount", "description"]
        })
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let amount = args::number(&input, "amount")
            .filter(|a| a.is_finite() && *a > 0.0)
            .ok_or_else(|| ToolError::InvalidArguments("'amount' must be a positive number".into()))?;
        let description = args::required_str(&input, "description")?;
        let currency = args::optional_str(&input, "currency")
            .map(str::to_lowercase)
            .unwrap_or_else(|| self.default_currency.clone());
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ToolError::InvalidArguments(
                "'currency' must be a 3-letter ISO code".into(),
            ));
        }

        let Some(credentials) = ctx.credentials(IntegrationKey::Stripe) else {
            return Ok(ToolResult::failure(
                "Stripe no está conectado para este negocio.",
            ));
        };

        let link = self
            .gateway
            .create_link(credentials, amount, &currency, description)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: NAME.into(),
                reason: e.to_string(),
            })?;

        info!(tenant = %ctx.tenant_id, amount, currency = %currency, "Payment link created");

        Ok(ToolResult::ok_with_data(
            format!(
                "✅ Link de pago creado exitosamente por ${amount:.2} {}: {}",
                currency.to_uppercase(),
                link.url
            ),
            serde_json::json!({
                "id": link.id,
                "url": link.url,
                "amount": amount,
                "currency": currency,
                "description": description,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryPayments;
    use orquesta_core::tenant::{Credentials, PlanTier};

    fn tool() -> (CreatePaymentLinkTool, Arc<InMemoryPayments>) {
        let payments = Arc::new(InMemoryPayments::new());
        (CreatePaymentLinkTool::new(payments.clone(), "mxn"), payments)
    }

    fn stripe_ctx() -> ToolContext {
        ToolContext::new("acme", PlanTier::Pro).with_integration(
            IntegrationKey::Stripe,
            Credentials::new().with("secret_key", "sk_test"),
        )
    }

    #[tokio::test]
    async fn creates_link_with_default_currency() {
        let (tool, payments) = tool();
        let result = tool
            .execute(
                serde_json::json!({"amount": 500, "description": "Consulta"}),
                &stripe_ctx(),
            )
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.message.contains("$500.00 MXN"));
        assert!(result.message.contains("https://"));
        assert_eq!(result.data.unwrap()["currency"], "mxn");
        assert_eq!(payments.issued().await.len(), 1);
    }

    #[tokio::test]
    async fn rejects_bad_amounts_and_currency() {
        let (tool, _) = tool();
        for input in [
            serde_json::json!({"amount": -5, "description": "x"}),
            serde_json::json!({"amount": "gratis", "description": "x"}),
            serde_json::json!({"amount": 10, "description": "x", "currency": "pesos"}),
            serde_json::json!({"amount": 10}),
        ] {
            assert!(matches!(
                tool.execute(input, &stripe_ctx()).await,
                Err(ToolError::InvalidArguments(_))
            ));
        }
    }

    #[tokio::test]
    async fn missing_stripe_is_a_failure_result() {
        let (tool, _) = tool();
        let result = tool
            .execute(
                serde_json::json!({"amount": 10, "description": "x"}),
                &ToolContext::new("acme", PlanTier::Pro),
            )
            .await
            .unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn gateway_rejection_is_execution_failure() {
        let (tool, _) = tool();
        let ctx = ToolContext::new("acme", PlanTier::Pro)
            .with_integration(IntegrationKey::Stripe, Credentials::new());
        assert!(matches!(
            tool.execute(serde_json::json!({"amount": 10, "description": "x"}), &ctx)
                .await,
            Err(ToolError::ExecutionFailed { .. })
        ));
    }
}
