//! The decision engine: cache lookup, pattern scan, optional reminder
//! classification and deep analysis.

use super::analysis::analyze;
use super::cache::DecisionCache;
use super::classifier::{LlmReminderClassifier, ReminderClassifier};
use super::patterns::PatternScanner;
use super::{Decision, DecisionContext, DecisionThresholds};
use orquesta_config::DecisionConfig;
use orquesta_core::provider::Provider;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct DecisionEngine {
    scanner: Arc<PatternScanner>,
    cache: Arc<DecisionCache>,
    thresholds: DecisionThresholds,
    classifier: Option<Arc<dyn ReminderClassifier>>,
    classifier_timeout: Duration,
    deep_analyses: AtomicU64,
}

impl DecisionEngine {
    pub fn new(scanner: Arc<PatternScanner>, cache: Arc<DecisionCache>) -> Self {
        Self {
            scanner,
            cache,
            thresholds: DecisionThresholds::default(),
            classifier: None,
            classifier_timeout: Duration::from_millis(1_500),
            deep_analyses: AtomicU64::new(0),
        }
    }

    /// Engine with thresholds and, when enabled, an LLM reminder classifier
    /// on `provider`.
    pub fn from_config(
        config: &DecisionConfig,
        scanner: Arc<PatternScanner>,
        cache: Arc<DecisionCache>,
        provider: Arc<dyn Provider>,
        default_model: &str,
    ) -> Self {
        let engine = Self::new(scanner, cache).with_thresholds(DecisionThresholds::from_config(config));
        if !config.classifier_enabled {
            return engine;
        }
        let model = config
            .classifier_model
            .clone()
            .unwrap_or_else(|| default_model.to_string());
        engine.with_classifier(
            Arc::new(LlmReminderClassifier::new(provider, model)),
            Duration::from_millis(config.classifier_timeout_ms),
        )
    }

    pub fn with_thresholds(mut self, thresholds: DecisionThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_classifier(
        mut self,
        classifier: Arc<dyn ReminderClassifier>,
        timeout: Duration,
    ) -> Self {
        self.classifier = Some(classifier);
        self.classifier_timeout = timeout;
        self
    }

    pub fn thresholds(&self) -> DecisionThresholds {
        self.thresholds
    }

    pub fn cache(&self) -> &DecisionCache {
        &self.cache
    }

    pub fn scanner(&self) -> &Arc<PatternScanner> {
        &self.scanner
    }

    /// How many times deep analysis has run.
    pub fn deep_analyses(&self) -> u64 {
        self.deep_analyses.load(Ordering::Relaxed)
    }

    /// Decide how to route `message`.
    ///
    /// Never fails: classifier errors fall back to keywords and every other
    /// step is pure.
    pub async fn decide(&self, message: &str, ctx: &DecisionContext<'_>) -> Decision {
        let started = Instant::now();
        let key = self.cache.key_for(message, ctx);
        if let Some(cached) = self.cache.get(&key) {
            debug!(tenant = %ctx.tenant_id, confidence = cached.confidence, "Decision cache hit");
            return cached;
        }

        let mut scan = self.scanner.scan(message);

        if scan.confidence < self.thresholds.analysis {
            let decision = Decision {
                needs_tools: false,
                confidence: scan.confidence,
                suggested_tools: scan.suggested_tools.clone(),
                should_stream: true,
                reasoning: format!(
                    "pattern scan only ({} < {}){}",
                    scan.confidence,
                    self.thresholds.analysis,
                    join_trace(&scan.describe())
                ),
                detection_time_ms: elapsed_ms(started),
                analyzed: false,
            };
            self.cache.insert(key, decision.clone());
            return decision;
        }

        if scan.mentions_scheduling()
            && let Some(classifier) = &self.classifier
        {
            match tokio::time::timeout(self.classifier_timeout, classifier.classify(message)).await
            {
                Ok(Ok(Some(intent))) => scan.set_reminder_intent(intent),
                Ok(Ok(None)) => debug!("Classifier saw no reminder intent, keeping keywords"),
                Ok(Err(e)) => warn!(error = %e, "Reminder classifier failed, using keywords"),
                Err(_) => warn!(
                    timeout_ms = self.classifier_timeout.as_millis() as u64,
                    "Reminder classifier timed out, using keywords"
                ),
            }
        }

        self.deep_analyses.fetch_add(1, Ordering::Relaxed);
        let analysis = analyze(&scan, ctx);
        let decision = Decision {
            needs_tools: analysis.confidence >= self.thresholds.tools,
            confidence: analysis.confidence,
            suggested_tools: analysis.suggested_tools,
            should_stream: analysis.confidence < self.thresholds.stream,
            reasoning: analysis.reasoning.join("; "),
            detection_time_ms: elapsed_ms(started),
            analyzed: true,
        };

        debug!(
            tenant = %ctx.tenant_id,
            confidence = decision.confidence,
            needs_tools = decision.needs_tools,
            tools = ?decision.suggested_tools,
            "Decision computed"
        );
        self.cache.insert(key, decision.clone());
        decision
    }
}

fn join_trace(lines: &[String]) -> String {
    if lines.is_empty() {
        String::new()
    } else {
        format!(": {}", lines.join("; "))
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::ReminderIntent;
    use async_trait::async_trait;
    use orquesta_core::error::ProviderError;
    use orquesta_core::tenant::{
        ActiveIntegrations, Credentials, IntegrationKey, PlanTier, ToolContext,
    };
    use orquesta_tools::names;

    fn engine() -> DecisionEngine {
        DecisionEngine::new(
            Arc::new(PatternScanner::new().unwrap()),
            Arc::new(DecisionCache::default()),
        )
    }

    fn pro_with_stripe() -> ToolContext {
        ToolContext::new("acme", PlanTier::Pro).with_integration(
            IntegrationKey::Stripe,
            Credentials::new().with("secret_key", "sk_test"),
        )
    }

    #[tokio::test]
    async fn payment_link_needs_tools() {
        let engine = engine();
        let ctx = pro_with_stripe();
        let decision = engine
            .decide("Genera un link de pago por $500", &DecisionContext::new(&ctx, true))
            .await;
        assert!(decision.needs_tools);
        assert!(!decision.should_stream);
        assert!(decision.analyzed);
        assert!(
            decision
                .suggested_tools
                .iter()
                .any(|t| t == names::CREATE_PAYMENT_LINK)
        );
    }

    #[tokio::test]
    async fn small_talk_short_circuits() {
        let engine = engine();
        let ctx = pro_with_stripe();
        let decision = engine
            .decide("¿Cómo estás?", &DecisionContext::new(&ctx, true))
            .await;
        assert!(!decision.needs_tools);
        assert!(decision.should_stream);
        assert!(!decision.analyzed);
        assert_eq!(engine.deep_analyses(), 0);
    }

    #[tokio::test]
    async fn cached_decision_is_identical_and_skips_analysis() {
        let engine = engine();
        let ctx = pro_with_stripe();
        let dctx = DecisionContext::new(&ctx, true);
        let first = engine.decide("Quiero pagar $1,200", &dctx).await;
        let second = engine.decide("  quiero PAGAR $1,200 ", &dctx).await;
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
        assert_eq!(engine.deep_analyses(), 1);
        assert_eq!(engine.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn capability_flag_changes_key() {
        let engine = engine();
        let ctx = pro_with_stripe();
        let capable = engine
            .decide("link de pago por $500", &DecisionContext::new(&ctx, true))
            .await;
        let incapable = engine
            .decide("link de pago por $500", &DecisionContext::new(&ctx, false))
            .await;
        assert_eq!(engine.deep_analyses(), 2);
        assert!(incapable.confidence < capable.confidence);
    }

    #[tokio::test]
    async fn custom_thresholds() {
        let engine = engine().with_thresholds(DecisionThresholds {
            analysis: 5,
            tools: 40,
            stream: 45,
        });
        let ctx = ToolContext::new("acme", PlanTier::Starter);
        let decision = engine
            .decide("¿Cuántas conversaciones tuve? dame estadísticas", &DecisionContext::new(&ctx, true))
            .await;
        assert_eq!(decision.confidence, 30);
        assert!(!decision.needs_tools);
        assert!(decision.should_stream);
        assert!(decision.analyzed);
    }

    struct FixedClassifier(Option<ReminderIntent>);

    #[async_trait]
    impl ReminderClassifier for FixedClassifier {
        async fn classify(&self, _: &str) -> Result<Option<ReminderIntent>, ProviderError> {
            Ok(self.0)
        }
    }

    struct SlowClassifier;

    #[async_trait]
    impl ReminderClassifier for SlowClassifier {
        async fn classify(&self, _: &str) -> Result<Option<ReminderIntent>, ProviderError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Some(ReminderIntent::Cancel))
        }
    }

    struct BrokenClassifier;

    #[async_trait]
    impl ReminderClassifier for BrokenClassifier {
        async fn classify(&self, _: &str) -> Result<Option<ReminderIntent>, ProviderError> {
            Err(ProviderError::Network("connection reset".into()))
        }
    }

    const RESCHEDULE: &str = "¿Me ayudas con la cita que tengo agendada para el viernes?";

    #[tokio::test]
    async fn classifier_picks_reminder_tool() {
        let engine = engine().with_classifier(
            Arc::new(FixedClassifier(Some(ReminderIntent::Update))),
            Duration::from_secs(1),
        );
        let ctx = ToolContext::new("acme", PlanTier::Pro);
        let decision = engine.decide(RESCHEDULE, &DecisionContext::new(&ctx, true)).await;
        assert_eq!(decision.suggested_tools, vec![names::UPDATE_REMINDER]);
    }

    #[tokio::test(start_paused = true)]
    async fn classifier_timeout_falls_back_to_keywords() {
        let engine = engine().with_classifier(Arc::new(SlowClassifier), Duration::from_millis(100));
        let ctx = ToolContext::new("acme", PlanTier::Pro);
        let decision = engine.decide(RESCHEDULE, &DecisionContext::new(&ctx, true)).await;
        // "tengo" reads as a listing request
        assert_eq!(decision.suggested_tools, vec![names::LIST_REMINDERS]);
    }

    #[tokio::test]
    async fn classifier_error_is_not_fatal() {
        let engine = engine().with_classifier(Arc::new(BrokenClassifier), Duration::from_secs(1));
        let ctx = ToolContext::new("acme", PlanTier::Pro);
        let decision = engine.decide(RESCHEDULE, &DecisionContext::new(&ctx, true)).await;
        assert_eq!(decision.suggested_tools, vec![names::LIST_REMINDERS]);
        assert!(decision.analyzed);
    }

    #[tokio::test]
    async fn free_plan_still_scores_payment_intent() {
        let engine = engine();
        let integrations: ActiveIntegrations = ActiveIntegrations::new();
        let ctx = DecisionContext {
            tenant_id: "free-co",
            plan: PlanTier::Free,
            integrations: &integrations,
            model_supports_tools: true,
        };
        let decision = engine.decide("Genera un link de pago por $500", &ctx).await;
        assert_eq!(decision.confidence, 100 - 25 - 30);
        assert!(decision.reasoning.contains("plan FREE"));
    }
}
