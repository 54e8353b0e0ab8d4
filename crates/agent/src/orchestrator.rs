//! Chat orchestrator: one entry point per incoming message.
//!
//! Resolves the tenant's entitlements, asks the decision engine whether
//! the message needs tools, then either answers with a single
//! conversational call or hands the message to the ReAct executor. Every
//! request, failed ones included, leaves a [`RequestMetric`] behind.

use crate::decision::{Decision, DecisionCache, DecisionContext, DecisionEngine, PatternScanner};
use crate::error::AgentError;
use crate::react::prompt::build_conversation_prompt;
use crate::react::{AgentSettings, CompletionPolicy, LexicalCompletion, ReactExecutor, RunOutcome};
use crate::stream_event::{AgentEvent, DoneMetadata};
use orquesta_config::AppConfig;
use orquesta_core::collaborator::{ContextRetriever, RetrievedChunk, TenantDirectory};
use orquesta_core::error::ProviderError;
use orquesta_core::provider::{Provider, ProviderRequest};
use orquesta_core::tenant::{ActiveIntegrations, PlanTier, ToolContext};
use orquesta_core::tool::ToolRegistry;
use orquesta_providers::ModelCapabilities;
use orquesta_telemetry::{PerformanceMonitor, RequestMetric};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// The reply to one chat message.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub request_id: String,
    pub content: String,
    pub decision: Decision,
    pub tools_used: Vec<String>,
    /// 0 on the conversational path
    pub iterations: u32,
    pub success: bool,
    pub provider: Option<String>,
    pub fallback_used: bool,
    pub response_ms: u64,
}

/// What either path produced, before it becomes a reply or a metric.
struct Answer {
    content: String,
    tools_used: Vec<String>,
    /// Every tool call, including failed ones
    tools_invoked: Vec<String>,
    iterations: u32,
    success: bool,
    provider: Option<String>,
    fallback_used: bool,
}

impl From<RunOutcome> for Answer {
    fn from(outcome: RunOutcome) -> Self {
        Self {
            tools_invoked: outcome.memory.tools_attempted(),
            content: outcome.content,
            tools_used: outcome.tools_used,
            iterations: outcome.iterations,
            success: outcome.success,
            provider: outcome.provider,
            fallback_used: outcome.fallback_used,
        }
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    decisions: Arc<DecisionEngine>,
    executor: ReactExecutor,
    monitor: Arc<PerformanceMonitor>,
    capabilities: ModelCapabilities,
    retriever: Option<Arc<dyn ContextRetriever>>,
    directory: Option<Arc<dyn TenantDirectory>>,
    settings: AgentSettings,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
        decisions: Arc<DecisionEngine>,
        monitor: Arc<PerformanceMonitor>,
        settings: AgentSettings,
    ) -> Self {
        let executor = ReactExecutor::new(
            provider.clone(),
            registry.clone(),
            decisions.scanner().clone(),
            settings.clone(),
        );
        Self {
            provider,
            registry,
            decisions,
            executor,
            monitor,
            capabilities: ModelCapabilities::default(),
            retriever: None,
            directory: None,
            settings,
        }
    }

    /// Wire everything from configuration around an already-built
    /// provider and tool catalog.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
    ) -> Result<Self, AgentError> {
        let scanner = Arc::new(PatternScanner::new()?);
        let cache = Arc::new(DecisionCache::from_config(&config.decision));
        let decisions = Arc::new(DecisionEngine::from_config(
            &config.decision,
            scanner,
            cache,
            provider.clone(),
            &config.default_model,
        ));
        let monitor = Arc::new(PerformanceMonitor::from_config(&config.telemetry));

        Ok(Self::new(
            provider,
            registry,
            decisions,
            monitor,
            AgentSettings::from_config(config),
        )
        .with_capabilities(ModelCapabilities::from_config(&config.models))
        .with_completion(Arc::new(LexicalCompletion::new(
            &config.agent.completion_markers,
        ))))
    }

    pub fn with_capabilities(mut self, capabilities: ModelCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_completion(mut self, completion: Arc<dyn CompletionPolicy>) -> Self {
        self.executor = self.executor.with_completion(completion);
        self
    }

    /// Knowledge source for both the conversational path and THINK prompts.
    pub fn with_retriever(mut self, retriever: Arc<dyn ContextRetriever>) -> Self {
        self.executor = self.executor.with_retriever(retriever.clone());
        self.retriever = Some(retriever);
        self
    }

    pub fn with_directory(mut self, directory: Arc<dyn TenantDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn decisions(&self) -> &Arc<DecisionEngine> {
        &self.decisions
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    pub fn supports_tools(&self) -> bool {
        self.capabilities.supports_tools(&self.settings.model)
    }

    /// Resolve plan and integrations for a tenant.
    ///
    /// Without a directory, or when it fails, the tenant is treated as
    /// FREE with nothing connected.
    pub async fn prepare_context(
        &self,
        tenant_id: &str,
        chatbot_id: &str,
        message: &str,
    ) -> ToolContext {
        let (plan, integrations) = match &self.directory {
            Some(directory) => {
                let plan = directory.get_plan(tenant_id).await.unwrap_or_else(|e| {
                    warn!(tenant = %tenant_id, "Plan lookup failed, assuming FREE: {e}");
                    PlanTier::Free
                });
                let integrations = directory
                    .get_active_integrations(tenant_id)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(tenant = %tenant_id, "Integration lookup failed: {e}");
                        ActiveIntegrations::new()
                    });
                (plan, integrations)
            }
            None => (PlanTier::Free, ActiveIntegrations::new()),
        };

        let mut ctx = ToolContext::new(tenant_id, plan)
            .with_chatbot(chatbot_id)
            .with_message(message);
        ctx.integrations = integrations;
        ctx
    }

    /// The tool-need decision for a message, without acting on it.
    pub async fn decide(&self, message: &str, ctx: &ToolContext) -> Decision {
        self.decisions
            .decide(message, &DecisionContext::new(ctx, self.supports_tools()))
            .await
    }

    /// Handle one message end to end.
    pub async fn handle(&self, message: &str, ctx: &ToolContext) -> Result<ChatReply, AgentError> {
        let started = Instant::now();
        let request_id = uuid::Uuid::new_v4().to_string();
        let decision = self.decide(message, ctx).await;

        info!(
            request_id = %request_id,
            tenant = %ctx.tenant_id,
            needs_tools = decision.needs_tools,
            confidence = decision.confidence,
            "Handling message"
        );

        let result = if decision.needs_tools {
            let tools = self.offered_tools(ctx);
            self.executor
                .run(message, ctx, &tools)
                .await
                .map(Answer::from)
        } else {
            self.converse(message, ctx).await
        };

        let mut metric = self.metric(&request_id, ctx, &decision);
        metric.response_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(answer) => {
                fill_metric(&mut metric, &answer);
                self.monitor.record(metric);
                Ok(ChatReply {
                    request_id,
                    content: answer.content,
                    decision,
                    tools_used: answer.tools_used,
                    iterations: answer.iterations,
                    success: answer.success,
                    provider: answer.provider,
                    fallback_used: answer.fallback_used,
                    response_ms: started.elapsed().as_millis() as u64,
                })
            }
            Err(err) => {
                warn!(request_id = %request_id, error = %err, "Request failed");
                metric.error_type = Some(err.kind().to_string());
                self.monitor.record(metric);
                Err(err)
            }
        }
    }

    /// Handle one message as a stream of [`AgentEvent`]s.
    ///
    /// The conversational path streams provider tokens when the decision
    /// allows it; the tool path emits progress events and the answer as a
    /// single chunk. The stream always ends with `done` or `error`.
    pub fn handle_stream(&self, message: String, ctx: ToolContext) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel(64);
        let this = self.clone();
        tokio::spawn(async move {
            this.stream_inner(&message, &ctx, &tx).await;
        });
        rx
    }

    async fn stream_inner(&self, message: &str, ctx: &ToolContext, tx: &mpsc::Sender<AgentEvent>) {
        let started = Instant::now();
        let request_id = uuid::Uuid::new_v4().to_string();
        let decision = self.decide(message, ctx).await;
        let mut streamed = false;

        let result = if decision.needs_tools {
            let tools = self.offered_tools(ctx);
            match self.executor.run_with_events(message, ctx, &tools, tx).await {
                Ok(outcome) => {
                    let _ = tx
                        .send(AgentEvent::Chunk {
                            content: outcome.content.clone(),
                        })
                        .await;
                    Ok(Answer::from(outcome))
                }
                Err(err) => Err(err),
            }
        } else if decision.should_stream {
            streamed = true;
            self.converse_streaming(message, ctx, tx).await
        } else {
            match self.converse(message, ctx).await {
                Ok(answer) => {
                    let _ = tx
                        .send(AgentEvent::Chunk {
                            content: answer.content.clone(),
                        })
                        .await;
                    Ok(answer)
                }
                Err(err) => Err(err),
            }
        };

        let mut metric = self.metric(&request_id, ctx, &decision);
        metric.streaming = streamed;
        metric.response_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(answer) => {
                fill_metric(&mut metric, &answer);
                self.monitor.record(metric);
                let _ = tx
                    .send(AgentEvent::Done {
                        metadata: DoneMetadata {
                            tools_used: answer.tools_used,
                            iterations: answer.iterations,
                            success: answer.success,
                            request_id,
                            model: self.settings.model.clone(),
                            provider: answer.provider,
                        },
                    })
                    .await;
            }
            Err(err) => {
                warn!(request_id = %request_id, error = %err, "Streaming request failed");
                metric.error_type = Some(err.kind().to_string());
                self.monitor.record(metric);
                let _ = tx
                    .send(AgentEvent::Error {
                        content: err.user_message().into(),
                        detail: Some(err.to_string()),
                    })
                    .await;
            }
        }
    }

    fn offered_tools(&self, ctx: &ToolContext) -> Vec<orquesta_core::provider::ToolSpec> {
        self.registry
            .specs_for(ctx.plan, &ctx.integrations, self.supports_tools())
    }

    fn metric(&self, request_id: &str, ctx: &ToolContext, decision: &Decision) -> RequestMetric {
        let mut metric =
            RequestMetric::new(&ctx.tenant_id, &self.settings.model).with_request_id(request_id);
        metric.decision_ms = decision.detection_time_ms;
        metric.confidence = decision.confidence;
        metric.suggested_tools = decision.suggested_tools.clone();
        metric
    }

    async fn knowledge(&self, message: &str, ctx: &ToolContext) -> Vec<RetrievedChunk> {
        let Some(retriever) = &self.retriever else {
            return vec![];
        };
        if self.settings.context_top_k == 0 {
            return vec![];
        }
        retriever
            .retrieve_context(message, &ctx.tenant_id, self.settings.context_top_k)
            .await
            .unwrap_or_else(|e| {
                warn!("Context retrieval failed: {e}");
                vec![]
            })
    }

    async fn conversation_request(&self, message: &str, ctx: &ToolContext) -> ProviderRequest {
        let knowledge = self.knowledge(message, ctx).await;
        let messages =
            build_conversation_prompt(message, &knowledge, self.settings.system_prompt.as_deref());
        let request = ProviderRequest::new(&self.settings.model, messages)
            .with_temperature(self.settings.answer_temperature);
        match self.settings.max_tokens {
            Some(max) => request.with_max_tokens(max),
            None => request,
        }
    }

    async fn converse(&self, message: &str, ctx: &ToolContext) -> Result<Answer, AgentError> {
        let request = self.conversation_request(message, ctx).await;
        let response = self.provider.complete(request).await?;
        debug!(model = %response.model, "Conversational answer");
        Ok(Answer {
            provider: Some(
                response
                    .provider_name()
                    .unwrap_or(self.provider.name())
                    .to_string(),
            ),
            fallback_used: response.fallback_used(),
            success: true,
            content: response.message.content,
            tools_used: Vec::new(),
            tools_invoked: Vec::new(),
            iterations: 0,
        })
    }

    async fn converse_streaming(
        &self,
        message: &str,
        ctx: &ToolContext,
        tx: &mpsc::Sender<AgentEvent>,
    ) -> Result<Answer, AgentError> {
        let mut request = self.conversation_request(message, ctx).await;
        request.stream = true;
        let mut chunks = self.provider.stream(request).await?;

        let mut content = String::new();
        let mut provider = None;
        let mut fallback_used = false;
        while let Some(chunk) = chunks.recv().await {
            let chunk = chunk?;
            if provider.is_none()
                && let Some(name) = chunk.provider_name()
            {
                provider = Some(name.to_string());
                fallback_used = chunk.fallback_used();
            }
            if let Some(delta) = chunk.content.filter(|d| !d.is_empty()) {
                content.push_str(&delta);
                let _ = tx.send(AgentEvent::Chunk { content: delta }).await;
            }
            if chunk.done {
                break;
            }
        }
        if content.is_empty() {
            return Err(AgentError::Provider(ProviderError::StreamInterrupted(
                "stream ended without content".into(),
            )));
        }

        Ok(Answer {
            content,
            tools_used: Vec::new(),
            tools_invoked: Vec::new(),
            iterations: 0,
            success: true,
            provider: provider.or_else(|| Some(self.provider.name().to_string())),
            fallback_used,
        })
    }
}

fn fill_metric(metric: &mut RequestMetric, answer: &Answer) {
    metric.provider = answer.provider.clone();
    metric.fallback_used = answer.fallback_used;
    metric.tools_invoked = answer.tools_invoked.clone();
    metric.iterations = answer.iterations;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{DelayedProvider, SequentialMockProvider, make_text_response};
    use orquesta_providers::FallbackProvider;
    use orquesta_config::ToolsConfig;
    use orquesta_core::collaborator::{StaticContextRetriever, StaticTenantDirectory};
    use orquesta_core::tenant::{Credentials, IntegrationKey};
    use orquesta_tools::{ToolBackends, names};
    use std::time::Duration;

    fn orchestrator(provider: Arc<dyn Provider>) -> Orchestrator {
        let registry = Arc::new(
            orquesta_tools::catalog(&ToolBackends::in_memory(), &ToolsConfig::default()).unwrap(),
        );
        let decisions = Arc::new(DecisionEngine::new(
            Arc::new(PatternScanner::new().unwrap()),
            Arc::new(DecisionCache::new(Duration::from_secs(300), 100, 100)),
        ));
        Orchestrator::new(
            provider,
            registry,
            decisions,
            Arc::new(PerformanceMonitor::new(Duration::from_secs(3600), 100)),
            AgentSettings::new("gpt-4o-mini"),
        )
    }

    fn directory() -> Arc<StaticTenantDirectory> {
        let directory = StaticTenantDirectory::new();
        let mut integrations = ActiveIntegrations::new();
        integrations.insert(
            IntegrationKey::Stripe,
            Credentials::new().with("secret_key", "sk_test"),
        );
        directory.upsert("acme", PlanTier::Pro, integrations);
        Arc::new(directory)
    }

    #[tokio::test]
    async fn greeting_takes_the_conversational_path() {
        let provider = Arc::new(SequentialMockProvider::texts(&["¡Hola! Soy tu asistente."]));
        let orchestrator = orchestrator(provider.clone());
        let ctx = ToolContext::new("acme", PlanTier::Pro);
        let reply = orchestrator.handle("Hola, ¿cómo estás?", &ctx).await.unwrap();

        assert!(!reply.decision.needs_tools);
        assert_eq!(reply.iterations, 0);
        assert_eq!(reply.content, "¡Hola! Soy tu asistente.");
        assert!(provider.requests()[0].tools.is_empty());

        let recent = orchestrator.monitor().recent(1);
        assert_eq!(recent[0].request_id, reply.request_id);
        assert!(recent[0].error_type.is_none());
    }

    #[tokio::test]
    async fn payment_request_runs_the_executor() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_text_response(
            r#"{"action":"use_tool","tool_name":"create_payment_link","args":{"amount":500,"description":"Consulta"},"confidence":0.95}"#,
        )]));
        let orchestrator = orchestrator(provider).with_directory(directory());
        let ctx = orchestrator
            .prepare_context("acme", "bot-1", "Genera un link de pago por $500")
            .await;
        assert_eq!(ctx.plan, PlanTier::Pro);

        let reply = orchestrator
            .handle("Genera un link de pago por $500", &ctx)
            .await
            .unwrap();

        assert!(reply.decision.needs_tools);
        assert_eq!(reply.tools_used, vec![names::CREATE_PAYMENT_LINK]);
        assert_eq!(reply.iterations, 1);
        assert!(reply.content.contains("https://buy.stripe.com/test/"));

        let metric = &orchestrator.monitor().recent(1)[0];
        assert_eq!(metric.tools_invoked, vec![names::CREATE_PAYMENT_LINK]);
        assert!(metric.confidence >= 60);
    }

    #[tokio::test]
    async fn failed_tool_calls_are_still_recorded() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response(
                r#"{"action":"use_tool","tool_name":"create_payment_link","args":{"amount":-5,"description":"Consulta"},"confidence":0.9}"#,
            ),
            make_text_response(
                r#"{"action":"respond","response":"El monto no es válido.","confidence":0.9}"#,
            ),
        ]));
        let orchestrator = orchestrator(provider).with_directory(directory());
        let ctx = orchestrator
            .prepare_context("acme", "bot-1", "Genera un link de pago por $500")
            .await;
        let reply = orchestrator
            .handle("Genera un link de pago por $500", &ctx)
            .await
            .unwrap();

        assert!(reply.tools_used.is_empty());
        let metric = &orchestrator.monitor().recent(1)[0];
        assert_eq!(metric.tools_invoked, vec![names::CREATE_PAYMENT_LINK]);
    }

    #[tokio::test]
    async fn unknown_tenant_is_free() {
        let orchestrator =
            orchestrator(Arc::new(SequentialMockProvider::texts(&[]))).with_directory(directory());
        let ctx = orchestrator.prepare_context("nobody", "bot", "hola").await;
        assert_eq!(ctx.plan, PlanTier::Free);
        assert!(ctx.integrations.is_empty());
        assert_eq!(ctx.user_message, "hola");
    }

    #[tokio::test]
    async fn failures_are_recorded() {
        let provider = Arc::new(SequentialMockProvider::from_results(vec![Err(
            ProviderError::RateLimited { retry_after_secs: 2 },
        )]));
        let orchestrator = orchestrator(provider);
        let ctx = ToolContext::new("acme", PlanTier::Pro);
        let err = orchestrator.handle("Hola", &ctx).await.unwrap_err();

        assert_eq!(err.user_message(), crate::error::USER_FACING_ERROR);
        let metric = &orchestrator.monitor().recent(1)[0];
        assert_eq!(metric.error_type.as_deref(), Some("rate_limited"));
    }

    #[tokio::test]
    async fn retrieved_knowledge_reaches_the_prompt() {
        let provider = Arc::new(SequentialMockProvider::texts(&["Abrimos a las 9."]));
        let retriever = StaticContextRetriever::new()
            .with_document("acme", "Horario de atención: lunes a viernes de 9 a 18 horas");
        let orchestrator = orchestrator(provider.clone()).with_retriever(Arc::new(retriever));
        let ctx = ToolContext::new("acme", PlanTier::Pro);
        orchestrator
            .handle("¿Cuál es el horario de atención?", &ctx)
            .await
            .unwrap();

        let system = &provider.requests()[0].messages[0].content;
        assert!(system.contains("lunes a viernes"));
    }

    #[tokio::test]
    async fn conversational_stream_ends_with_done() {
        let provider = Arc::new(SequentialMockProvider::texts(&["¡Hola!"]));
        let orchestrator = orchestrator(provider);
        let ctx = ToolContext::new("acme", PlanTier::Pro);
        let mut rx = orchestrator.handle_stream("Hola".into(), ctx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        let kinds: Vec<&str> = events.iter().map(AgentEvent::event_type).collect();
        assert_eq!(kinds, vec!["chunk", "done"]);
        assert!(orchestrator.monitor().recent(1)[0].streaming);
    }

    #[tokio::test]
    async fn stream_records_the_backup_provider() {
        let primary = Arc::new(SequentialMockProvider::from_results(vec![Err(
            ProviderError::Network("connection reset".into()),
        )]));
        let backup = Arc::new(DelayedProvider::new(
            SequentialMockProvider::texts(&["¡Hola desde el respaldo!"]),
            Duration::ZERO,
        ));
        let chain = FallbackProvider::new("chain")
            .add_default(primary)
            .add_default(backup);
        let orchestrator = orchestrator(Arc::new(chain));
        let ctx = ToolContext::new("acme", PlanTier::Pro);
        let mut rx = orchestrator.handle_stream("Hola".into(), ctx);
        while rx.recv().await.is_some() {}

        let metric = &orchestrator.monitor().recent(1)[0];
        assert!(metric.streaming);
        assert!(metric.fallback_used);
        assert_eq!(metric.provider.as_deref(), Some("delayed_mock"));
    }
}
