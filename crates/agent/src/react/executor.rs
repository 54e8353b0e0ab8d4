//! The ReAct loop.

use super::budget::IterationBudget;
use super::completion::{CompletionPolicy, LexicalCompletion};
use super::fallback::{default_args, keyword_decision};
use super::memory::{Action, AgentMemory, NextAction, Observation, Thought, ThoughtSource};
use super::prompt::{ThinkInput, build_answer_prompt, build_think_prompt};
use super::thought::{ParsedDecision, parse_decision};
use super::AgentSettings;
use crate::decision::{PatternScan, PatternScanner};
use crate::error::AgentError;
use crate::stream_event::{AgentEvent, DoneMetadata};
use orquesta_core::collaborator::{ContextRetriever, RetrievedChunk};
use orquesta_core::error::ProviderError;
use orquesta_core::provider::{Provider, ProviderRequest, ProviderResponse, ToolSpec};
use orquesta_core::tenant::{IntegrationKey, PlanTier, ToolContext};
use orquesta_core::tool::{GateCheck, ToolRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Shown when a run produced nothing to say.
pub const APOLOGY: &str =
    "Lo siento, no pude completar tu solicitud. ¿Puedes intentarlo de nuevo con más detalle?";

const NATIVE_CALL_CONFIDENCE: f32 = 0.9;

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A tool result or a response finished the task
    Completed,
    LowConfidence,
    BudgetExhausted,
    TimeBudget,
    /// A provider call failed after some progress was made
    ThinkFailed,
}

/// The result of one executor run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub content: String,
    /// Tools that ran successfully, in order
    pub tools_used: Vec<String>,
    pub iterations: u32,
    pub success: bool,
    pub memory: AgentMemory,
    /// Provider that answered the last call
    pub provider: Option<String>,
    pub fallback_used: bool,
    pub stop_reason: StopReason,
}

impl RunOutcome {
    pub fn done_metadata(&self, request_id: impl Into<String>, model: impl Into<String>) -> DoneMetadata {
        DoneMetadata {
            tools_used: self.tools_used.clone(),
            iterations: self.iterations,
            success: self.success,
            request_id: request_id.into(),
            model: model.into(),
            provider: self.provider.clone(),
        }
    }
}

/// Provider bookkeeping across the calls of one run.
#[derive(Default)]
struct CallTrace {
    provider: Option<String>,
    fallback_used: bool,
}

impl CallTrace {
    fn observe(&mut self, response: &ProviderResponse, default_name: &str) {
        self.provider = Some(
            response
                .provider_name()
                .unwrap_or(default_name)
                .to_string(),
        );
        self.fallback_used |= response.fallback_used();
    }
}

/// Per-run state shared by THINK and ACT.
struct RunState<'a> {
    message: &'a str,
    ctx: &'a ToolContext,
    tools: &'a [ToolSpec],
    scan: PatternScan,
    knowledge: Vec<RetrievedChunk>,
    memory: AgentMemory,
    calls: CallTrace,
    events: Option<&'a mpsc::Sender<AgentEvent>>,
}

impl RunState<'_> {
    async fn emit(&self, event: AgentEvent) {
        if let Some(tx) = self.events {
            let _ = tx.send(event).await;
        }
    }
}

enum ThinkOutcome {
    Decided(Thought, ParsedDecision),
    OutOfTime,
}

/// Bounded Think → Act → Observe executor.
///
/// Cheap to clone; every run owns its own [`AgentMemory`].
#[derive(Clone)]
pub struct ReactExecutor {
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    scanner: Arc<PatternScanner>,
    completion: Arc<dyn CompletionPolicy>,
    retriever: Option<Arc<dyn ContextRetriever>>,
    settings: AgentSettings,
}

impl ReactExecutor {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
        scanner: Arc<PatternScanner>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            provider,
            registry,
            scanner,
            completion: Arc::new(LexicalCompletion::default()),
            retriever: None,
            settings,
        }
    }

    pub fn with_completion(mut self, completion: Arc<dyn CompletionPolicy>) -> Self {
        self.completion = completion;
        self
    }

    /// Attach a knowledge retriever used to enrich THINK prompts.
    pub fn with_retriever(mut self, retriever: Arc<dyn ContextRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Run to completion.
    ///
    /// Fails only when the very first THINK call fails; every later failure
    /// is folded into the synthesized answer.
    pub async fn run(
        &self,
        message: &str,
        ctx: &ToolContext,
        tools: &[ToolSpec],
    ) -> Result<RunOutcome, AgentError> {
        self.execute(message, ctx, tools, None).await
    }

    /// Like [`run`](Self::run), emitting `thinking` and `tool-start` events
    /// as the loop progresses. Terminal events are left to the caller.
    pub async fn run_with_events(
        &self,
        message: &str,
        ctx: &ToolContext,
        tools: &[ToolSpec],
        events: &mpsc::Sender<AgentEvent>,
    ) -> Result<RunOutcome, AgentError> {
        self.execute(message, ctx, tools, Some(events)).await
    }

    /// Spawn a run and stream its events, ending with `done` or `error`.
    pub fn run_stream(
        &self,
        message: String,
        ctx: ToolContext,
        tools: Vec<ToolSpec>,
        request_id: String,
    ) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel(64);
        let executor = self.clone();

        tokio::spawn(async move {
            match executor.run_with_events(&message, &ctx, &tools, &tx).await {
                Ok(outcome) => {
                    let _ = tx
                        .send(AgentEvent::Chunk {
                            content: outcome.content.clone(),
                        })
                        .await;
                    let _ = tx
                        .send(AgentEvent::Done {
                            metadata: outcome.done_metadata(request_id, &executor.settings.model),
                        })
                        .await;
                }
                Err(err) => {
                    let _ = tx
                        .send(AgentEvent::Error {
                            content: err.user_message().into(),
                            detail: Some(err.to_string()),
                        })
                        .await;
                }
            }
        });

        rx
    }

    async fn execute(
        &self,
        message: &str,
        ctx: &ToolContext,
        tools: &[ToolSpec],
        events: Option<&mpsc::Sender<AgentEvent>>,
    ) -> Result<RunOutcome, AgentError> {
        let started = Instant::now();
        let scan = self.scanner.scan(message);
        let budget = IterationBudget::for_message(message, &scan, &self.settings);
        let knowledge = self.retrieve(message, ctx).await;

        info!(
            tenant = %ctx.tenant_id,
            max_iterations = budget.max(),
            tools_offered = tools.len(),
            "Starting ReAct run"
        );

        let mut state = RunState {
            message,
            ctx,
            tools,
            scan,
            knowledge,
            memory: AgentMemory::new(),
            calls: CallTrace::default(),
            events,
        };
        let mut stop = StopReason::BudgetExhausted;

        for iteration in 1..=budget.max() {
            let remaining = self
                .settings
                .time_budget
                .map(|limit| limit.saturating_sub(started.elapsed()));
            if remaining.is_some_and(|r| r.is_zero()) {
                stop = StopReason::TimeBudget;
                break;
            }

            state.emit(AgentEvent::Thinking { iteration }).await;

            let (thought, decision) = match self
                .think(&mut state, iteration, budget.max(), remaining)
                .await
            {
                Ok(ThinkOutcome::Decided(thought, decision)) => (thought, decision),
                Ok(ThinkOutcome::OutOfTime) => {
                    warn!(iteration, "Time budget exhausted during THINK");
                    stop = StopReason::TimeBudget;
                    break;
                }
                Err(source) if iteration == 1 => {
                    warn!(error = %source, "THINK failed on the first iteration");
                    return Err(AgentError::FirstIteration { source });
                }
                Err(e) => {
                    warn!(iteration, error = %e, "THINK failed, synthesizing from progress");
                    stop = StopReason::ThinkFailed;
                    break;
                }
            };

            debug!(
                iteration,
                action = ?decision.action,
                tool = decision.tool_name.as_deref().unwrap_or("-"),
                confidence = decision.confidence,
                source = ?thought.source,
                "THINK"
            );

            let (action, observation) = match self.act(&mut state, decision).await {
                Ok(step) => step,
                Err(source) if iteration == 1 => {
                    warn!(error = %source, "Answer call failed on the first iteration");
                    return Err(AgentError::FirstIteration { source });
                }
                Err(e) => {
                    warn!(iteration, error = %e, "Answer call failed, synthesizing from progress");
                    stop = StopReason::ThinkFailed;
                    break;
                }
            };

            let confidence = thought.confidence;
            let entry = state.memory.record(thought, action, observation);
            debug!(
                iteration,
                success = entry.observation.success,
                complete = entry.observation.is_complete,
                "OBSERVE"
            );

            if entry.observation.is_complete {
                stop = StopReason::Completed;
                break;
            }
            if confidence < self.settings.confidence_floor {
                stop = StopReason::LowConfidence;
                break;
            }
        }

        let memory = state.memory;
        let outcome = RunOutcome {
            content: synthesize(&memory),
            tools_used: memory.tools_used(),
            iterations: memory.len() as u32,
            success: memory.any_success(),
            provider: state.calls.provider,
            fallback_used: state.calls.fallback_used,
            stop_reason: stop,
            memory,
        };

        info!(
            tenant = %ctx.tenant_id,
            iterations = outcome.iterations,
            success = outcome.success,
            stop = ?outcome.stop_reason,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ReAct run finished"
        );

        Ok(outcome)
    }

    async fn retrieve(&self, message: &str, ctx: &ToolContext) -> Vec<RetrievedChunk> {
        let Some(retriever) = &self.retriever else {
            return vec![];
        };
        if self.settings.context_top_k == 0 {
            return vec![];
        }
        match retriever
            .retrieve_context(message, &ctx.tenant_id, self.settings.context_top_k)
            .await
        {
            Ok(chunks) => {
                if !chunks.is_empty() {
                    debug!(count = chunks.len(), "Retrieved knowledge for THINK");
                }
                chunks
            }
            Err(e) => {
                warn!("Context retrieval failed: {e}");
                vec![]
            }
        }
    }

    fn request(&self, messages: Vec<orquesta_core::message::Message>, temperature: f32) -> ProviderRequest {
        let request = ProviderRequest::new(&self.settings.model, messages).with_temperature(temperature);
        match self.settings.max_tokens {
            Some(max) => request.with_max_tokens(max),
            None => request,
        }
    }

    async fn think(
        &self,
        state: &mut RunState<'_>,
        iteration: u32,
        max_iterations: u32,
        remaining: Option<Duration>,
    ) -> Result<ThinkOutcome, ProviderError> {
        let messages = build_think_prompt(&ThinkInput {
            message: state.message,
            tools: state.tools,
            memory: &state.memory,
            knowledge: &state.knowledge,
            plan: state.ctx.plan,
            iteration,
            max_iterations,
            system_prompt: self.settings.system_prompt.as_deref(),
        });
        let request = self
            .request(messages, self.settings.think_temperature)
            .with_tools(state.tools.to_vec());

        let call = self.provider.complete(request);
        let response = match remaining {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result?,
                Err(_) => return Ok(ThinkOutcome::OutOfTime),
            },
            None => call.await?,
        };
        state.calls.observe(&response, self.provider.name());

        if let Some(call) = response.message.tool_calls.first() {
            let reasoning = response.message.content.trim();
            let decision = ParsedDecision::use_tool(
                call.name.clone(),
                call.parsed_arguments(),
                NATIVE_CALL_CONFIDENCE,
            )
            .with_reasoning(if reasoning.is_empty() {
                format!("native call: {}", call.name)
            } else {
                reasoning.to_string()
            });
            return Ok(ThinkOutcome::Decided(
                thought_for(&decision, ThoughtSource::NativeToolCall),
                decision,
            ));
        }

        let (decision, source) = match parse_decision(&response.message.content) {
            Ok(decision) => (decision, ThoughtSource::Model),
            Err(e) => {
                debug!(error = %e, "Unusable THINK output, using keyword fallback");
                (
                    keyword_decision(&state.scan, &state.memory),
                    ThoughtSource::Fallback,
                )
            }
        };
        Ok(ThinkOutcome::Decided(thought_for(&decision, source), decision))
    }

    async fn act(
        &self,
        state: &mut RunState<'_>,
        decision: ParsedDecision,
    ) -> Result<(Action, Observation), ProviderError> {
        match decision.action {
            NextAction::UseTool => {
                let Some(tool) = decision.tool_name else {
                    return Ok(retry_step("use_tool without a tool name"));
                };
                Ok(self.act_tool(state, tool, decision.args).await)
            }
            NextAction::Respond => {
                let content = match decision.response {
                    Some(text) => text,
                    None => {
                        let messages = build_answer_prompt(
                            state.message,
                            &state.memory,
                            &state.knowledge,
                            self.settings.system_prompt.as_deref(),
                        );
                        let response = self
                            .provider
                            .complete(self.request(messages, self.settings.answer_temperature))
                            .await?;
                        state.calls.observe(&response, self.provider.name());
                        response.message.content.trim().to_string()
                    }
                };
                let success = !content.is_empty();
                let content = if success { content } else { APOLOGY.to_string() };
                Ok((
                    Action::Response {
                        content: content.clone(),
                    },
                    Observation {
                        success,
                        content,
                        is_complete: true,
                        data: None,
                    },
                ))
            }
            NextAction::Retry => Ok(retry_step(if decision.reasoning.is_empty() {
                "model asked to retry"
            } else {
                &decision.reasoning
            })),
        }
    }

    async fn act_tool(
        &self,
        state: &mut RunState<'_>,
        tool: String,
        args: serde_json::Value,
    ) -> (Action, Observation) {
        let offered = state.tools.iter().any(|t| t.name == tool);
        if !offered {
            let observation = gated_observation(
                &tool,
                self.registry
                    .gate_for(&tool, state.ctx.plan, &state.ctx.integrations),
                state.ctx.plan,
            );
            warn!(tool = %tool, terminal = observation.is_complete, "Tool not offered to this tenant");
            return (Action::ToolCall { tool, input: args }, observation);
        }

        let input = default_args(&tool, args, state.message, &self.scanner, &state.memory);
        let missing = missing_fields(&self.registry, &tool, &input);
        if !missing.is_empty() {
            warn!(tool = %tool, ?missing, "Tool call lacks required arguments");
            let observation = Observation {
                success: false,
                content: format!(
                    "Faltan datos para '{tool}': {}. Pídelos al usuario o elige otra acción.",
                    missing.join(", ")
                ),
                is_complete: false,
                data: None,
            };
            return (Action::ToolCall { tool, input }, observation);
        }

        state
            .emit(AgentEvent::ToolStart { tool: tool.clone() })
            .await;

        let result = self.registry.dispatch(&tool, input.clone(), state.ctx).await;
        let is_complete = result.success && self.completion.is_complete(&tool, &result);

        (
            Action::ToolCall { tool, input },
            Observation {
                success: result.success,
                content: result.message,
                is_complete,
                data: result.data,
            },
        )
    }
}

/// Required schema fields that are absent, null or blank in `input`.
fn missing_fields(registry: &ToolRegistry, tool: &str, input: &serde_json::Value) -> Vec<String> {
    let Some(def) = registry.get(tool) else {
        return Vec::new();
    };
    def.required_fields()
        .into_iter()
        .filter(|field| match input.get(*field) {
            None | Some(serde_json::Value::Null) => true,
            Some(serde_json::Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        })
        .map(str::to_string)
        .collect()
}

fn thought_for(decision: &ParsedDecision, source: ThoughtSource) -> Thought {
    Thought {
        reasoning: decision.reasoning.clone(),
        confidence: decision.confidence,
        next: decision.action,
        source,
    }
}

fn retry_step(reason: &str) -> (Action, Observation) {
    (
        Action::Retry {
            reason: reason.to_string(),
        },
        Observation {
            success: false,
            content: "Reintentando.".into(),
            is_complete: false,
            data: None,
        },
    )
}

fn integration_label(key: IntegrationKey) -> &'static str {
    match key {
        IntegrationKey::Stripe => "Stripe",
        IntegrationKey::GoogleCalendar => "Google Calendar",
        IntegrationKey::WhatsApp => "WhatsApp",
        IntegrationKey::Email => "correo electrónico",
    }
}

/// Observation for a tool the model chose but the tenant was not offered.
///
/// Plan and integration gates end the run with an actionable message;
/// anything else lets the model pick again.
fn gated_observation(tool: &str, gate: GateCheck, plan: PlanTier) -> Observation {
    let (content, is_complete) = match gate {
        GateCheck::PlanRequired { plans } => {
            let plans: Vec<&str> = plans.iter().map(PlanTier::as_str).collect();
            (
                format!(
                    "Esta función no está incluida en tu plan {plan}. Está disponible en: {}. Actualiza tu plan para usarla.",
                    plans.join(", ")
                ),
                true,
            )
        }
        GateCheck::IntegrationRequired { missing } => {
            let missing: Vec<&str> = missing.into_iter().map(integration_label).collect();
            (
                format!(
                    "Para usar esta función primero conecta {} en la configuración de tu chatbot.",
                    missing.join(" y ")
                ),
                true,
            )
        }
        GateCheck::Disabled | GateCheck::Unknown | GateCheck::Allowed => (
            format!("La herramienta '{tool}' no está disponible. Elige otra acción."),
            false,
        ),
    };
    Observation {
        success: false,
        content,
        is_complete,
        data: None,
    }
}

/// The final answer, built only from what the run observed.
pub fn synthesize(memory: &AgentMemory) -> String {
    if let Some(terminal) = memory.terminal() {
        return terminal.content.clone();
    }

    let successes: Vec<&str> = memory
        .entries()
        .iter()
        .filter(|e| e.observation.success)
        .map(|e| e.observation.content.as_str())
        .filter(|c| !c.trim().is_empty())
        .collect();
    if !successes.is_empty() {
        return successes.join("\n\n");
    }

    let all: Vec<&str> = memory
        .entries()
        .iter()
        .map(|e| e.observation.content.as_str())
        .filter(|c| !c.trim().is_empty())
        .collect();
    if !all.is_empty() {
        return all.join("\n\n");
    }

    APOLOGY.to_string()
}
