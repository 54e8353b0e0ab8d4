//! Bounded ReAct executor.
//!
//! Each run cycles **Think → Act → Observe** over a per-run
//! [`AgentMemory`] until a tool result completes the task, the model
//! answers, confidence drops, or the iteration/time budget runs out. The
//! final answer is always synthesized from the run's own observations.

pub mod budget;
pub mod completion;
pub mod executor;
pub mod fallback;
pub mod memory;
pub mod prompt;
pub mod thought;

use orquesta_config::AppConfig;
use std::time::Duration;

pub use budget::{Complexity, IterationBudget, estimate_complexity};
pub use completion::{CompletionPolicy, ExplicitCompletion, LexicalCompletion};
pub use executor::{ReactExecutor, RunOutcome, StopReason};
pub use memory::{Action, AgentMemory, MemoryEntry, NextAction, Observation, Thought, ThoughtSource};
pub use thought::{ParseError, ParsedDecision, parse_decision};

/// Executor knobs, resolved once from configuration.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub model: String,
    pub base_iterations: u32,
    pub max_iterations: u32,
    /// Thoughts below this confidence (0..1) stop the loop
    pub confidence_floor: f32,
    /// `None` disables the wall-clock budget
    pub time_budget: Option<Duration>,
    pub context_top_k: usize,
    pub think_temperature: f32,
    pub answer_temperature: f32,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
}

impl AgentSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            base_iterations: 3,
            max_iterations: 7,
            confidence_floor: 0.3,
            time_budget: Some(Duration::from_secs(45)),
            context_top_k: 3,
            think_temperature: 0.2,
            answer_temperature: 0.7,
            max_tokens: None,
            system_prompt: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let agent = &config.agent;
        Self {
            model: config.default_model.clone(),
            base_iterations: agent.base_iterations,
            max_iterations: agent.max_iterations,
            confidence_floor: agent.confidence_floor,
            time_budget: (agent.time_budget_secs > 0)
                .then(|| Duration::from_secs(agent.time_budget_secs)),
            context_top_k: agent.context_top_k,
            think_temperature: agent.think_temperature,
            answer_temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
            system_prompt: agent.system_prompt.clone(),
        }
    }

    pub fn with_time_budget(mut self, budget: Option<Duration>) -> Self {
        self.time_budget = budget;
        self
    }
}
