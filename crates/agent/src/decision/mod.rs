//! Tool-need decision engine.
//!
//! Decides, before any expensive call, whether a message needs tools and
//! whether its answer can be streamed token by token:
//!
//! 1. **Pattern scan** ([`patterns`]): pure keyword/regex families with
//!    fixed weights. Ordinary conversation ends here.
//! 2. **Deep analysis** ([`analysis`]): re-weights the scan with plan tier,
//!    connected integrations and model tool-capability.
//!
//! Results are memoized in a [`DecisionCache`] built once at startup.

pub mod analysis;
pub mod cache;
pub mod classifier;
pub mod engine;
pub mod patterns;

use orquesta_config::DecisionConfig;
use orquesta_core::tenant::{ActiveIntegrations, PlanTier, ToolContext};
use serde::{Deserialize, Serialize};

pub use cache::{CacheKey, CacheStats, DecisionCache};
pub use classifier::{LlmReminderClassifier, ReminderClassifier, ReminderIntent};
pub use engine::DecisionEngine;
pub use patterns::{Family, PatternScan, PatternScanner};

/// The routing decision for one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub needs_tools: bool,
    /// 0..=100
    pub confidence: u8,
    /// Most relevant first
    pub suggested_tools: Vec<String>,
    pub should_stream: bool,
    /// Human-readable trace of how the confidence was reached
    pub reasoning: String,
    pub detection_time_ms: u64,
    /// Whether the deep analysis phase ran
    pub analyzed: bool,
}

/// What the engine may know about the caller besides the message.
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
    pub tenant_id: &'a str,
    pub plan: PlanTier,
    pub integrations: &'a ActiveIntegrations,
    pub model_supports_tools: bool,
}

impl<'a> DecisionContext<'a> {
    pub fn new(ctx: &'a ToolContext, model_supports_tools: bool) -> Self {
        Self {
            tenant_id: &ctx.tenant_id,
            plan: ctx.plan,
            integrations: &ctx.integrations,
            model_supports_tools,
        }
    }
}

/// Confidence cut-offs, all on the 0..=100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionThresholds {
    /// Phase-1 score required to run deep analysis
    pub analysis: u8,
    /// At or above: tools are needed
    pub tools: u8,
    /// Below: stream tokens to the caller
    pub stream: u8,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            analysis: 20,
            tools: 60,
            stream: 70,
        }
    }
}

impl DecisionThresholds {
    pub fn from_config(config: &DecisionConfig) -> Self {
        Self {
            analysis: config.analysis_threshold,
            tools: config.tools_threshold,
            stream: config.stream_threshold,
        }
    }
}
