//! Data model for request metrics and performance summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── RequestMetric ─────────────────────────────────────────────────────────

/// One handled chat message, start to finish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMetric {
    pub request_id: String,
    pub tenant_id: String,
    pub recorded_at: DateTime<Utc>,
    /// Time spent in the tool-need decision, in milliseconds.
    pub decision_ms: u64,
    /// Decision confidence, 0..=100.
    pub confidence: u8,
    pub suggested_tools: Vec<String>,
    pub model: String,
    /// Provider that produced the final answer, when known.
    pub provider: Option<String>,
    pub fallback_used: bool,
    /// Tools actually executed during the run, in order.
    pub tools_invoked: Vec<String>,
    pub streaming: bool,
    /// ReAct iterations used; 0 on the direct conversational path.
    pub iterations: u32,
    /// Wall-clock time for the whole response, in milliseconds.
    pub response_ms: u64,
    /// Error category when the request failed.
    pub error_type: Option<String>,
}

impl RequestMetric {
    pub fn new(tenant_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            recorded_at: Utc::now(),
            decision_ms: 0,
            confidence: 0,
            suggested_tools: Vec::new(),
            model: model.into(),
            provider: None,
            fallback_used: false,
            tools_invoked: Vec::new(),
            streaming: false,
            iterations: 0,
            response_ms: 0,
            error_type: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn is_error(&self) -> bool {
        self.error_type.is_some()
    }

    pub fn used_tools(&self) -> bool {
        !self.tools_invoked.is_empty()
    }
}

// ── Summary ───────────────────────────────────────────────────────────────

/// A name with an occurrence count, for "top N" lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedCount {
    pub name: String,
    pub count: u64,
}

/// Aggregates over the metrics inside a time window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub window_secs: u64,
    pub total_requests: u64,
    pub avg_decision_ms: f64,
    pub avg_response_ms: f64,
    pub p95_response_ms: u64,
    pub avg_confidence: f64,
    /// Share of requests that executed at least one tool, 0..=1.
    pub tool_usage_rate: f64,
    pub streaming_rate: f64,
    pub fallback_rate: f64,
    pub error_rate: f64,
    pub top_models: Vec<RankedCount>,
    pub top_providers: Vec<RankedCount>,
    pub top_tools: Vec<RankedCount>,
    pub errors_by_type: Vec<RankedCount>,
}

impl std::fmt::Display for PerformanceSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "requests: {} in the last {}s",
            self.total_requests, self.window_secs
        )?;
        writeln!(
            f,
            "decision: {:.1} ms avg | response: {:.1} ms avg, {} ms p95",
            self.avg_decision_ms, self.avg_response_ms, self.p95_response_ms
        )?;
        writeln!(
            f,
            "tools {:.0}% | streaming {:.0}% | fallback {:.0}% | errors {:.0}%",
            self.tool_usage_rate * 100.0,
            self.streaming_rate * 100.0,
            self.fallback_rate * 100.0,
            self.error_rate * 100.0
        )?;
        for (label, list) in [
            ("models", &self.top_models),
            ("providers", &self.top_providers),
            ("tools", &self.top_tools),
        ] {
            if !list.is_empty() {
                let items: Vec<String> =
                    list.iter().map(|r| format!("{} ({})", r.name, r.count)).collect();
                writeln!(f, "top {label}: {}", items.join(", "))?;
            }
        }
        Ok(())
    }
}
