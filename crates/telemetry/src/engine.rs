//! Thread-safe performance monitor: records request metrics, prunes them
//! by age and count, and serves windowed summaries.

use crate::model::{PerformanceSummary, RankedCount, RequestMetric};
use chrono::{DateTime, Utc};
use orquesta_config::TelemetryConfig;
use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

/// How many entries each "top" list keeps.
const TOP_N: usize = 5;

/// The performance monitor.
///
/// Thread-safe via `RwLock`. Recording never fails and never blocks on
/// anything but the lock; readers get snapshots.
pub struct PerformanceMonitor {
    enabled: bool,
    retention: Duration,
    max_records: usize,
    default_window: Duration,
    records: RwLock<VecDeque<RequestMetric>>,
}

impl PerformanceMonitor {
    pub fn new(retention: Duration, max_records: usize) -> Self {
        Self {
            enabled: true,
            retention,
            max_records: max_records.max(1),
            default_window: Duration::from_secs(3600),
            records: RwLock::new(VecDeque::new()),
        }
    }

    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self {
            enabled: config.enabled,
            default_window: Duration::from_secs(config.window_secs),
            ..Self::new(
                Duration::from_secs(config.retention_secs),
                config.max_records,
            )
        }
    }

    /// A monitor that drops everything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(Duration::ZERO, 1)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&self, metric: RequestMetric) {
        if !self.enabled {
            return;
        }
        tracing::debug!(
            request_id = %metric.request_id,
            confidence = metric.confidence,
            response_ms = metric.response_ms,
            tools = metric.tools_invoked.len(),
            error = metric.error_type.as_deref().unwrap_or(""),
            "Request metric recorded"
        );

        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.push_back(metric);
        while records.len() > self.max_records {
            records.pop_front();
        }
        let cutoff = cutoff(self.retention);
        while records.front().is_some_and(|m| m.recorded_at < cutoff) {
            records.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most recent metrics, newest first.
    pub fn recent(&self, limit: usize) -> Vec<RequestMetric> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Summary over the configured default window.
    pub fn default_summary(&self) -> PerformanceSummary {
        self.summary(self.default_window)
    }

    /// Aggregate the metrics recorded within `window` of now.
    pub fn summary(&self, window: Duration) -> PerformanceSummary {
        let cutoff = cutoff(window);
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let in_window: Vec<&RequestMetric> = records
            .iter()
            .filter(|m| m.recorded_at >= cutoff)
            .collect();

        let mut summary = PerformanceSummary {
            window_secs: window.as_secs(),
            total_requests: in_window.len() as u64,
            ..PerformanceSummary::default()
        };
        if in_window.is_empty() {
            return summary;
        }

        let n = in_window.len() as f64;
        let rate = |pred: fn(&RequestMetric) -> bool| {
            in_window.iter().filter(|m| pred(m)).count() as f64 / n
        };

        summary.avg_decision_ms = in_window.iter().map(|m| m.decision_ms as f64).sum::<f64>() / n;
        summary.avg_response_ms = in_window.iter().map(|m| m.response_ms as f64).sum::<f64>() / n;
        summary.avg_confidence = in_window.iter().map(|m| m.confidence as f64).sum::<f64>() / n;
        summary.tool_usage_rate = rate(RequestMetric::used_tools);
        summary.streaming_rate = rate(|m| m.streaming);
        summary.fallback_rate = rate(|m| m.fallback_used);
        summary.error_rate = rate(RequestMetric::is_error);

        let mut latencies: Vec<u64> = in_window.iter().map(|m| m.response_ms).collect();
        latencies.sort_unstable();
        let idx = ((latencies.len() as f64 * 0.95).ceil() as usize).clamp(1, latencies.len()) - 1;
        summary.p95_response_ms = latencies[idx];

        summary.top_models = top(in_window.iter().map(|m| m.model.as_str()));
        summary.top_providers = top(in_window.iter().filter_map(|m| m.provider.as_deref()));
        summary.top_tools = top(
            in_window
                .iter()
                .flat_map(|m| m.tools_invoked.iter().map(String::as_str)),
        );
        summary.errors_by_type = top(in_window.iter().filter_map(|m| m.error_type.as_deref()));
        summary
    }

    /// Drop metrics older than the retention period. Returns how many.
    pub fn prune(&self) -> usize {
        let cutoff = cutoff(self.retention);
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let before = records.len();
        records.retain(|m| m.recorded_at >= cutoff);
        before - records.len()
    }

    pub fn clear(&self) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::from_config(&TelemetryConfig::default())
    }
}

fn cutoff(age: Duration) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::from_std(age).unwrap_or(chrono::Duration::zero())
}

/// Count occurrences and keep the most frequent, ties broken by name.
fn top<'a>(names: impl Iterator<Item = &'a str>) -> Vec<RankedCount> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for name in names {
        *counts.entry(name).or_default() += 1;
    }
    let mut ranked: Vec<RankedCount> = counts
        .into_iter()
        .map(|(name, count)| RankedCount {
            name: name.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    ranked.truncate(TOP_N);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn metric(model: &str, response_ms: u64) -> RequestMetric {
        RequestMetric {
            response_ms,
            decision_ms: 2,
            confidence: 80,
            ..RequestMetric::new("acme", model)
        }
    }

    fn monitor() -> PerformanceMonitor {
        PerformanceMonitor::new(Duration::from_secs(86_400), 1_000)
    }

    #[test]
    fn empty_summary() {
        let summary = monitor().summary(Duration::from_secs(3600));
        assert_eq!(summary.total_requests, 0);
        assert_eq!(summary.error_rate, 0.0);
    }

    #[test]
    fn summary_aggregates_rates_and_tops() {
        let monitor = monitor();
        let mut a = metric("gpt-4o-mini", 100);
        a.tools_invoked = vec!["create_payment_link".into()];
        a.provider = Some("openrouter".into());
        a.streaming = false;
        let mut b = metric("gpt-4o-mini", 300);
        b.streaming = true;
        b.fallback_used = true;
        b.provider = Some("openai".into());
        let mut c = metric("claude-3-haiku", 200);
        c.error_type = Some("provider".into());
        c.streaming = true;
        c.provider = Some("openrouter".into());
        for m in [a, b, c] {
            monitor.record(m);
        }

        let s = monitor.summary(Duration::from_secs(3600));
        assert_eq!(s.total_requests, 3);
        assert!((s.avg_response_ms - 200.0).abs() < 1e-9);
        assert_eq!(s.p95_response_ms, 300);
        assert!((s.tool_usage_rate - 1.0 / 3.0).abs() < 1e-9);
        assert!((s.streaming_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((s.fallback_rate - 1.0 / 3.0).abs() < 1e-9);
        assert!((s.error_rate - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(s.top_models[0].name, "gpt-4o-mini");
        assert_eq!(s.top_models[0].count, 2);
        assert_eq!(s.top_providers[0].name, "openrouter");
        assert_eq!(s.top_tools[0].name, "create_payment_link");
        assert_eq!(s.errors_by_type[0].name, "provider");
    }

    #[test]
    fn window_excludes_old_metrics() {
        let monitor = monitor();
        let mut old = metric("gpt-4o-mini", 100);
        old.recorded_at = Utc::now() - chrono::Duration::hours(2);
        monitor.record(old);
        monitor.record(metric("gpt-4o-mini", 100));

        assert_eq!(monitor.summary(Duration::from_secs(3600)).total_requests, 1);
        assert_eq!(monitor.summary(Duration::from_secs(3 * 3600)).total_requests, 2);
    }

    #[test]
    fn retention_and_cap_are_enforced() {
        let monitor = PerformanceMonitor::new(Duration::from_secs(60), 3);
        let mut stale = metric("m", 1);
        stale.recorded_at = Utc::now() - chrono::Duration::minutes(5);
        monitor.record(stale);
        assert_eq!(monitor.len(), 0);

        for i in 0..5 {
            monitor.record(metric("m", i));
        }
        assert_eq!(monitor.len(), 3);
        assert_eq!(monitor.recent(1)[0].response_ms, 4);
    }

    #[test]
    fn disabled_monitor_drops_everything() {
        let monitor = PerformanceMonitor::disabled();
        monitor.record(metric("m", 1));
        assert!(monitor.is_empty());
        assert!(!monitor.is_enabled());
    }

    #[test]
    fn concurrent_recording() {
        let monitor = Arc::new(monitor());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let monitor = monitor.clone();
                std::thread::spawn(move || {
                    for j in 0..25 {
                        monitor.record(metric("m", i * 100 + j));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(monitor.len(), 200);
        monitor.clear();
        assert!(monitor.is_empty());
    }
}
