//! Request performance telemetry for Orquesta.
//!
//! Every handled message produces one [`RequestMetric`]: how long the
//! tool-need decision took, what it concluded, which model and provider
//! answered, which tools ran and how long the whole response took. The
//! [`PerformanceMonitor`] keeps a bounded, age-pruned window of them and
//! aggregates summaries on demand. Nothing here feeds back into decisions.

pub mod engine;
pub mod model;

pub use engine::PerformanceMonitor;
pub use model::{PerformanceSummary, RankedCount, RequestMetric};
