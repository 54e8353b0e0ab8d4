//! Iteration budget per run.

use super::AgentSettings;
use crate::decision::patterns::{contains_phrase, normalize, words};
use crate::decision::PatternScan;

/// Messages longer than this (in characters) get one extra iteration.
pub const LONG_MESSAGE_CHARS: usize = 200;

const CONNECTORS: &[&str] = &[
    "luego",
    "despues",
    "tambien",
    "ademas",
    "and then",
    "also",
    "after that",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// Heuristic complexity from sequencing words, question count and how
/// many signal families matched.
pub fn estimate_complexity(message: &str, scan: &PatternScan) -> Complexity {
    let normalized = normalize(message);
    let words = words(&normalized);
    let connectors = CONNECTORS
        .iter()
        .filter(|c| contains_phrase(&words, c))
        .count();
    let questions = message.matches('?').count();
    let families = scan.families.len();

    let score = connectors + questions.saturating_sub(1) + families.saturating_sub(1);
    match score {
        0 | 1 => Complexity::Low,
        2 | 3 => Complexity::Medium,
        _ => Complexity::High,
    }
}

/// The number of THINK cycles a run may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationBudget {
    max: u32,
}

impl IterationBudget {
    pub fn for_message(message: &str, scan: &PatternScan, settings: &AgentSettings) -> Self {
        let mut max = settings.base_iterations;
        if message.chars().count() > LONG_MESSAGE_CHARS {
            max += 1;
        }
        max += match estimate_complexity(message, scan) {
            Complexity::Low => 0,
            Complexity::Medium => 1,
            Complexity::High => 2,
        };
        Self {
            max: max.clamp(1, settings.max_iterations.max(1)),
        }
    }

    pub fn max(&self) -> u32 {
        self.max
    }
}
