//! TTL cache for decisions.
//!
//! An explicit object built once at startup and handed to the engine.
//! Entries are content-addressed and immutable; concurrent writers of the
//! same key compute the same decision, so last-writer-wins is harmless.
//! The lock is held only for map operations, never across an await.

use super::{Decision, DecisionContext};
use crate::decision::patterns::normalize;
use orquesta_config::DecisionConfig;
use orquesta_core::tenant::PlanTier;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;

/// Chance that an insert also sweeps expired entries.
const SWEEP_PROBABILITY: f64 = 0.1;

/// Deterministic cache key: tenant, plan, capability flag and the start of
/// the normalized message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(
        tenant_id: &str,
        plan: PlanTier,
        model_supports_tools: bool,
        message: &str,
        key_chars: usize,
    ) -> Self {
        let collapsed = normalize(message)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let truncated: String = collapsed.chars().take(key_chars).collect();
        Self(format!(
            "{tenant_id}|{plan}|{}|{truncated}",
            u8::from(model_supports_tools)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug)]
struct Entry {
    decision: Decision,
    inserted: Instant,
}

/// Hit/miss counters and current size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

pub struct DecisionCache {
    ttl: Duration,
    max_entries: usize,
    key_chars: usize,
    entries: RwLock<HashMap<CacheKey, Entry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DecisionCache {
    pub fn new(ttl: Duration, max_entries: usize, key_chars: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            key_chars: key_chars.max(1),
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &DecisionConfig) -> Self {
        Self::new(
            Duration::from_secs(config.cache_ttl_secs),
            config.cache_max_entries,
            config.cache_key_chars,
        )
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn key_for(&self, message: &str, ctx: &DecisionContext<'_>) -> CacheKey {
        CacheKey::new(
            ctx.tenant_id,
            ctx.plan,
            ctx.model_supports_tools,
            message,
            self.key_chars,
        )
    }

    /// A live entry, if any. Expired entries are removed on the way out.
    pub fn get(&self, key: &CacheKey) -> Option<Decision> {
        let expired = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(key) {
                Some(entry) if entry.inserted.elapsed() < self.ttl => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.decision.clone());
                }
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            if entries
                .get(key)
                .is_some_and(|e| e.inserted.elapsed() >= self.ttl)
            {
                entries.remove(key);
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn insert(&self, key: CacheKey, decision: Decision) {
        let sweep = rand::rng().random_bool(SWEEP_PROBABILITY);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if sweep {
            let before = entries.len();
            entries.retain(|_, e| e.inserted.elapsed() < self.ttl);
            let swept = before - entries.len();
            if swept > 0 {
                tracing::debug!(swept, "Swept expired decisions");
            }
        }

        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            Entry {
                decision,
                inserted: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for DecisionCache {
    fn default() -> Self {
        Self::from_config(&DecisionConfig::default())
    }
}
