//! Retry with exponential backoff and bounded jitter.
//!
//! Only transient provider errors are retried (see
//! [`ProviderError::is_transient`]). Rate-limit responses honour the
//! server's `retry-after` hint when it exceeds the computed backoff.

use async_trait::async_trait;
use orquesta_config::{RetryConfig, RetryPolicyConfig};
use orquesta_core::error::ProviderError;
use orquesta_core::provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How a failing provider call is retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Randomise each delay within 50..=100% of its nominal value
    pub jitter: bool,
    /// Double the delay after every failed attempt
    pub exponential: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: true,
            exponential: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Built-in defaults per provider.
    ///
    /// Aggregators get the most patience, local servers the least.
    pub fn for_provider(provider: &str) -> Self {
        let (max_attempts, base_ms) = match provider {
            "openrouter" => (4, 750),
            "openai" | "groq" | "together" | "fireworks" | "deepseek" => (3, 500),
            "ollama" | "vllm" | "llamacpp" | "llama.cpp" => (2, 250),
            _ => (3, 500),
        };
        Self {
            max_attempts,
            base_delay: Duration::from_millis(base_ms),
            ..Self::default()
        }
    }

    /// Provider defaults with any configured override applied.
    pub fn from_config(provider: &str, config: &RetryConfig) -> Self {
        match config.overrides.get(provider) {
            Some(o) => Self::from(o),
            None => Self::for_provider(provider),
        }
    }

    /// Nominal delay before retry number `attempt` (1-based), before jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = if self.exponential {
            1u32 << attempt.saturating_sub(1).min(16)
        } else {
            1
        };
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn delay(&self, attempt: u32, error: &ProviderError) -> Duration {
        let nominal = self.backoff(attempt);
        let mut delay = if self.jitter && nominal.as_millis() > 1 {
            let ms = nominal.as_millis() as u64;
            Duration::from_millis(rand::rng().random_range(ms / 2..=ms))
        } else {
            nominal
        };
        if let ProviderError::RateLimited { retry_after_secs } = error {
            delay = delay.max(Duration::from_secs(*retry_after_secs).min(self.max_delay));
        }
        delay
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(label, attempt, "Retry succeeded");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = self.delay(attempt, &e);
                    warn!(
                        label,
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient provider error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl From<&RetryPolicyConfig> for RetryPolicy {
    fn from(c: &RetryPolicyConfig) -> Self {
        Self {
            max_attempts: c.max_attempts,
            base_delay: Duration::from_millis(c.base_delay_ms),
            max_delay: Duration::from_millis(c.max_delay_ms),
            jitter: c.jitter,
            exponential: c.exponential,
        }
    }
}

/// Routes every call of the wrapped provider through a [`RetryPolicy`].
pub struct RetryingProvider {
    inner: Arc<dyn Provider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn Provider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl Provider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.policy
            .run(self.inner.name(), || self.inner.complete(request.clone()))
            .await
    }

    /// Only establishing the stream is retried; a stream that breaks midway
    /// surfaces as `StreamInterrupted` on the receiver.
    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.policy
            .run(self.inner.name(), || self.inner.stream(request.clone()))
            .await
    }
}
