//! Provider fallback: ordered chain with per-provider timeouts.
//!
//! When a provider fails (timeout, rate limit, error), the next provider in
//! the chain is tried. Responses are stamped with the provider that answered
//! and whether that was a fallback, so telemetry can report fallback rates.

use async_trait::async_trait;
use orquesta_core::error::ProviderError;
use orquesta_core::provider::{
    ChunkReceiver, META_FALLBACK_USED, META_PROVIDER, Provider, ProviderRequest, ProviderResponse,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const STREAM_BUFFER: usize = 32;

/// A provider that wraps an ordered list of providers and falls back on failure.
pub struct FallbackProvider {
    name: String,
    chain: Vec<FallbackEntry>,
}

struct FallbackEntry {
    provider: Arc<dyn Provider>,
    timeout: Duration,
    /// Model requested from this entry instead of the caller's
    model: Option<String>,
}

impl FallbackProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chain: Vec::new(),
        }
    }

    /// Add a provider to the chain with a custom timeout.
    pub fn add(mut self, provider: Arc<dyn Provider>, timeout: Duration) -> Self {
        self.chain.push(FallbackEntry {
            provider,
            timeout,
            model: None,
        });
        self
    }

    /// Add a provider that is asked for a specific model.
    pub fn add_with_model(
        mut self,
        provider: Arc<dyn Provider>,
        timeout: Duration,
        model: impl Into<String>,
    ) -> Self {
        self.chain.push(FallbackEntry {
            provider,
            timeout,
            model: Some(model.into()),
        });
        self
    }

    /// Add a provider with the default timeout (120s).
    pub fn add_default(self, provider: Arc<dyn Provider>) -> Self {
        self.add(provider, Duration::from_secs(120))
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    fn request_for(entry: &FallbackEntry, request: &ProviderRequest) -> ProviderRequest {
        let mut request = request.clone();
        if let Some(model) = &entry.model {
            request.model = model.clone();
        }
        request
    }
}

fn stamp(metadata: &mut Map<String, Value>, provider: &str, fallback_used: bool) {
    metadata
        .entry(META_PROVIDER)
        .or_insert_with(|| provider.into());
    metadata.insert(META_FALLBACK_USED.into(), fallback_used.into());
}

/// Re-send `inner` with the answering provider stamped on the first chunk.
fn stamp_stream(mut inner: ChunkReceiver, provider: String, fallback_used: bool) -> ChunkReceiver {
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    tokio::spawn(async move {
        let mut stamped = false;
        while let Some(mut item) = inner.recv().await {
            if !stamped && let Ok(chunk) = &mut item {
                stamp(&mut chunk.metadata, &provider, fallback_used);
                stamped = true;
            }
            if tx.send(item).await.is_err() {
                break;
            }
        }
    });
    rx
}

impl FallbackProvider {
    /// Try each entry in order and return the first success together with
    /// the index of the entry that produced it.
    async fn first_success<'a, T, Fut>(
        &'a self,
        mode: &'static str,
        mut call: impl FnMut(&'a FallbackEntry) -> Fut,
    ) -> Result<(usize, T), ProviderError>
    where
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut last_error = ProviderError::NotConfigured("No providers in fallback chain".into());

        for (i, entry) in self.chain.iter().enumerate() {
            let provider = entry.provider.name();
            debug!(provider, mode, position = i + 1, total = self.chain.len(), "Fallback: trying provider");

            last_error = match tokio::time::timeout(entry.timeout, call(entry)).await {
                Ok(Ok(value)) => {
                    if i > 0 {
                        info!(provider, mode, "Fallback: answered by backup provider");
                    }
                    return Ok((i, value));
                }
                Ok(Err(e)) => {
                    warn!(provider, mode, error = %e, "Fallback: provider failed, trying next");
                    e
                }
                Err(_) => {
                    warn!(
                        provider,
                        mode,
                        timeout_ms = entry.timeout.as_millis() as u64,
                        "Fallback: provider timed out, trying next"
                    );
                    ProviderError::Timeout(format!(
                        "provider '{provider}' gave no {mode} answer within {}ms",
                        entry.timeout.as_millis()
                    ))
                }
            };
        }

        Err(last_error)
    }
}

#[async_trait]
impl Provider for FallbackProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let (index, mut response) = self
            .first_success("complete", |entry| {
                entry.provider.complete(Self::request_for(entry, &request))
            })
            .await?;
        stamp(&mut response.metadata, self.chain[index].provider.name(), index > 0);
        Ok(response)
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let (index, rx) = self
            .first_success("stream", |entry| {
                entry.provider.stream(Self::request_for(entry, &request))
            })
            .await?;
        let provider = self.chain[index].provider.name().to_string();
        Ok(stamp_stream(rx, provider, index > 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orquesta_core::message::Message;
    use std::sync::Mutex;

    struct FailingProvider {
        name: String,
        error: ProviderError,
        call_count: Mutex<usize>,
    }

    impl FailingProvider {
        fn new(name: &str, error: ProviderError) -> Self {
            Self {
                name: name.into(),
                error,
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl Provider for FailingProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            *self.call_count.lock().unwrap() += 1;
            Err(self.error.clone())
        }
    }

    /// Echoes the requested model back.
    struct SuccessProvider {
        name: String,
        call_count: Mutex<usize>,
    }

    impl SuccessProvider {
        fn new(name: &str) -> Self {
            Self {
                name: name.into(),
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl Provider for SuccessProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            *self.call_count.lock().unwrap() += 1;
            Ok(ProviderResponse {
                message: Message::assistant("success"),
                usage: None,
                model: request.model,
                metadata: serde_json::Map::new(),
            })
        }
    }

    struct HangingProvider;

    #[async_trait]
    impl Provider for HangingProvider {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ProviderError::Timeout("never".into()))
        }
    }

    fn test_request() -> ProviderRequest {
        ProviderRequest::new("test", vec![Message::user("hola")])
    }

    #[tokio::test]
    async fn first_provider_succeeds_without_fallback_flag() {
        let p1 = Arc::new(SuccessProvider::new("primary"));
        let p2 = Arc::new(SuccessProvider::new("secondary"));

        let fallback = FallbackProvider::new("test")
            .add_default(p1.clone())
            .add_default(p2.clone());

        let response = fallback.complete(test_request()).await.unwrap();
        assert_eq!(response.provider_name(), Some("primary"));
        assert!(!response.fallback_used());
        assert_eq!(p1.calls(), 1);
        assert_eq!(p2.calls(), 0);
    }

    #[tokio::test]
    async fn falls_back_on_failure_and_stamps_metadata() {
        let p1 = Arc::new(FailingProvider::new(
            "primary",
            ProviderError::ApiError {
                status_code: 500,
                message: "Internal Server Error".into(),
            },
        ));
        let p2 = Arc::new(SuccessProvider::new("secondary"));

        let fallback = FallbackProvider::new("test")
            .add_default(p1.clone())
            .add_with_model(p2.clone(), Duration::from_secs(5), "gpt-4o-mini");

        let response = fallback.complete(test_request()).await.unwrap();
        assert_eq!(response.provider_name(), Some("secondary"));
        assert!(response.fallback_used());
        assert_eq!(response.model, "gpt-4o-mini");
        assert_eq!(p1.calls(), 1);
        assert_eq!(p2.calls(), 1);
    }

    #[tokio::test]
    async fn all_providers_fail_with_last_error() {
        let p1 = Arc::new(FailingProvider::new(
            "primary",
            ProviderError::Network("conn refused".into()),
        ));
        let p2 = Arc::new(FailingProvider::new(
            "secondary",
            ProviderError::AuthenticationFailed("bad key".into()),
        ));

        let fallback = FallbackProvider::new("test")
            .add_default(p1.clone())
            .add_default(p2.clone());

        match fallback.complete(test_request()).await {
            Err(ProviderError::AuthenticationFailed(_)) => {}
            other => panic!("Expected AuthenticationFailed, got: {other:?}"),
        }
        assert_eq!(p1.calls(), 1);
        assert_eq!(p2.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_triggers_fallback() {
        let p2 = Arc::new(SuccessProvider::new("secondary"));

        let fallback = FallbackProvider::new("test")
            .add(Arc::new(HangingProvider), Duration::from_millis(50))
            .add_default(p2.clone());

        let response = fallback.complete(test_request()).await.unwrap();
        assert!(response.fallback_used());
        assert_eq!(p2.calls(), 1);
    }

    #[tokio::test]
    async fn empty_chain_returns_not_configured() {
        let fallback = FallbackProvider::new("empty");
        assert!(fallback.is_empty());
        assert!(matches!(
            fallback.complete(test_request()).await,
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn stream_falls_back_too() {
        let p1 = Arc::new(FailingProvider::new(
            "primary",
            ProviderError::RateLimited {
                retry_after_secs: 1,
            },
        ));
        let p2 = Arc::new(SuccessProvider::new("secondary"));
        let fallback = FallbackProvider::new("test")
            .add_default(p1)
            .add_default(p2);
        assert_eq!(fallback.len(), 2);

        let mut rx = fallback.stream(test_request()).await.unwrap();
        let chunk = rx.recv().await.unwrap().unwrap();
        assert_eq!(chunk.content.as_deref(), Some("success"));
        assert!(chunk.done);
        assert_eq!(chunk.provider_name(), Some("secondary"));
        assert!(chunk.fallback_used());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn stream_from_primary_is_not_a_fallback() {
        let fallback = FallbackProvider::new("test")
            .add_default(Arc::new(SuccessProvider::new("primary")))
            .add_default(Arc::new(SuccessProvider::new("secondary")));

        let mut rx = fallback.stream(test_request()).await.unwrap();
        let chunk = rx.recv().await.unwrap().unwrap();
        assert_eq!(chunk.provider_name(), Some("primary"));
        assert!(!chunk.fallback_used());
    }
}
