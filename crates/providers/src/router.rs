//! Provider router: builds the resilient provider stack from config.
//!
//! Every named provider is an OpenAI-compatible endpoint wrapped in its
//! retry policy. The default provider heads a fallback chain followed by
//! the configured `[[fallback]]` entries.

use crate::fallback::FallbackProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::retry::{RetryPolicy, RetryingProvider};
use orquesta_config::AppConfig;
use orquesta_core::error::ProviderError;
use orquesta_core::provider::Provider;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Timeout for the primary provider inside the fallback chain.
const PRIMARY_TIMEOUT: Duration = Duration::from_secs(120);

/// Named providers, each already wrapped in its retry policy.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    pub fn default_provider(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Register every provider named in config (default and fallbacks included).
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let mut router = Self::new(&config.default_provider);

        let mut names: Vec<&str> = config.providers.keys().map(String::as_str).collect();
        names.push(&config.default_provider);
        names.extend(config.fallback.iter().map(|f| f.provider.as_str()));

        for name in names {
            if router.get(name).is_some() {
                continue;
            }
            let raw = build_one(config, name)?;
            let policy = RetryPolicy::from_config(name, &config.retry);
            debug!(provider = name, max_attempts = policy.max_attempts, "Registered provider");
            router.register(name, Arc::new(RetryingProvider::new(raw, policy)));
        }

        Ok(router)
    }
}

fn build_one(config: &AppConfig, name: &str) -> Result<Arc<dyn Provider>, ProviderError> {
    let provider_config = config.providers.get(name);

    let api_key = provider_config
        .and_then(|p| p.api_key.clone())
        .or_else(|| config.api_key.clone());
    let api_key = match api_key {
        Some(key) => key,
        None if is_local(name) => name.to_string(),
        None => {
            return Err(ProviderError::NotConfigured(format!(
                "no API key for provider '{name}' (set api_key or ORQUESTA_API_KEY)"
            )));
        }
    };

    let base_url = provider_config
        .and_then(|p| p.api_url.clone())
        .or_else(|| default_base_url(name))
        .ok_or_else(|| {
            ProviderError::NotConfigured(format!("provider '{name}' needs an api_url"))
        })?;

    Ok(Arc::new(OpenAiCompatProvider::new(name, base_url, api_key)))
}

/// Build the provider the executor talks to: the default provider followed
/// by the configured fallback chain.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let router = ProviderRouter::from_config(config)?;
    let primary = router.default_provider().ok_or_else(|| {
        ProviderError::NotConfigured(format!("unknown provider '{}'", config.default_provider))
    })?;

    let mut chain = FallbackProvider::new("chain").add(primary, PRIMARY_TIMEOUT);
    for entry in &config.fallback {
        let provider = router.get(&entry.provider).ok_or_else(|| {
            ProviderError::NotConfigured(format!("unknown fallback provider '{}'", entry.provider))
        })?;
        let timeout = Duration::from_secs(entry.timeout_secs);
        chain = match &entry.model {
            Some(model) => chain.add_with_model(provider, timeout, model),
            None => chain.add(provider, timeout),
        };
    }

    Ok(Arc::new(chain))
}

fn is_local(provider_name: &str) -> bool {
    matches!(provider_name, "ollama" | "vllm" | "llamacpp" | "llama.cpp")
}

/// Default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> Option<String> {
    let url = match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1",
        "openai" => "https://api.openai.com/v1",
        "ollama" => "http://localhost:11434/v1",
        "deepseek" => "https://api.deepseek.com/v1",
        "groq" => "https://api.groq.com/openai/v1",
        "together" => "https://api.together.xyz/v1",
        "fireworks" => "https://api.fireworks.ai/inference/v1",
        "vllm" => "http://localhost:8000/v1",
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1",
        _ => return None,
    };
    Some(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use orquesta_config::{FallbackConfig, ProviderConfig};

    fn keyed_config() -> AppConfig {
        AppConfig {
            api_key: Some("sk-test".into()),
            ..AppConfig::default()
        }
    }

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openrouter").unwrap().contains("openrouter.ai"));
        assert!(default_base_url("openai").unwrap().contains("api.openai.com"));
        assert!(default_base_url("mystery").is_none());
    }

    #[test]
    fn build_from_default_config_with_key() {
        let provider = build_from_config(&keyed_config()).unwrap();
        assert_eq!(provider.name(), "chain");
    }

    #[test]
    fn missing_key_is_not_configured() {
        assert!(matches!(
            build_from_config(&AppConfig::default()),
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[test]
    fn local_providers_need_no_key() {
        let config = AppConfig {
            default_provider: "ollama".into(),
            ..AppConfig::default()
        };
        assert!(build_from_config(&config).is_ok());
    }

    #[test]
    fn router_registers_fallbacks_and_custom_urls() {
        let mut config = keyed_config();
        config.providers.insert(
            "internal".into(),
            ProviderConfig {
                api_url: Some("https://llm.internal/v1".into()),
                ..ProviderConfig::default()
            },
        );
        config.fallback.push(FallbackConfig {
            provider: "openai".into(),
            model: Some("gpt-4o-mini".into()),
            timeout_secs: 30,
        });

        let router = ProviderRouter::from_config(&config).unwrap();
        assert_eq!(router.list(), vec!["internal", "openai", "openrouter"]);
        assert!(router.default_provider().is_some());
        assert!(build_from_config(&config).is_ok());
    }

    #[test]
    fn unknown_provider_without_url_fails() {
        let config = AppConfig {
            default_provider: "mystery".into(),
            ..keyed_config()
        };
        assert!(build_from_config(&config).is_err());
    }
}
