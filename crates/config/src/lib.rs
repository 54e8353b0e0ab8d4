//! Configuration loading, validation, and management for Orquesta.
//!
//! Loads configuration from `~/.orquesta/config.toml` with environment
//! variable overrides. Every empirically chosen constant of the decision
//! engine and the executor lives here so it can be tuned without a rebuild.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.orquesta/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Ordered fallback chain tried after the default provider
    #[serde(default)]
    pub fallback: Vec<FallbackConfig>,

    /// Tool-need decision engine
    #[serde(default)]
    pub decision: DecisionConfig,

    /// ReAct executor
    #[serde(default)]
    pub agent: AgentConfig,

    /// Retry policy overrides
    #[serde(default)]
    pub retry: RetryConfig,

    /// Performance telemetry
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Tool catalog switches
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Model capability overrides
    #[serde(default)]
    pub models: ModelsConfig,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("providers", &self.providers)
            .field("fallback", &self.fallback)
            .field("decision", &self.decision)
            .field("agent", &self.agent)
            .field("retry", &self.retry)
            .field("telemetry", &self.telemetry)
            .field("tools", &self.tools)
            .field("models", &self.models)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

/// One entry of the provider fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Provider name (must be resolvable like `default_provider`)
    pub provider: String,

    /// Model to request from this provider; defaults to the primary model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default = "default_fallback_timeout")]
    pub timeout_secs: u64,
}

fn default_fallback_timeout() -> u64 {
    60
}

/// Thresholds and cache settings for the tool-need decision engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Phase-1 confidence required before deep analysis runs
    #[serde(default = "default_analysis_threshold")]
    pub analysis_threshold: u8,

    /// Confidence at or above which tools are needed
    #[serde(default = "default_tools_threshold")]
    pub tools_threshold: u8,

    /// Confidence below which token streaming stays enabled
    #[serde(default = "default_stream_threshold")]
    pub stream_threshold: u8,

    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    /// Characters of the normalized message that participate in the cache key
    #[serde(default = "default_cache_key_chars")]
    pub cache_key_chars: usize,

    /// Ask an LLM which reminder operation the user wants
    #[serde(default)]
    pub classifier_enabled: bool,

    /// Model for the reminder classifier; defaults to the primary model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier_model: Option<String>,

    #[serde(default = "default_classifier_timeout")]
    pub classifier_timeout_ms: u64,
}

fn default_analysis_threshold() -> u8 {
    20
}
fn default_tools_threshold() -> u8 {
    60
}
fn default_stream_threshold() -> u8 {
    70
}
fn default_cache_ttl() -> u64 {
    300
}
fn default_cache_max_entries() -> usize {
    10_000
}
fn default_cache_key_chars() -> usize {
    100
}
fn default_classifier_timeout() -> u64 {
    1_500
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            analysis_threshold: default_analysis_threshold(),
            tools_threshold: default_tools_threshold(),
            stream_threshold: default_stream_threshold(),
            cache_ttl_secs: default_cache_ttl(),
            cache_max_entries: default_cache_max_entries(),
            cache_key_chars: default_cache_key_chars(),
            classifier_enabled: false,
            classifier_model: None,
            classifier_timeout_ms: default_classifier_timeout(),
        }
    }
}

/// ReAct executor tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Iterations granted to every run before length/complexity bonuses
    #[serde(default = "default_base_iterations")]
    pub base_iterations: u32,

    /// Hard ceiling on THINK cycles per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Thought confidence (0..1) below which the loop stops asking the model
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f32,

    /// Wall-clock budget per run; 0 disables it
    #[serde(default = "default_time_budget")]
    pub time_budget_secs: u64,

    /// Lexical markers that signal a tool result completed the task
    #[serde(default = "default_completion_markers")]
    pub completion_markers: Vec<String>,

    /// Knowledge chunks requested from the retriever per THINK prompt
    #[serde(default = "default_context_top_k")]
    pub context_top_k: usize,

    /// Temperature for THINK calls (structured output)
    #[serde(default = "default_think_temperature")]
    pub think_temperature: f32,

    /// Bot persona prepended to every prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_base_iterations() -> u32 {
    3
}
fn default_max_iterations() -> u32 {
    7
}
fn default_confidence_floor() -> f32 {
    0.3
}
fn default_time_budget() -> u64 {
    45
}
fn default_completion_markers() -> Vec<String> {
    [
        "completado",
        "listo",
        "exitosamente",
        "creado",
        "agendado",
        "guardado",
        "cancelado",
        "successfully",
        "completed",
        "done",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_context_top_k() -> usize {
    3
}
fn default_think_temperature() -> f32 {
    0.2
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_iterations: default_base_iterations(),
            max_iterations: default_max_iterations(),
            confidence_floor: default_confidence_floor(),
            time_budget_secs: default_time_budget(),
            completion_markers: default_completion_markers(),
            context_top_k: default_context_top_k(),
            think_temperature: default_think_temperature(),
            system_prompt: None,
        }
    }
}

/// Retry policy knobs, as configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicyConfig {
    pub max_attempts: u32,

    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    #[serde(default = "default_true")]
    pub jitter: bool,

    #[serde(default = "default_true")]
    pub exponential: bool,
}

fn default_base_delay() -> u64 {
    500
}
fn default_max_delay() -> u64 {
    8_000
}

/// Per-provider retry overrides keyed by provider name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub overrides: HashMap<String, RetryPolicyConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Aggregation window for summaries
    #[serde(default = "default_window")]
    pub window_secs: u64,

    /// Metrics older than this are pruned
    #[serde(default = "default_retention")]
    pub retention_secs: u64,

    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

fn default_window() -> u64 {
    3_600
}
fn default_retention() -> u64 {
    86_400
}
fn default_max_records() -> usize {
    50_000
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: default_window(),
            retention_secs: default_retention(),
            max_records: default_max_records(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Tool names switched off without removing them from the catalog
    #[serde(default)]
    pub disabled: Vec<String>,

    /// ISO currency used when a payment request omits one
    #[serde(default = "default_currency")]
    pub default_currency: String,
}

fn default_currency() -> String {
    "mxn".into()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            disabled: vec![],
            default_currency: default_currency(),
        }
    }
}

/// Overrides for the built-in tool-calling capability table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Models treated as able to call tools
    #[serde(default)]
    pub tool_capable: Vec<String>,

    /// Models that must never be offered tools
    #[serde(default)]
    pub without_tools: Vec<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.orquesta/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `ORQUESTA_API_KEY` (highest priority)
    /// - `OPENROUTER_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var("ORQUESTA_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("ORQUESTA_PROVIDER") {
            self.default_provider = provider;
        }

        if let Ok(model) = std::env::var("ORQUESTA_MODEL") {
            self.default_model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".orquesta")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        let d = &self.decision;
        if d.tools_threshold > 100 || d.stream_threshold > 100 {
            return Err(ConfigError::ValidationError(
                "decision thresholds must be within 0..=100".into(),
            ));
        }
        if d.analysis_threshold > d.tools_threshold {
            return Err(ConfigError::ValidationError(
                "decision.analysis_threshold must not exceed decision.tools_threshold".into(),
            ));
        }
        if d.cache_ttl_secs == 0 || d.cache_key_chars == 0 {
            return Err(ConfigError::ValidationError(
                "decision cache TTL and key length must be positive".into(),
            ));
        }

        let a = &self.agent;
        if a.base_iterations == 0 || a.max_iterations < a.base_iterations {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be >= agent.base_iterations >= 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&a.confidence_floor) {
            return Err(ConfigError::ValidationError(
                "agent.confidence_floor must be between 0.0 and 1.0".into(),
            ));
        }

        for (provider, policy) in &self.retry.overrides {
            if policy.max_attempts == 0 || policy.max_attempts > 10 {
                return Err(ConfigError::ValidationError(format!(
                    "retry.overrides.{provider}.max_attempts must be between 1 and 10"
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some() || self.providers.values().any(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            providers: HashMap::new(),
            fallback: vec![],
            decision: DecisionConfig::default(),
            agent: AgentConfig::default(),
            retry: RetryConfig::default(),
            telemetry: TelemetryConfig::default(),
            tools: ToolsConfig::default(),
            models: ModelsConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.decision.analysis_threshold, 20);
        assert_eq!(config.decision.tools_threshold, 60);
        assert_eq!(config.decision.stream_threshold, 70);
        assert_eq!(config.decision.cache_ttl_secs, 300);
        assert!((config.agent.confidence_floor - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.agent.max_iterations, config.agent.max_iterations);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_thresholds_rejected() {
        let mut config = AppConfig::default();
        config.decision.analysis_threshold = 80;
        assert!(config.validate().is_err());
    }

    #[test]
    fn iteration_ceiling_below_base_rejected() {
        let mut config = AppConfig::default();
        config.agent.base_iterations = 5;
        config.agent.max_iterations = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_provider, "openrouter");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
default_model = "gpt-4o"

[decision]
tools_threshold = 65
cache_ttl_secs = 120

[tools]
disabled = ["get_chatbot_stats"]

[retry.overrides.openai]
max_attempts = 4

[[fallback]]
provider = "openai"
model = "gpt-4o-mini"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.default_model, "gpt-4o");
        assert_eq!(config.decision.tools_threshold, 65);
        assert_eq!(config.decision.stream_threshold, 70);
        assert_eq!(config.decision.cache_ttl_secs, 120);
        assert_eq!(config.tools.disabled, vec!["get_chatbot_stats"]);
        assert_eq!(config.retry.overrides["openai"].max_attempts, 4);
        assert!(config.retry.overrides["openai"].jitter);
        assert_eq!(config.fallback.len(), 1);
        assert_eq!(config.fallback[0].timeout_secs, 60);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_model = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(file.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn debug_redacts_api_keys() {
        let mut config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        config.providers.insert(
            "openai".into(),
            ProviderConfig {
                api_key: Some("sk-other".into()),
                ..ProviderConfig::default()
            },
        );
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("sk-other"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("openrouter"));
        assert!(toml_str.contains("completion_markers"));
    }
}
