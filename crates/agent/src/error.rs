//! Errors surfaced by the orchestration core.
//!
//! Almost nothing here reaches a user: tool faults, parse failures and
//! late provider failures are folded into the run. What remains is the
//! first-iteration failure, where no progress exists to synthesize from.

use orquesta_core::error::ProviderError;
use thiserror::Error;

/// The short, actionable copy shown to end users when a run fails.
pub const USER_FACING_ERROR: &str = "Hubo un error, intenta de nuevo.";

#[derive(Debug, Error)]
pub enum AgentError {
    /// The provider failed (after retries) before the first observation.
    #[error("first iteration failed: {source}")]
    FirstIteration {
        #[source]
        source: ProviderError,
    },

    /// The conversational fast path failed.
    #[error("conversational call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("invalid pattern table: {0}")]
    Patterns(#[from] regex_lite::Error),
}

impl AgentError {
    /// Text for the end user. Never contains diagnostics.
    pub fn user_message(&self) -> &'static str {
        USER_FACING_ERROR
    }

    /// Error category recorded in telemetry.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FirstIteration { source } | Self::Provider(source) => match source {
                ProviderError::Timeout(_) => "timeout",
                ProviderError::RateLimited { .. } => "rate_limited",
                ProviderError::AuthenticationFailed(_) => "authentication",
                ProviderError::NotConfigured(_) => "not_configured",
                ProviderError::ModelNotFound(_) => "model_not_found",
                ProviderError::Network(_) | ProviderError::StreamInterrupted(_) => "network",
                ProviderError::ApiError { .. } => "provider_api",
            },
            Self::Patterns(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_hides_detail() {
        let err = AgentError::FirstIteration {
            source: ProviderError::AuthenticationFailed("bad key sk-123".into()),
        };
        assert_eq!(err.user_message(), USER_FACING_ERROR);
        assert!(!err.user_message().contains("sk-123"));
        assert!(err.to_string().contains("sk-123"));
        assert_eq!(err.kind(), "authentication");
    }

    #[test]
    fn kinds_follow_provider_error() {
        let timeout = AgentError::Provider(ProviderError::Timeout("slow".into()));
        assert_eq!(timeout.kind(), "timeout");
        let limited = AgentError::FirstIteration {
            source: ProviderError::RateLimited { retry_after_secs: 3 },
        };
        assert_eq!(limited.kind(), "rate_limited");
    }
}
