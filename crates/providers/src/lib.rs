//! LLM Provider implementations for Orquesta.
//!
//! All providers implement the `orquesta_core::Provider` trait. Retry and
//! fallback are wrapping providers, so the executor never knows whether it
//! is talking to one backend or a resilient chain of them.

pub mod capabilities;
pub mod fallback;
pub mod openai_compat;
pub mod quirks;
pub mod retry;
pub mod router;

pub use capabilities::ModelCapabilities;
pub use fallback::FallbackProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use quirks::ModelQuirks;
pub use retry::{RetryPolicy, RetryingProvider};
pub use router::build_from_config;
