//! # Orquesta Core
//!
//! Domain types, traits, and error definitions for the Orquesta agent
//! orchestration engine. This crate has **no framework dependencies**: it
//! defines the model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every seam is a trait here and implementations live in their own crates:
//! - LLM backends implement [`Provider`]
//! - Side-effecting capabilities implement [`ToolHandler`] and are gated by
//!   plan tier and integrations in the [`ToolRegistry`]
//! - The RAG store and tenant persistence are consumed through
//!   [`ContextRetriever`] and [`TenantDirectory`]

pub mod collaborator;
pub mod error;
pub mod message;
pub mod provider;
pub mod tenant;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use collaborator::{ContextRetriever, RetrievedChunk, TenantDirectory};
pub use error::{CollaboratorError, Error, ProviderError, Result, ToolError};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolSpec, Usage};
pub use tenant::{ActiveIntegrations, Credentials, IntegrationKey, PlanTier, ToolContext};
pub use tool::{GateCheck, ToolDefinition, ToolGate, ToolHandler, ToolRegistry, ToolResult};
