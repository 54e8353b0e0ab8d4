//! The orchestration core of Orquesta.
//!
//! A message flows through two stages:
//!
//! 1. **Decide** ([`decision`]): a cached pattern scan plus tenant-aware
//!    analysis answers "does this need tools, and can the answer stream?"
//! 2. **Execute** ([`react`]): conversational messages get one provider
//!    call; the rest run a bounded **Think → Act → Observe** loop over the
//!    tenant's permitted tools.
//!
//! [`Orchestrator`] wires both stages to providers, tools, telemetry and
//! the tenant directory.

pub mod decision;
pub mod error;
pub mod orchestrator;
pub mod react;
pub mod stream_event;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use decision::{Decision, DecisionCache, DecisionContext, DecisionEngine, PatternScanner};
pub use error::{AgentError, USER_FACING_ERROR};
pub use orchestrator::{ChatReply, Orchestrator};
pub use react::{AgentSettings, ReactExecutor, RunOutcome, StopReason};
pub use stream_event::{AgentEvent, DoneMetadata};
