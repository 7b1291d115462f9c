//! # Agent Collaborators
//!
//! The orchestrator talks to one [`Collaborator`] for all six phases. The
//! request names its phase; the collaborator returns a JSON value (or a
//! string containing JSON) that the phase contract parses.
//!
//! - `llm` - [`LlmCollaborator`], backed by radkit LLM functions
//! - `llm_helpers` - Provider dispatch macro shared by the LLM collaborator

pub mod llm;
pub mod llm_helpers;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::phases::PhaseName;

pub use llm::LlmCollaborator;

/// A single call to a collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub run_id: String,
    pub phase: PhaseName,
    /// Phase iteration this call belongs to (1-based)
    pub iteration: u32,
    /// Invoker attempt (1-based)
    pub attempt: u32,
    /// Phase input, serialized
    pub payload: serde_json::Value,
}

/// External agent that performs the work of a phase
#[async_trait]
pub trait Collaborator: Send + Sync {
    async fn invoke(&self, request: AgentRequest) -> anyhow::Result<serde_json::Value>;
}
