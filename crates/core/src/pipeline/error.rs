//! Error types for the pipeline.
//!
//! Validation issues are data ([`ValidationIssue`](crate::quality::ValidationIssue)),
//! never errors. Only agent failures, exhausted budgets, cancellation and
//! configuration problems end a run.

use thiserror::Error;

use super::config::LoopPair;
use super::state::RunStatus;
use crate::phases::PhaseName;

/// Why a single collaborator attempt was rejected. Every variant is
/// retryable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttemptError {
    #[error("collaborator call failed: {0}")]
    Transport(String),

    #[error("collaborator did not answer within {0} ms")]
    Timeout(u64),

    #[error("response could not be parsed: {0}")]
    Parse(String),

    #[error("response failed shape validation: {}", .0.join("; "))]
    Shape(Vec<String>),
}

/// Failure of one phase's agent invocation
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    #[error("{phase} failed after {attempts} attempt(s): {last}")]
    Exhausted {
        phase: PhaseName,
        attempts: u32,
        last: AttemptError,
    },

    /// The request payload could not be built; retrying cannot help
    #[error("could not build {phase} request: {reason}")]
    Request { phase: PhaseName, reason: String },
}

impl InvokeError {
    pub fn phase(&self) -> PhaseName {
        match self {
            InvokeError::Exhausted { phase, .. } | InvokeError::Request { phase, .. } => *phase,
        }
    }
}

/// Terminal failure of a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Agent(#[from] InvokeError),

    #[error("quality gate not passed after {attempts} validation attempt(s) (confidence {confidence})")]
    ValidationBudgetExhausted { attempts: u32, confidence: u8 },

    #[error("{pair} loop still requested after {iterations} iteration(s)")]
    LoopBudgetExhausted { pair: LoopPair, iterations: u32 },

    #[error("run cancelled before {before}")]
    Cancelled { before: PhaseName },

    /// `start` may only be called once per orchestrator
    #[error("run already started (status {0:?})")]
    AlreadyStarted(RunStatus),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure loading a [`PipelineConfig`](super::config::PipelineConfig)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for PipelineError {
    fn from(err: ConfigError) -> Self {
        PipelineError::InvalidConfig(err.to_string())
    }
}
