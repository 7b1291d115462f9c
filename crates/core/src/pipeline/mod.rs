//! # Pipeline Orchestration
//!
//! Runs the six phases for one project description and gates the result on
//! quality.
//!
//! ## Run Flow
//!
//! ```text
//! start → Discovery ⟷ Challenge → Design ⟷ Decomposition → Validation → Synthesis
//!                                   ↑___________(quality gate)___________|
//! ```
//!
//! - `config` - Iteration limits, retry policy, quality settings
//! - `error` - Run, invocation and config errors
//! - `events` - Event stream and listener isolation
//! - `invoker` - Retry/timeout/shape-check loop around the collaborator
//! - `orchestrator` - Phase sequencing and feedback loops
//! - `state` - Run and per-phase state

pub mod config;
pub mod error;
pub mod events;
pub mod invoker;
pub mod orchestrator;
pub mod state;

pub use config::{
    IterationConfig, IterationLimit, LoopPair, PipelineConfig, QualityConfig, RetryPolicy,
};
pub use error::{AttemptError, ConfigError, InvokeError, PipelineError};
pub use events::{ChannelListener, EventBus, EventListener, PipelineEvent, PipelineEventKind};
pub use invoker::{AgentInvoker, Invocation};
pub use orchestrator::{CancelHandle, Orchestrator};
pub use state::{PhaseState, PhaseStatus, PipelineRun, RunStatus};
