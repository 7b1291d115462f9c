//! # Blueprint Core
//!
//! Turns a free-form project description into a validated specification by
//! driving six agent phases and gating the result on five quality checks.
//!
//! ## Architecture
//!
//! - `phases/` - Typed inputs, outputs and shape checks for each phase
//! - `pipeline/` - Orchestrator, retrying agent invoker, run state, events, config
//! - `quality/` - Validators (completeness, citation, atomic size, schema balance,
//!   dependency graph) and the aggregator
//! - `agents/` - Collaborator seam and the radkit-backed LLM collaborator
//! - `models` - LLM provider selection, global and per phase
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use blueprint_core::agents::LlmCollaborator;
//! use blueprint_core::pipeline::{Orchestrator, PipelineConfig};
//!
//! let config = PipelineConfig::load("blueprint.json")?;
//! let collaborator = Arc::new(LlmCollaborator::new(config.models.clone()));
//! let mut orchestrator = Orchestrator::new(config, collaborator)?;
//! let spec = orchestrator.start("Build a stock tracker").await?;
//! ```

pub mod agents;
pub mod models;
pub mod phases;
pub mod pipeline;
pub mod quality;

#[cfg(test)]
mod testing;
