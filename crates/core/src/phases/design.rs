//! # Design Phase
//!
//! Produces architecture decisions, each backed by a verification source,
//! and the pinned tech stack. The design collaborator is the only place
//! that talks to the external search/verification service.

use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::challenge::ChallengeOutput;
use super::discovery::DiscoveryOutput;
use super::{PhaseContract, PhaseName, Rework, ShapeCheck};

/// Input sent to the design collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignInput {
    pub description: String,
    pub iteration: u32,
    pub discovery: DiscoveryOutput,
    pub challenge: ChallengeOutput,
    /// Present when decomposition or validation sent the design back
    #[serde(default)]
    pub rework: Option<Rework>,
}

/// An option that was considered and rejected
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct RejectedAlternative {
    pub option: String,
    pub reason: String,
}

/// An architecture decision
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct Decision {
    pub id: String,
    /// What the decision is about (e.g. "database")
    #[serde(default)]
    pub topic: String,
    pub chosen_option: String,
    #[serde(default)]
    pub rationale: String,
    pub rejected_alternatives: Vec<RejectedAlternative>,
    /// URL backing the decision
    pub verification_source: String,
    /// When the source was checked (RFC 3339 or YYYY-MM-DD)
    pub verification_timestamp: String,
}

/// A pinned technology
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct TechStackEntry {
    pub name: String,
    /// Exact version, never "latest"
    pub version: String,
    /// URL confirming the version exists
    pub source: String,
}

/// Output from the design collaborator
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct DesignOutput {
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub tech_stack: Vec<TechStackEntry>,
}

pub struct DesignPhase;

impl PhaseContract for DesignPhase {
    type Input = DesignInput;
    type Output = DesignOutput;

    const PHASE: PhaseName = PhaseName::Design;

    fn validate_shape(output: &DesignOutput) -> Vec<String> {
        let mut check = ShapeCheck::new();
        check.require_non_empty("decisions", &output.decisions);
        for (i, decision) in output.decisions.iter().enumerate() {
            let field = |name: &str| format!("decisions[{}].{}", i, name);
            check.require_text(&field("id"), &decision.id);
            check.require_text(&field("chosen_option"), &decision.chosen_option);
            check.require_non_empty(
                &field("rejected_alternatives"),
                &decision.rejected_alternatives,
            );
            check.require_text(&field("verification_source"), &decision.verification_source);
            check.require_text(
                &field("verification_timestamp"),
                &decision.verification_timestamp,
            );
        }
        check.require_unique("decisions", output.decisions.iter().map(|d| d.id.as_str()));
        for (i, entry) in output.tech_stack.iter().enumerate() {
            check.require_text(&format!("tech_stack[{}].name", i), &entry.name);
            check.require_text(&format!("tech_stack[{}].version", i), &entry.version);
        }
        check.finish()
    }
}
