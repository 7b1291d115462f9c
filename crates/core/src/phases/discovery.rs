//! # Discovery Phase
//!
//! Turns the project description into a list of requirements.
//! Re-entered when the challenge phase asks for another pass.

use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::challenge::ChallengeOutput;
use super::{PhaseContract, PhaseName, ShapeCheck};

/// Input sent to the discovery collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryInput {
    /// The user's project description
    pub description: String,
    /// 1-based pass number within the discovery/challenge loop
    pub iteration: u32,
    /// Challenge output from the previous pass, when looping back
    #[serde(default)]
    pub previous_challenge: Option<ChallengeOutput>,
}

/// Requirement priority
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput, PartialEq, Eq)]
pub enum Priority {
    #[serde(rename = "must")]
    Must,
    #[serde(rename = "should")]
    Should,
    #[serde(rename = "could")]
    Could,
}

/// A single discovered requirement
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct Requirement {
    pub id: String,
    pub statement: String,
    pub priority: Priority,
}

/// Output from the discovery collaborator
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct DiscoveryOutput {
    /// One-paragraph restatement of the project
    pub summary: String,
    pub requirements: Vec<Requirement>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub open_questions: Vec<String>,
}

pub struct DiscoveryPhase;

impl PhaseContract for DiscoveryPhase {
    type Input = DiscoveryInput;
    type Output = DiscoveryOutput;

    const PHASE: PhaseName = PhaseName::Discovery;

    fn validate_shape(output: &DiscoveryOutput) -> Vec<String> {
        let mut check = ShapeCheck::new();
        check.require_text("summary", &output.summary);
        check.require_non_empty("requirements", &output.requirements);
        for (i, req) in output.requirements.iter().enumerate() {
            check.require_text(&format!("requirements[{}].id", i), &req.id);
            check.require_text(&format!("requirements[{}].statement", i), &req.statement);
        }
        check.require_unique(
            "requirements",
            output.requirements.iter().map(|r| r.id.as_str()),
        );
        check.finish()
    }
}
