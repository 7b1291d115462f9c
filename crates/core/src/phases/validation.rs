//! # Validation Phase
//!
//! The validation collaborator reviews the assembled artifact and returns
//! free-form notes. The pass/fail verdict does not come from the
//! collaborator: it comes from the [`QualityGate`](crate::quality::QualityGate),
//! which the orchestrator runs right after this call.

use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::decomposition::DecompositionOutput;
use super::design::DesignOutput;
use super::{PhaseContract, PhaseName, ShapeCheck};

/// Input sent to the validation collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationInput {
    pub description: String,
    /// 1-based validation attempt
    pub attempt: u32,
    pub design: DesignOutput,
    pub decomposition: DecompositionOutput,
}

/// A reviewer remark tied to a place in the artifact
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct ReviewNote {
    pub location: String,
    pub note: String,
}

/// Output from the validation collaborator
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct ValidationOutput {
    #[serde(default)]
    pub notes: Vec<ReviewNote>,
}

pub struct ValidationPhase;

impl PhaseContract for ValidationPhase {
    type Input = ValidationInput;
    type Output = ValidationOutput;

    const PHASE: PhaseName = PhaseName::Validation;

    fn validate_shape(output: &ValidationOutput) -> Vec<String> {
        let mut check = ShapeCheck::new();
        for (i, note) in output.notes.iter().enumerate() {
            check.require_text(&format!("notes[{}].note", i), &note.note);
        }
        check.finish()
    }
}
