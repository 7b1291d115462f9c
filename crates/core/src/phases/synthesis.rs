//! # Synthesis Phase
//!
//! Terminal phase. Assembles the validated pieces into the final
//! specification document, which is the pipeline's result.

use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::decomposition::DecompositionOutput;
use super::design::DesignOutput;
use super::discovery::DiscoveryOutput;
use super::{PhaseContract, PhaseName, ShapeCheck};
use crate::quality::QualityReport;

/// Input sent to the synthesis collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisInput {
    pub description: String,
    pub discovery: DiscoveryOutput,
    pub design: DesignOutput,
    pub decomposition: DecompositionOutput,
    /// Story ids in dependency order
    pub story_order: Vec<String>,
    /// The passing quality report
    pub quality: QualityReport,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct SynthesisSection {
    pub heading: String,
    pub body: String,
}

/// The finished specification
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct SynthesisOutput {
    pub title: String,
    pub summary: String,
    pub sections: Vec<SynthesisSection>,
    /// Story ids in the order they should be implemented
    #[serde(default)]
    pub story_order: Vec<String>,
}

pub struct SynthesisPhase;

impl PhaseContract for SynthesisPhase {
    type Input = SynthesisInput;
    type Output = SynthesisOutput;

    const PHASE: PhaseName = PhaseName::Synthesis;

    fn validate_shape(output: &SynthesisOutput) -> Vec<String> {
        let mut check = ShapeCheck::new();
        check.require_text("title", &output.title);
        check.require_text("summary", &output.summary);
        check.require_non_empty("sections", &output.sections);
        for (i, section) in output.sections.iter().enumerate() {
            check.require_text(&format!("sections[{}].heading", i), &section.heading);
        }
        check.finish()
    }
}
