//! # Decomposition Phase
//!
//! Breaks the design into stories, each a short list of file-level steps,
//! plus the schema sources those stories rely on.
//!
//! `non_atomic_detected` is the loop signal back to design; the optional
//! `non_atomic_story_ids` are forwarded untouched.

use std::collections::BTreeSet;

use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::design::DesignOutput;
use super::{PhaseContract, PhaseName, Rework, ShapeCheck};

/// Input sent to the decomposition collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecompositionInput {
    pub description: String,
    pub iteration: u32,
    pub design: DesignOutput,
    #[serde(default)]
    pub rework: Option<Rework>,
}

/// What a step does to its file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, LLMOutput, PartialEq, Eq)]
pub enum StepAction {
    #[serde(rename = "create")]
    Create,
    #[serde(rename = "modify")]
    Modify,
    #[serde(rename = "delete")]
    Delete,
}

/// One file-level change inside a story
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct Step {
    pub file_path: String,
    pub action: StepAction,
    /// Full code for the change
    #[serde(default)]
    pub code: String,
}

/// A unit of implementation work
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct Story {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub affected_files: Vec<String>,
    /// Stories that must land before this one
    #[serde(default)]
    pub blocked_by: Vec<String>,
    /// Stories waiting on this one
    #[serde(default)]
    pub blocks: Vec<String>,
}

impl Story {
    /// Distinct normalized paths touched by the story: declared affected
    /// files plus every step's file, sorted.
    pub fn distinct_files(&self) -> Vec<String> {
        self.affected_files
            .iter()
            .map(String::as_str)
            .chain(self.steps.iter().map(|s| s.file_path.as_str()))
            .map(normalize_path)
            .filter(|p| !p.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Canonical form used when comparing file paths
pub fn normalize_path(path: &str) -> String {
    let path = path.trim().replace('\\', "/");
    let mut path = path.as_str();
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    path.to_string()
}

/// A named schema source (type definitions, SQL, protobuf, ...)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct SchemaBlob {
    pub name: String,
    pub content: String,
}

/// Output from the decomposition collaborator
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct DecompositionOutput {
    pub stories: Vec<Story>,
    #[serde(default)]
    pub schemas: Vec<SchemaBlob>,
    /// Loop signal: the design cannot be split into atomic stories as-is
    #[serde(default)]
    pub non_atomic_detected: bool,
    #[serde(default)]
    pub non_atomic_story_ids: Vec<String>,
}

pub struct DecompositionPhase;

impl PhaseContract for DecompositionPhase {
    type Input = DecompositionInput;
    type Output = DecompositionOutput;

    const PHASE: PhaseName = PhaseName::Decomposition;

    fn validate_shape(output: &DecompositionOutput) -> Vec<String> {
        let mut check = ShapeCheck::new();
        check.require_non_empty("stories", &output.stories);
        for (i, story) in output.stories.iter().enumerate() {
            check.require_text(&format!("stories[{}].id", i), &story.id);
            check.require_non_empty(&format!("stories[{}].steps", i), &story.steps);
            for (j, step) in story.steps.iter().enumerate() {
                check.require_text(
                    &format!("stories[{}].steps[{}].file_path", i, j),
                    &step.file_path,
                );
            }
        }
        check.require_unique("stories", output.stories.iter().map(|s| s.id.as_str()));
        for (i, schema) in output.schemas.iter().enumerate() {
            check.require_text(&format!("schemas[{}].name", i), &schema.name);
        }
        for id in &output.non_atomic_story_ids {
            check.require(
                output.stories.iter().any(|s| &s.id == id),
                format!("non_atomic_story_ids references unknown story '{}'", id),
            );
        }
        check.finish()
    }
}
