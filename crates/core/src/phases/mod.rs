//! # Pipeline Phases
//!
//! Typed request/response contracts for the six phases of the pipeline.
//!
//! ## Phase Order
//!
//! ```text
//! Discovery ⟷ Challenge → Design ⟷ Decomposition → Validation → Synthesis
//!                           ↑__________________________|
//! ```
//!
//! Each phase file defines the phase's input, its output (what the
//! collaborator must return), and a [`PhaseContract`] implementation that
//! tells the [`AgentInvoker`](crate::pipeline::AgentInvoker) how to build the
//! request, parse the response and check its shape.

pub mod challenge;
pub mod decomposition;
pub mod design;
pub mod discovery;
pub mod synthesis;
pub mod validation;

use std::collections::HashSet;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::pipeline::error::AttemptError;
use crate::quality::ValidationIssue;

pub use challenge::{
    Challenge, ChallengeInput, ChallengeOutput, ChallengePhase, ChallengeSeverity,
};
pub use decomposition::{
    DecompositionInput, DecompositionOutput, DecompositionPhase, SchemaBlob, Step, StepAction,
    Story,
};
pub use design::{
    Decision, DesignInput, DesignOutput, DesignPhase, RejectedAlternative, TechStackEntry,
};
pub use discovery::{DiscoveryInput, DiscoveryOutput, DiscoveryPhase, Priority, Requirement};
pub use synthesis::{SynthesisInput, SynthesisOutput, SynthesisPhase, SynthesisSection};
pub use validation::{ReviewNote, ValidationInput, ValidationOutput, ValidationPhase};

/// Name of a pipeline phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseName {
    Discovery,
    Challenge,
    Design,
    Decomposition,
    Validation,
    Synthesis,
}

impl PhaseName {
    /// All phases in execution order
    pub const ALL: [PhaseName; 6] = [
        PhaseName::Discovery,
        PhaseName::Challenge,
        PhaseName::Design,
        PhaseName::Decomposition,
        PhaseName::Validation,
        PhaseName::Synthesis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseName::Discovery => "discovery",
            PhaseName::Challenge => "challenge",
            PhaseName::Design => "design",
            PhaseName::Decomposition => "decomposition",
            PhaseName::Validation => "validation",
            PhaseName::Synthesis => "synthesis",
        }
    }

    /// The phase that runs after this one in the fixed order
    pub fn next(&self) -> Option<PhaseName> {
        match self {
            PhaseName::Discovery => Some(PhaseName::Challenge),
            PhaseName::Challenge => Some(PhaseName::Design),
            PhaseName::Design => Some(PhaseName::Decomposition),
            PhaseName::Decomposition => Some(PhaseName::Validation),
            PhaseName::Validation => Some(PhaseName::Synthesis),
            PhaseName::Synthesis => None,
        }
    }
}

impl fmt::Display for PhaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Feedback handed back to an earlier phase when a later one loops back.
///
/// The orchestrator only forwards this; interpreting it is the
/// collaborator's job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rework {
    /// Phase that requested the rework
    pub requested_by: Option<PhaseName>,
    /// Stories singled out by the requesting phase
    #[serde(default)]
    pub story_ids: Vec<String>,
    /// Quality issues that triggered the rework
    #[serde(default)]
    pub issues: Vec<ValidationIssue>,
}

/// Phase-specific pieces injected into the shared retry loop.
///
/// Only `validate_shape` is mandatory; request building and response parsing
/// default to plain JSON.
pub trait PhaseContract: Send + Sync + 'static {
    type Input: Serialize + Send + Sync;
    type Output: Serialize + DeserializeOwned + Clone + Send + Sync;

    const PHASE: PhaseName;

    /// Build the request payload sent to the collaborator
    fn build_request(input: &Self::Input) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(input)
    }

    /// Parse the collaborator's raw response
    fn parse(raw: serde_json::Value) -> Result<Self::Output, AttemptError> {
        decode_response(raw)
    }

    /// Check required fields and non-empty collections. Returns one message
    /// per problem; empty means the output is accepted.
    fn validate_shape(output: &Self::Output) -> Vec<String>;
}

/// Decode a collaborator response into a typed output.
///
/// Collaborators may answer with a JSON value directly or with text that
/// contains JSON (possibly inside a fenced code block).
pub fn decode_response<T: DeserializeOwned>(raw: serde_json::Value) -> Result<T, AttemptError> {
    match raw {
        serde_json::Value::String(text) => {
            let json = extract_json(&text)
                .ok_or_else(|| AttemptError::Parse("response contains no JSON object".into()))?;
            serde_json::from_str(json).map_err(|e| AttemptError::Parse(e.to_string()))
        }
        value => serde_json::from_value(value).map_err(|e| AttemptError::Parse(e.to_string())),
    }
}

/// Locate the JSON object inside a text response
fn extract_json(text: &str) -> Option<&str> {
    let text = text.trim();
    if let Some(start) = text.find("```") {
        let after_fence = &text[start + 3..];
        // Skip the language tag line (```json)
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_fence[body_start..];
        if let Some(end) = body.find("```") {
            return Some(body[..end].trim());
        }
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Accumulates shape problems for a phase output
#[derive(Debug, Default)]
pub struct ShapeCheck {
    problems: Vec<String>,
}

impl ShapeCheck {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field must contain non-whitespace text
    pub fn require_text(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.problems.push(format!("{} must not be empty", field));
        }
    }

    /// Collection must have at least one element
    pub fn require_non_empty<T>(&mut self, field: &str, items: &[T]) {
        if items.is_empty() {
            self.problems
                .push(format!("{} must contain at least one entry", field));
        }
    }

    /// Identifiers must be unique within a collection
    pub fn require_unique<'a>(&mut self, field: &str, ids: impl IntoIterator<Item = &'a str>) {
        let mut seen = HashSet::new();
        for id in ids {
            if !seen.insert(id) {
                self.problems
                    .push(format!("{} contains duplicate id '{}'", field, id));
            }
        }
    }

    /// Arbitrary condition with its own message
    pub fn require(&mut self, condition: bool, message: impl Into<String>) {
        if !condition {
            self.problems.push(message.into());
        }
    }

    pub fn finish(self) -> Vec<String> {
        self.problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Named {
        name: String,
    }

    #[test]
    fn test_phase_order() {
        let mut phase = PhaseName::Discovery;
        let mut visited = vec![phase];
        while let Some(next) = phase.next() {
            visited.push(next);
            phase = next;
        }
        assert_eq!(visited, PhaseName::ALL.to_vec());
    }

    #[test]
    fn test_decode_plain_value() {
        let named: Named = decode_response(serde_json::json!({ "name": "a" })).unwrap();
        assert_eq!(named.name, "a");
    }

    #[test]
    fn test_decode_fenced_text() {
        let text = "Here you go:\n```json\n{\"name\": \"fenced\"}\n```\nDone.";
        let named: Named = decode_response(serde_json::Value::String(text.into())).unwrap();
        assert_eq!(named.name, "fenced");
    }

    #[test]
    fn test_decode_embedded_object() {
        let text = "Result: {\"name\": \"inline\"} (end)";
        let named: Named = decode_response(serde_json::Value::String(text.into())).unwrap();
        assert_eq!(named.name, "inline");
    }

    #[test]
    fn test_decode_rejects_prose() {
        let result: Result<Named, _> =
            decode_response(serde_json::Value::String("no json here".into()));
        assert!(matches!(result, Err(AttemptError::Parse(_))));
    }

    #[test]
    fn test_shape_check_collects_problems() {
        let mut check = ShapeCheck::new();
        check.require_text("summary", "  ");
        check.require_non_empty::<u8>("items", &[]);
        check.require_unique("ids", ["a", "b", "a"]);
        check.require(true, "never reported");
        let problems = check.finish();
        assert_eq!(problems.len(), 3);
        assert!(problems[2].contains("'a'"));
    }
}
