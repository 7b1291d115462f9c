//! # Challenge Phase
//!
//! Reviews discovery output and may request another discovery pass via
//! `needs_discovery_loop`. The orchestrator reads only that flag.

use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::discovery::DiscoveryOutput;
use super::{PhaseContract, PhaseName, ShapeCheck};

/// Input sent to the challenge collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeInput {
    pub description: String,
    pub iteration: u32,
    pub discovery: DiscoveryOutput,
}

/// Severity of a challenge
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput, PartialEq, Eq)]
pub enum ChallengeSeverity {
    #[serde(rename = "blocking")]
    Blocking,
    #[serde(rename = "major")]
    Major,
    #[serde(rename = "minor")]
    Minor,
}

/// A single concern raised against the discovered requirements
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct Challenge {
    /// Requirement id or topic the concern targets
    pub target: String,
    pub concern: String,
    pub severity: ChallengeSeverity,
}

/// Output from the challenge collaborator
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct ChallengeOutput {
    #[serde(default)]
    pub challenges: Vec<Challenge>,
    /// Loop signal: re-run discovery before moving on
    #[serde(default)]
    pub needs_discovery_loop: bool,
    /// Free-form notes for the next discovery pass
    #[serde(default)]
    pub feedback: Vec<String>,
}

pub struct ChallengePhase;

impl PhaseContract for ChallengePhase {
    type Input = ChallengeInput;
    type Output = ChallengeOutput;

    const PHASE: PhaseName = PhaseName::Challenge;

    fn validate_shape(output: &ChallengeOutput) -> Vec<String> {
        let mut check = ShapeCheck::new();
        for (i, challenge) in output.challenges.iter().enumerate() {
            check.require_text(&format!("challenges[{}].target", i), &challenge.target);
            check.require_text(&format!("challenges[{}].concern", i), &challenge.concern);
        }
        check.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_loop_request_is_accepted() {
        let output = ChallengePhase::parse(serde_json::json!({ "needs_discovery_loop": true }))
            .unwrap();
        assert!(output.needs_discovery_loop);
        assert!(ChallengePhase::validate_shape(&output).is_empty());
    }

    #[test]
    fn test_severity_uses_lowercase_wire_names() {
        let output = ChallengePhase::parse(serde_json::json!({
            "challenges": [
                { "target": "R1", "concern": "a", "severity": "blocking" },
                { "target": "R2", "concern": "b", "severity": "major" },
                { "target": "general", "concern": "c", "severity": "minor" }
            ]
        }))
        .unwrap();
        let severities: Vec<ChallengeSeverity> =
            output.challenges.iter().map(|c| c.severity.clone()).collect();
        assert_eq!(
            severities,
            vec![
                ChallengeSeverity::Blocking,
                ChallengeSeverity::Major,
                ChallengeSeverity::Minor
            ]
        );
    }

    #[test]
    fn test_clean_pass_is_accepted() {
        let output: ChallengeOutput = ChallengePhase::parse(serde_json::json!({})).unwrap();
        assert!(!output.needs_discovery_loop);
        assert!(ChallengePhase::validate_shape(&output).is_empty());
    }
}
