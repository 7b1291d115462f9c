//! # Pipeline State Machine
//!
//! Run and per-phase state. Phases move
//! `pending → running → (iterating ⇄ running)* → completed | failed`;
//! the run is `running` until every phase completes or one fails.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::LoopPair;
use super::events::new_id;
use crate::phases::PhaseName;

/// Status of the whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// Status of a single phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Running,
    /// Waiting to re-run after a later phase looped back
    Iterating,
    Completed,
    Failed,
}

/// State of one phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseState {
    pub phase: PhaseName,
    pub status: PhaseStatus,
    /// Last request payload
    pub input: Option<serde_json::Value>,
    /// Last accepted output
    pub output: Option<serde_json::Value>,
    /// Number of times the phase has started
    pub iteration: u32,
    /// Configured maximum, `None` = unlimited
    pub max_iterations: Option<u32>,
    /// Invoker attempts used by the last call
    pub attempts: u32,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl PhaseState {
    pub fn new(phase: PhaseName, max_iterations: Option<u32>) -> Self {
        Self {
            phase,
            status: PhaseStatus::Pending,
            input: None,
            output: None,
            iteration: 0,
            max_iterations,
            attempts: 0,
            error: None,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn begin(&mut self, input: serde_json::Value) {
        self.status = PhaseStatus::Running;
        self.iteration += 1;
        self.input = Some(input);
        self.error = None;
        self.started_at = Some(Utc::now());
        self.ended_at = None;
    }

    pub fn complete(&mut self, output: serde_json::Value, attempts: u32) {
        self.status = PhaseStatus::Completed;
        self.output = Some(output);
        self.attempts = attempts;
        self.ended_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = PhaseStatus::Failed;
        self.error = Some(error.into());
        self.ended_at = Some(Utc::now());
    }

    pub fn mark_iterating(&mut self) {
        self.status = PhaseStatus::Iterating;
    }
}

/// Snapshot of a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: String,
    pub status: RunStatus,
    pub current_phase: Option<PhaseName>,
    pub phases: BTreeMap<PhaseName, PhaseState>,
    /// Phase executions across all loops
    pub total_iterations: u32,
    pub validation_attempts: u32,
    /// Loop pairs that ran out of budget with their signal still raised
    pub soft_capped: Vec<LoopPair>,
    pub last_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// New run with every phase pending
    pub fn new(limits: impl Fn(PhaseName) -> Option<u32>) -> Self {
        let phases = PhaseName::ALL
            .iter()
            .map(|phase| (*phase, PhaseState::new(*phase, limits(*phase))))
            .collect();
        Self {
            id: new_id(),
            status: RunStatus::Running,
            current_phase: None,
            phases,
            total_iterations: 0,
            validation_attempts: 0,
            soft_capped: Vec::new(),
            last_error: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn phase(&self, phase: PhaseName) -> Option<&PhaseState> {
        self.phases.get(&phase)
    }

    pub fn phase_mut(&mut self, phase: PhaseName) -> &mut PhaseState {
        self.phases
            .entry(phase)
            .or_insert_with(|| PhaseState::new(phase, None))
    }

    pub fn complete(&mut self) {
        self.status = RunStatus::Completed;
        self.current_phase = None;
        self.ended_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = RunStatus::Failed;
        self.last_error = Some(error.into());
        self.ended_at = Some(Utc::now());
    }
}
