//! # Phase Orchestrator
//!
//! Drives one run through the fixed phase order:
//!
//! ```text
//! discovery ⟷ challenge → design ⟷ decomposition → validation → synthesis
//! ```
//!
//! - Discovery/challenge and design/decomposition loop while the later
//!   phase raises its loop signal and budget remains. A spent budget is a
//!   soft cap: the run continues and the final report carries a warning
//!   (or the run fails when `strict_loop_budgets` is set).
//! - Validation restarts from the phase implicated by the quality report
//!   until the gate passes or `validation_max` attempts have been made.
//! - Synthesis is terminal; its output is the run's result.
//!
//! Cancellation is cooperative and checked before each phase starts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::config::{LoopPair, PipelineConfig};
use super::error::{InvokeError, PipelineError};
use super::events::{ChannelListener, EventBus, EventListener, PipelineEvent, PipelineEventKind};
use super::invoker::AgentInvoker;
use super::state::PipelineRun;
use crate::agents::Collaborator;
use crate::phases::{
    ChallengeInput, ChallengeOutput, ChallengePhase, DecompositionInput, DecompositionOutput,
    DecompositionPhase, DesignInput, DesignOutput, DesignPhase, DiscoveryInput, DiscoveryOutput,
    DiscoveryPhase, PhaseContract, PhaseName, Rework, SynthesisInput, SynthesisOutput,
    SynthesisPhase, ValidationInput, ValidationPhase,
};
use crate::quality::{Artifact, DependencyGraph, QualityGate, QualityReport, ValidationIssue};

/// Cooperative cancellation flag, shareable across tasks
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; takes effect before the next phase starts
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Restart point for a design/decomposition pass
enum Entry {
    /// Run design (with optional feedback), then decomposition
    Design(Option<Rework>),
    /// Keep the accepted design and re-run decomposition
    Decomposition(DesignOutput, Rework),
}

/// Runs one pipeline
pub struct Orchestrator {
    config: PipelineConfig,
    invoker: AgentInvoker,
    gate: QualityGate,
    run: PipelineRun,
    bus: EventBus,
    cancel: CancelHandle,
    last_report: Option<QualityReport>,
    started: bool,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        collaborator: Arc<dyn Collaborator>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let iterations = config.iterations.clone();
        let run = PipelineRun::new(|phase| match phase {
            PhaseName::Discovery | PhaseName::Challenge => {
                Some(iterations.discovery_challenge_max)
            }
            PhaseName::Design | PhaseName::Decomposition => {
                Some(iterations.design_decomposition_max)
            }
            PhaseName::Validation => iterations.validation_max.as_option(),
            PhaseName::Synthesis => Some(1),
        });

        Ok(Self {
            invoker: AgentInvoker::new(collaborator, config.retry.clone()),
            gate: QualityGate::new(&config.quality),
            config,
            run,
            bus: EventBus::new(),
            cancel: CancelHandle::new(),
            last_report: None,
            started: false,
        })
    }

    /// Replace the standard validators
    pub fn with_quality_gate(mut self, gate: QualityGate) -> Self {
        self.gate = gate;
        self
    }

    /// Forward every event to a tokio channel
    pub fn with_event_channel(mut self, tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.bus.subscribe(Box::new(ChannelListener::new(tx)));
        self
    }

    /// Use an externally created cancel handle
    pub fn with_cancel_handle(mut self, handle: CancelHandle) -> Self {
        self.cancel = handle;
        self
    }

    pub fn subscribe(&mut self, listener: impl EventListener + 'static) {
        self.bus.subscribe(Box::new(listener));
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Snapshot of the run
    pub fn state(&self) -> PipelineRun {
        self.run.clone()
    }

    pub fn run_id(&self) -> &str {
        &self.run.id
    }

    /// Every event emitted so far
    pub fn events(&self) -> &[PipelineEvent] {
        self.bus.history()
    }

    /// Most recent quality report
    pub fn last_report(&self) -> Option<&QualityReport> {
        self.last_report.as_ref()
    }

    /// Run the pipeline to completion
    #[tracing::instrument(skip(self, description), fields(run_id = %self.run.id))]
    pub async fn start(&mut self, description: &str) -> Result<SynthesisOutput, PipelineError> {
        if self.started {
            return Err(PipelineError::AlreadyStarted(self.run.status));
        }
        self.started = true;

        tracing::info!("Starting pipeline");
        let event = self
            .event(PipelineEventKind::PipelineStarted, None)
            .with_detail("description", description);
        self.bus.emit(event);

        match self.drive(description).await {
            Ok(output) => {
                self.run.complete();
                tracing::info!(
                    iterations = self.run.total_iterations,
                    validation_attempts = self.run.validation_attempts,
                    "Pipeline completed"
                );
                let event = self
                    .event(PipelineEventKind::PipelineCompleted, None)
                    .with_detail("total_iterations", self.run.total_iterations)
                    .with_detail("validation_attempts", self.run.validation_attempts);
                self.bus.emit(event);
                Ok(output)
            }
            Err(err) => {
                tracing::warn!(phase = ?self.run.current_phase, "Pipeline failed: {}", err);
                self.run.fail(err.to_string());
                let event = self
                    .event(PipelineEventKind::PipelineFailed, self.run.current_phase)
                    .with_detail("error", err.to_string());
                self.bus.emit(event);
                Err(err)
            }
        }
    }

    async fn drive(&mut self, description: &str) -> Result<SynthesisOutput, PipelineError> {
        let (discovery, challenge) = self.discovery_challenge_loop(description).await?;

        let mut entry = Entry::Design(None);
        let (design, decomposition, report) = loop {
            let (design, decomposition) = self
                .design_decomposition_loop(description, &discovery, &challenge, entry)
                .await?;

            let report = self.validate(description, &design, &decomposition).await?;
            if report.passes {
                break (design, decomposition, report);
            }

            let attempts = self.run.validation_attempts;
            if !self.config.iterations.validation_max.allows(attempts) {
                let err = PipelineError::ValidationBudgetExhausted {
                    attempts,
                    confidence: report.confidence,
                };
                self.run.phase_mut(PhaseName::Validation).fail(err.to_string());
                return Err(err);
            }

            let target = report.restart_from.unwrap_or(PhaseName::Decomposition);
            let rework = Rework {
                requested_by: Some(PhaseName::Validation),
                story_ids: report.implicated_stories(),
                issues: report.errors().cloned().collect(),
            };
            tracing::info!(
                confidence = report.confidence,
                attempt = attempts,
                target = %target,
                "Quality gate not passed, restarting"
            );
            self.loop_back(PhaseName::Validation, target, "quality_gate_failed");

            entry = if target == PhaseName::Design {
                Entry::Design(Some(rework))
            } else {
                Entry::Decomposition(design, rework)
            };
        };

        self.synthesize(description, discovery, design, decomposition, report)
            .await
    }

    async fn discovery_challenge_loop(
        &mut self,
        description: &str,
    ) -> Result<(DiscoveryOutput, ChallengeOutput), PipelineError> {
        let max = self.config.iterations.discovery_challenge_max;
        let mut previous_challenge = None;

        for round in 1..=max {
            if round > 1 {
                self.iteration_started(LoopPair::DiscoveryChallenge, round);
            }

            let discovery = self
                .run_phase::<DiscoveryPhase>(&DiscoveryInput {
                    description: description.to_string(),
                    iteration: round,
                    previous_challenge: previous_challenge.take(),
                })
                .await?;

            let challenge = self
                .run_phase::<ChallengePhase>(&ChallengeInput {
                    description: description.to_string(),
                    iteration: round,
                    discovery: discovery.clone(),
                })
                .await?;

            if !challenge.needs_discovery_loop {
                return Ok((discovery, challenge));
            }
            if round == max {
                self.budget_spent(LoopPair::DiscoveryChallenge, max)?;
                return Ok((discovery, challenge));
            }

            self.loop_back(PhaseName::Challenge, PhaseName::Discovery, "needs_discovery_loop");
            previous_challenge = Some(challenge);
        }

        // max >= 1 is enforced by config validation
        Err(PipelineError::InvalidConfig(
            "discovery_challenge_max must be at least 1".into(),
        ))
    }

    async fn design_decomposition_loop(
        &mut self,
        description: &str,
        discovery: &DiscoveryOutput,
        challenge: &ChallengeOutput,
        entry: Entry,
    ) -> Result<(DesignOutput, DecompositionOutput), PipelineError> {
        let max = self.config.iterations.design_decomposition_max;
        let (mut kept_design, mut design_rework, mut decomposition_rework) = match entry {
            Entry::Design(rework) => (None, rework, None),
            Entry::Decomposition(design, rework) => (Some(design), None, Some(rework)),
        };

        for round in 1..=max {
            if round > 1 {
                self.iteration_started(LoopPair::DesignDecomposition, round);
            }

            let design = match kept_design.take() {
                Some(design) => design,
                None => {
                    self.run_phase::<DesignPhase>(&DesignInput {
                        description: description.to_string(),
                        iteration: round,
                        discovery: discovery.clone(),
                        challenge: challenge.clone(),
                        rework: design_rework.take(),
                    })
                    .await?
                }
            };

            let decomposition = self
                .run_phase::<DecompositionPhase>(&DecompositionInput {
                    description: description.to_string(),
                    iteration: round,
                    design: design.clone(),
                    rework: decomposition_rework.take(),
                })
                .await?;

            if !decomposition.non_atomic_detected {
                return Ok((design, decomposition));
            }
            if round == max {
                self.budget_spent(LoopPair::DesignDecomposition, max)?;
                return Ok((design, decomposition));
            }

            self.loop_back(PhaseName::Decomposition, PhaseName::Design, "non_atomic_detected");
            design_rework = Some(Rework {
                requested_by: Some(PhaseName::Decomposition),
                story_ids: decomposition.non_atomic_story_ids.clone(),
                issues: Vec::new(),
            });
        }

        Err(PipelineError::InvalidConfig(
            "design_decomposition_max must be at least 1".into(),
        ))
    }

    /// Run the validation collaborator, then the quality gate
    async fn validate(
        &mut self,
        description: &str,
        design: &DesignOutput,
        decomposition: &DecompositionOutput,
    ) -> Result<QualityReport, PipelineError> {
        let attempt = self.run.validation_attempts + 1;
        let review = self
            .run_phase::<ValidationPhase>(&ValidationInput {
                description: description.to_string(),
                attempt,
                design: design.clone(),
                decomposition: decomposition.clone(),
            })
            .await?;
        self.run.validation_attempts = attempt;

        let mut report = self.gate.evaluate(&Artifact::new(design, decomposition));
        report
            .advisories
            .extend(self.run.soft_capped.iter().map(|pair| {
                ValidationIssue::warning(
                    "loop_budget",
                    format!("{} budget exhausted with its loop signal still raised", pair),
                    pair.to_string(),
                )
            }));
        report.advisories.extend(
            review
                .notes
                .iter()
                .map(|n| ValidationIssue::warning("review", &n.note, &n.location)),
        );

        tracing::info!(
            attempt,
            confidence = report.confidence,
            passes = report.passes,
            "Quality gate evaluated"
        );
        let event = self
            .event(PipelineEventKind::ValidationReport, Some(PhaseName::Validation))
            .with_detail("attempt", attempt)
            .with_detail("confidence", report.confidence)
            .with_detail("passes", report.passes)
            .with_detail(
                "restart_from",
                report.restart_from.map(|p| p.as_str()).unwrap_or_default(),
            );
        self.bus.emit(event);

        self.last_report = Some(report.clone());
        Ok(report)
    }

    async fn synthesize(
        &mut self,
        description: &str,
        discovery: DiscoveryOutput,
        design: DesignOutput,
        decomposition: DecompositionOutput,
        quality: QualityReport,
    ) -> Result<SynthesisOutput, PipelineError> {
        let story_order = DependencyGraph::from_stories(&decomposition.stories)
            .topological_order()
            .unwrap_or_else(|| decomposition.stories.iter().map(|s| s.id.clone()).collect());

        let mut output = self
            .run_phase::<SynthesisPhase>(&SynthesisInput {
                description: description.to_string(),
                discovery,
                design,
                decomposition,
                story_order: story_order.clone(),
                quality,
            })
            .await?;

        if output.story_order.is_empty() {
            output.story_order = story_order;
        }
        Ok(output)
    }

    /// Execute one phase through the invoker, tracking state and events
    async fn run_phase<P: PhaseContract>(
        &mut self,
        input: &P::Input,
    ) -> Result<P::Output, PipelineError> {
        if self.cancel.is_cancelled() {
            tracing::info!(phase = %P::PHASE, "Run cancelled");
            return Err(PipelineError::Cancelled { before: P::PHASE });
        }

        let payload = P::build_request(input)?;
        self.run.current_phase = Some(P::PHASE);
        self.run.total_iterations += 1;
        let iteration = {
            let state = self.run.phase_mut(P::PHASE);
            state.begin(payload);
            state.iteration
        };

        tracing::debug!(phase = %P::PHASE, iteration, "Phase started");
        let event = self
            .event(PipelineEventKind::PhaseStarted, Some(P::PHASE))
            .with_detail("iteration", iteration);
        self.bus.emit(event);

        match self.invoker.invoke::<P>(&self.run.id, iteration, input).await {
            Ok(invocation) => {
                let value = serde_json::to_value(&invocation.output)?;
                self.run
                    .phase_mut(P::PHASE)
                    .complete(value, invocation.attempts);
                let event = self
                    .event(PipelineEventKind::PhaseCompleted, Some(P::PHASE))
                    .with_detail("iteration", iteration)
                    .with_detail("attempts", invocation.attempts);
                self.bus.emit(event);
                Ok(invocation.output)
            }
            Err(err) => {
                let phase = err.phase();
                let state = self.run.phase_mut(phase);
                state.fail(err.to_string());
                if let InvokeError::Exhausted { attempts, .. } = &err {
                    state.attempts = *attempts;
                }
                let event = self
                    .event(PipelineEventKind::PhaseFailed, Some(phase))
                    .with_detail("iteration", iteration)
                    .with_detail("max_attempts", self.invoker.policy().max_attempts())
                    .with_detail("error", err.to_string());
                self.bus.emit(event);
                Err(err.into())
            }
        }
    }

    /// A loop pair ran out of budget with its signal still raised
    fn budget_spent(&mut self, pair: LoopPair, iterations: u32) -> Result<(), PipelineError> {
        if self.config.strict_loop_budgets {
            return Err(PipelineError::LoopBudgetExhausted { pair, iterations });
        }
        tracing::warn!(pair = %pair, iterations, "Loop budget exhausted, continuing");
        if !self.run.soft_capped.contains(&pair) {
            self.run.soft_capped.push(pair);
        }
        Ok(())
    }

    /// Record a jump from `from` back to `to` and mark the phases in between
    fn loop_back(&mut self, from: PhaseName, to: PhaseName, reason: &str) {
        for phase in PhaseName::ALL {
            if phase >= to && phase <= from {
                self.run.phase_mut(phase).mark_iterating();
            }
        }
        tracing::debug!(from = %from, to = %to, reason, "Looping back");
        let event = self
            .event(PipelineEventKind::LoopBack, Some(from))
            .with_detail("target", to.as_str())
            .with_detail("reason", reason);
        self.bus.emit(event);
    }

    fn iteration_started(&mut self, pair: LoopPair, round: u32) {
        let phase = match pair {
            LoopPair::DiscoveryChallenge => PhaseName::Discovery,
            LoopPair::DesignDecomposition => PhaseName::Design,
        };
        let event = self
            .event(PipelineEventKind::IterationStarted, Some(phase))
            .with_detail("pair", pair.to_string())
            .with_detail("round", round);
        self.bus.emit(event);
    }

    fn event(&self, kind: PipelineEventKind, phase: Option<PhaseName>) -> PipelineEvent {
        match phase {
            Some(phase) => PipelineEvent::for_phase(kind, &self.run.id, phase),
            None => PipelineEvent::new(kind, &self.run.id),
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("run_id", &self.run.id)
            .field("status", &self.run.status)
            .field("current_phase", &self.run.current_phase)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::config::{IterationLimit, RetryPolicy};
    use crate::pipeline::state::{PhaseStatus, RunStatus};
    use crate::quality::{CategoryReport, QualityCategory, Validator};
    use crate::testing::{challenge_json, decomposition_json, design_json, ScriptedCollaborator};
    use std::sync::Mutex;

    fn config() -> PipelineConfig {
        PipelineConfig {
            retry: RetryPolicy::immediate(1),
            ..PipelineConfig::default()
        }
    }

    fn orchestrator(
        config: PipelineConfig,
        collaborator: &Arc<ScriptedCollaborator>,
    ) -> Orchestrator {
        Orchestrator::new(config, collaborator.clone()).unwrap()
    }

    fn kinds(orchestrator: &Orchestrator) -> Vec<PipelineEventKind> {
        orchestrator.events().iter().map(|e| e.kind).collect()
    }

    fn loop_backs(orchestrator: &Orchestrator) -> Vec<(Option<PhaseName>, String)> {
        orchestrator
            .events()
            .iter()
            .filter(|e| e.kind == PipelineEventKind::LoopBack)
            .map(|e| {
                let target = e.detail["target"].as_str().unwrap_or_default().to_string();
                (e.phase, target)
            })
            .collect()
    }

    /// Validator that never passes; blames design
    struct NeverPasses;

    impl Validator for NeverPasses {
        fn category(&self) -> QualityCategory {
            QualityCategory::Citation
        }

        fn validate(&self, _artifact: &Artifact<'_>) -> CategoryReport {
            CategoryReport::new(
                QualityCategory::Citation,
                0,
                vec![ValidationIssue::error("citation", "never good enough", "decision D1")],
            )
        }
    }

    #[tokio::test]
    async fn test_happy_path() {
        let collaborator = Arc::new(ScriptedCollaborator::passing());
        let mut orchestrator = orchestrator(config(), &collaborator);

        let output = orchestrator.start("A task tracker").await.unwrap();

        assert_eq!(output.title, "Task Tracker Specification");
        assert_eq!(output.story_order, vec!["S1", "S2"]);

        let state = orchestrator.state();
        assert_eq!(state.status, RunStatus::Completed);
        assert_eq!(state.total_iterations, 6);
        assert_eq!(state.validation_attempts, 1);
        assert!(state.soft_capped.is_empty());
        assert!(state
            .phases
            .values()
            .all(|p| p.status == PhaseStatus::Completed && p.attempts == 1));

        let kinds = kinds(&orchestrator);
        assert_eq!(kinds.first(), Some(&PipelineEventKind::PipelineStarted));
        assert_eq!(kinds.last(), Some(&PipelineEventKind::PipelineCompleted));
        assert!(kinds.contains(&PipelineEventKind::ValidationReport));
        assert!(!kinds.contains(&PipelineEventKind::LoopBack));

        let report = orchestrator.last_report().unwrap();
        assert!(report.passes);
        assert!(report.advisories.is_empty());
    }

    #[tokio::test]
    async fn test_synthesis_receives_dependency_order() {
        let collaborator = Arc::new(ScriptedCollaborator::passing());
        let mut orchestrator = orchestrator(config(), &collaborator);
        orchestrator.start("A task tracker").await.unwrap();

        let synthesis = collaborator
            .requests()
            .into_iter()
            .find(|r| r.phase == PhaseName::Synthesis)
            .unwrap();
        assert_eq!(synthesis.payload["story_order"], serde_json::json!(["S1", "S2"]));
        assert_eq!(synthesis.payload["quality"]["confidence"], 100);
    }

    #[tokio::test]
    async fn test_agent_failure_after_retries_fails_run() {
        let collaborator = Arc::new(
            ScriptedCollaborator::passing()
                .with_handler(PhaseName::Design, |_| anyhow::bail!("search service down")),
        );
        let mut config = config();
        config.retry = RetryPolicy::immediate(2);
        let mut orchestrator = orchestrator(config, &collaborator);

        let err = orchestrator.start("A task tracker").await.unwrap_err();

        assert!(matches!(err, PipelineError::Agent(_)));
        assert_eq!(collaborator.calls(PhaseName::Design), 3);
        assert_eq!(collaborator.calls(PhaseName::Decomposition), 0);

        let state = orchestrator.state();
        assert_eq!(state.status, RunStatus::Failed);
        assert!(state
            .last_error
            .as_deref()
            .unwrap()
            .contains("search service down"));
        let design = state.phase(PhaseName::Design).unwrap();
        assert_eq!(design.status, PhaseStatus::Failed);
        assert_eq!(design.attempts, 3);
        assert_eq!(
            state.phase(PhaseName::Decomposition).unwrap().status,
            PhaseStatus::Pending
        );
        assert_eq!(
            kinds(&orchestrator).last(),
            Some(&PipelineEventKind::PipelineFailed)
        );
        let failed = orchestrator
            .events()
            .iter()
            .find(|e| e.kind == PipelineEventKind::PhaseFailed)
            .unwrap();
        assert_eq!(failed.phase, Some(PhaseName::Design));
        assert_eq!(failed.detail["max_attempts"], 3);
    }

    #[tokio::test]
    async fn test_discovery_soft_cap() {
        let collaborator = Arc::new(
            ScriptedCollaborator::passing().replace(PhaseName::Challenge, challenge_json(true)),
        );
        let mut orchestrator = orchestrator(config(), &collaborator);

        orchestrator.start("A task tracker").await.unwrap();

        assert_eq!(collaborator.calls(PhaseName::Discovery), 3);
        assert_eq!(collaborator.calls(PhaseName::Challenge), 3);

        let state = orchestrator.state();
        assert_eq!(state.status, RunStatus::Completed);
        assert_eq!(state.soft_capped, vec![LoopPair::DiscoveryChallenge]);
        assert_eq!(state.phase(PhaseName::Discovery).unwrap().iteration, 3);

        let report = orchestrator.last_report().unwrap();
        assert!(report.passes);
        assert_eq!(report.advisories.len(), 1);
        assert_eq!(report.advisories[0].category, "loop_budget");

        // Challenge feedback is threaded into the next discovery round
        let second = collaborator
            .requests()
            .into_iter()
            .filter(|r| r.phase == PhaseName::Discovery)
            .nth(1)
            .unwrap();
        assert_eq!(second.iteration, 2);
        assert_eq!(
            second.payload["previous_challenge"]["feedback"][0],
            "Clarify list size limits"
        );
        assert_eq!(loop_backs(&orchestrator).len(), 2);
    }

    #[tokio::test]
    async fn test_bare_loop_signal_soft_caps() {
        let collaborator = Arc::new(ScriptedCollaborator::passing().replace(
            PhaseName::Challenge,
            serde_json::json!({ "needs_discovery_loop": true }),
        ));
        let mut orchestrator = orchestrator(config(), &collaborator);

        let output = orchestrator.start("A task tracker").await;

        assert!(output.is_ok());
        assert_eq!(collaborator.calls(PhaseName::Discovery), 3);
        assert_eq!(collaborator.calls(PhaseName::Challenge), 3);
        let state = orchestrator.state();
        assert_eq!(state.status, RunStatus::Completed);
        assert_eq!(state.soft_capped, vec![LoopPair::DiscoveryChallenge]);
        assert!(state
            .phases
            .values()
            .all(|p| p.attempts == 1));
    }

    #[tokio::test]
    async fn test_strict_loop_budget_fails() {
        let collaborator = Arc::new(
            ScriptedCollaborator::passing().replace(PhaseName::Challenge, challenge_json(true)),
        );
        let mut config = config();
        config.strict_loop_budgets = true;
        config.iterations.discovery_challenge_max = 2;
        let mut orchestrator = orchestrator(config, &collaborator);

        let err = orchestrator.start("A task tracker").await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::LoopBudgetExhausted {
                pair: LoopPair::DiscoveryChallenge,
                iterations: 2
            }
        ));
        assert_eq!(collaborator.calls(PhaseName::Discovery), 2);
        assert_eq!(collaborator.calls(PhaseName::Design), 0);
        assert_eq!(orchestrator.state().status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_non_atomic_loop_reruns_design_with_story_ids() {
        let mut non_atomic = decomposition_json();
        non_atomic["non_atomic_detected"] = serde_json::json!(true);
        non_atomic["non_atomic_story_ids"] = serde_json::json!(["S1"]);
        let collaborator = Arc::new(
            ScriptedCollaborator::passing()
                .replace(PhaseName::Decomposition, non_atomic)
                .respond(PhaseName::Decomposition, decomposition_json()),
        );
        let mut orchestrator = orchestrator(config(), &collaborator);

        orchestrator.start("A task tracker").await.unwrap();

        assert_eq!(collaborator.calls(PhaseName::Design), 2);
        assert_eq!(collaborator.calls(PhaseName::Decomposition), 2);
        let second_design = collaborator
            .requests()
            .into_iter()
            .filter(|r| r.phase == PhaseName::Design)
            .nth(1)
            .unwrap();
        assert_eq!(
            second_design.payload["rework"]["requested_by"],
            "decomposition"
        );
        assert_eq!(
            second_design.payload["rework"]["story_ids"],
            serde_json::json!(["S1"])
        );
        assert_eq!(
            loop_backs(&orchestrator),
            vec![(Some(PhaseName::Decomposition), "design".to_string())]
        );
    }

    #[tokio::test]
    async fn test_citation_failure_restarts_from_design() {
        let mut bad_design = design_json();
        bad_design["decisions"][0]["verification_source"] = serde_json::json!("not-a-url");
        let collaborator = Arc::new(
            ScriptedCollaborator::passing()
                .replace(PhaseName::Design, bad_design)
                .respond(PhaseName::Design, design_json()),
        );
        let mut orchestrator = orchestrator(config(), &collaborator);

        orchestrator.start("A task tracker").await.unwrap();

        assert_eq!(collaborator.calls(PhaseName::Design), 2);
        assert_eq!(collaborator.calls(PhaseName::Decomposition), 2);
        assert_eq!(collaborator.calls(PhaseName::Validation), 2);
        assert_eq!(orchestrator.state().validation_attempts, 2);
        assert_eq!(
            loop_backs(&orchestrator),
            vec![(Some(PhaseName::Validation), "design".to_string())]
        );

        let second_design = collaborator
            .requests()
            .into_iter()
            .filter(|r| r.phase == PhaseName::Design)
            .nth(1)
            .unwrap();
        assert_eq!(second_design.payload["rework"]["requested_by"], "validation");
        assert_eq!(
            second_design.payload["rework"]["issues"][0]["category"],
            "citation"
        );
    }

    #[tokio::test]
    async fn test_atomic_failure_restarts_from_decomposition() {
        let mut oversized = decomposition_json();
        oversized["stories"][0]["affected_files"] =
            serde_json::json!(["src/a.ts", "src/b.ts", "src/c.ts", "src/task.ts"]);
        let collaborator = Arc::new(
            ScriptedCollaborator::passing()
                .replace(PhaseName::Decomposition, oversized)
                .respond(PhaseName::Decomposition, decomposition_json()),
        );
        let mut orchestrator = orchestrator(config(), &collaborator);

        orchestrator.start("A task tracker").await.unwrap();

        assert_eq!(collaborator.calls(PhaseName::Design), 1);
        assert_eq!(collaborator.calls(PhaseName::Decomposition), 2);

        let second = collaborator
            .requests()
            .into_iter()
            .filter(|r| r.phase == PhaseName::Decomposition)
            .nth(1)
            .unwrap();
        assert_eq!(
            second.payload["rework"]["story_ids"],
            serde_json::json!(["S1"])
        );
    }

    #[tokio::test]
    async fn test_validation_cap_fails_after_exact_attempts() {
        let collaborator = Arc::new(ScriptedCollaborator::passing());
        let mut config = config();
        config.iterations.validation_max = IterationLimit::Max(3);
        let mut orchestrator = orchestrator(config, &collaborator)
            .with_quality_gate(QualityGate::with_validators(vec![Box::new(NeverPasses)]));

        let err = orchestrator.start("A task tracker").await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::ValidationBudgetExhausted {
                attempts: 3,
                confidence: 0
            }
        ));
        let state = orchestrator.state();
        assert_eq!(state.status, RunStatus::Failed);
        assert_eq!(state.validation_attempts, 3);
        assert_eq!(collaborator.calls(PhaseName::Validation), 3);
        assert_eq!(collaborator.calls(PhaseName::Synthesis), 0);
        assert_eq!(
            state.phase(PhaseName::Validation).unwrap().status,
            PhaseStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_review_notes_become_advisories() {
        let collaborator = Arc::new(ScriptedCollaborator::passing().replace(
            PhaseName::Validation,
            serde_json::json!({ "notes": [{ "location": "story S2", "note": "Consider pagination" }] }),
        ));
        let mut orchestrator = orchestrator(config(), &collaborator);

        orchestrator.start("A task tracker").await.unwrap();

        let report = orchestrator.last_report().unwrap();
        assert!(report.passes);
        assert_eq!(report.advisories.len(), 1);
        assert_eq!(report.advisories[0].category, "review");
        assert_eq!(report.advisories[0].location, "story S2");
    }

    #[tokio::test]
    async fn test_cancel_before_next_phase() {
        let handle = CancelHandle::new();
        let trigger = handle.clone();
        let collaborator = Arc::new(ScriptedCollaborator::passing().with_handler(
            PhaseName::Design,
            move |_| {
                trigger.cancel();
                Ok(design_json())
            },
        ));
        let mut orchestrator = orchestrator(config(), &collaborator).with_cancel_handle(handle);

        let err = orchestrator.start("A task tracker").await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Cancelled {
                before: PhaseName::Decomposition
            }
        ));
        let state = orchestrator.state();
        assert_eq!(state.status, RunStatus::Failed);
        assert_eq!(
            state.phase(PhaseName::Design).unwrap().status,
            PhaseStatus::Completed
        );
        assert_eq!(
            state.phase(PhaseName::Decomposition).unwrap().status,
            PhaseStatus::Pending
        );
        assert_eq!(collaborator.calls(PhaseName::Decomposition), 0);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let collaborator = Arc::new(ScriptedCollaborator::passing());
        let mut orchestrator = orchestrator(config(), &collaborator);
        orchestrator.start("A task tracker").await.unwrap();

        let err = orchestrator.start("again").await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::AlreadyStarted(RunStatus::Completed)
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = config();
        config.iterations.min_confidence = 95;
        let result = Orchestrator::new(config, Arc::new(ScriptedCollaborator::passing()));
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_listener_failures_do_not_stop_the_run() {
        let collaborator = Arc::new(ScriptedCollaborator::passing());
        let mut orchestrator = orchestrator(config(), &collaborator);
        let seen = Arc::new(Mutex::new(0usize));

        orchestrator.subscribe(|_: &PipelineEvent| -> anyhow::Result<()> {
            anyhow::bail!("dashboard offline")
        });
        orchestrator.subscribe(|event: &PipelineEvent| -> anyhow::Result<()> {
            if event.kind == PipelineEventKind::PhaseCompleted {
                panic!("listener bug");
            }
            Ok(())
        });
        let counter = seen.clone();
        orchestrator.subscribe(move |_: &PipelineEvent| -> anyhow::Result<()> {
            *counter.lock().unwrap() += 1;
            Ok(())
        });

        orchestrator.start("A task tracker").await.unwrap();

        assert_eq!(*seen.lock().unwrap(), orchestrator.events().len());
    }

    #[tokio::test]
    async fn test_event_channel_receives_events() {
        let (tx, mut rx) = mpsc::channel(128);
        let collaborator = Arc::new(ScriptedCollaborator::passing());
        let mut orchestrator = orchestrator(config(), &collaborator).with_event_channel(tx);

        orchestrator.start("A task tracker").await.unwrap();

        let mut received = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.run_id, orchestrator.run_id());
            received.push(event.kind);
        }
        assert_eq!(received, kinds(&orchestrator));
    }

    #[tokio::test]
    async fn test_independent_runs_execute_concurrently() {
        let handles: Vec<_> = (0..3)
            .map(|i| {
                let collaborator = Arc::new(ScriptedCollaborator::passing());
                let mut orchestrator = Orchestrator::new(config(), collaborator).unwrap();
                tokio::spawn(async move {
                    let result = orchestrator.start(&format!("project {}", i)).await;
                    (result.is_ok(), orchestrator.state())
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            let (ok, state) = handle.await.unwrap();
            assert!(ok);
            assert_eq!(state.status, RunStatus::Completed);
            ids.push(state.id);
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }
}
