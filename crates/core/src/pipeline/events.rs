//! # Pipeline Events
//!
//! Lifecycle notifications emitted by the orchestrator. Emission is
//! synchronous and best-effort: a listener that errors or panics is logged
//! and skipped, and the remaining listeners still run.

use std::panic::{catch_unwind, AssertUnwindSafe};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::phases::PhaseName;

/// Kind of pipeline event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineEventKind {
    PipelineStarted,
    PhaseStarted,
    PhaseCompleted,
    PhaseFailed,
    /// A phase is about to run again inside a loop
    IterationStarted,
    /// A later phase sent the pipeline back to an earlier one
    LoopBack,
    /// Quality gate evaluated the artifact
    ValidationReport,
    PipelineCompleted,
    PipelineFailed,
}

/// An event in a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: PipelineEventKind,
    pub run_id: String,
    /// Phase the event relates to, if any
    #[serde(default)]
    pub phase: Option<PhaseName>,
    #[serde(default)]
    pub detail: serde_json::Map<String, serde_json::Value>,
}

impl PipelineEvent {
    pub fn new(kind: PipelineEventKind, run_id: &str) -> Self {
        Self {
            id: new_id(),
            timestamp: Utc::now(),
            kind,
            run_id: run_id.to_string(),
            phase: None,
            detail: serde_json::Map::new(),
        }
    }

    pub fn for_phase(kind: PipelineEventKind, run_id: &str, phase: PhaseName) -> Self {
        Self {
            phase: Some(phase),
            ..Self::new(kind, run_id)
        }
    }

    /// Add a detail entry
    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.detail.insert(key.to_string(), value.into());
        self
    }
}

/// Receives pipeline events
pub trait EventListener: Send {
    fn on_event(&mut self, event: &PipelineEvent) -> anyhow::Result<()>;
}

impl<F> EventListener for F
where
    F: FnMut(&PipelineEvent) -> anyhow::Result<()> + Send,
{
    fn on_event(&mut self, event: &PipelineEvent) -> anyhow::Result<()> {
        self(event)
    }
}

/// Forwards events to a tokio channel
pub struct ChannelListener {
    tx: mpsc::Sender<PipelineEvent>,
}

impl ChannelListener {
    pub fn new(tx: mpsc::Sender<PipelineEvent>) -> Self {
        Self { tx }
    }
}

impl EventListener for ChannelListener {
    fn on_event(&mut self, event: &PipelineEvent) -> anyhow::Result<()> {
        self.tx
            .try_send(event.clone())
            .map_err(|e| anyhow::anyhow!("event channel rejected {:?}: {}", event.kind, e))
    }
}

/// Listener registry plus the in-memory event history
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Box<dyn EventListener>>,
    history: Vec<PipelineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Box<dyn EventListener>) {
        self.listeners.push(listener);
    }

    pub fn history(&self) -> &[PipelineEvent] {
        &self.history
    }

    pub fn emit(&mut self, event: PipelineEvent) {
        tracing::debug!(kind = ?event.kind, phase = ?event.phase, "Pipeline event");

        for (index, listener) in self.listeners.iter_mut().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| listener.on_event(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(listener = index, "Event listener failed: {}", e);
                }
                Err(_) => {
                    tracing::warn!(listener = index, kind = ?event.kind, "Event listener panicked");
                }
            }
        }

        self.history.push(event);
    }
}

/// Unique id from the clock plus a random suffix
pub(crate) fn new_id() -> String {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos();
    format!("{:x}-{:08x}", nanos, rand_u32())
}

/// Not cryptographic
fn rand_u32() -> u32 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    RandomState::new().build_hasher().finish() as u32
}
