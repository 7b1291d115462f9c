//! Test fixtures: a scripted in-memory collaborator and artifacts that pass
//! every quality gate.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::agents::{AgentRequest, Collaborator};
use crate::phases::{DecompositionOutput, DesignOutput, PhaseName};

type Handler = Box<dyn Fn(&AgentRequest) -> anyhow::Result<Value> + Send + Sync>;

enum Reply {
    Value(Value),
    Fail(String),
    Handler(Handler),
}

/// Collaborator that answers from per-phase scripts. Replies are consumed
/// in order; the last reply for a phase repeats forever.
#[derive(Default)]
pub struct ScriptedCollaborator {
    scripts: Mutex<BTreeMap<PhaseName, VecDeque<Reply>>>,
    requests: Mutex<Vec<AgentRequest>>,
    delay: Option<Duration>,
}

impl ScriptedCollaborator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every phase answers with a passing fixture
    pub fn passing() -> Self {
        Self::new()
            .respond(PhaseName::Discovery, discovery_json())
            .respond(PhaseName::Challenge, challenge_json(false))
            .respond(PhaseName::Design, design_json())
            .respond(PhaseName::Decomposition, decomposition_json())
            .respond(PhaseName::Validation, json!({ "notes": [] }))
            .respond(PhaseName::Synthesis, synthesis_json())
    }

    fn push(self, phase: PhaseName, reply: Reply) -> Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.entry(phase).or_default().push_back(reply);
        }
        self
    }

    /// Replace every queued reply for a phase
    pub fn replace(self, phase: PhaseName, value: Value) -> Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.insert(phase, VecDeque::from([Reply::Value(value)]));
        }
        self
    }

    pub fn respond(self, phase: PhaseName, value: Value) -> Self {
        self.push(phase, Reply::Value(value))
    }

    pub fn fail(self, phase: PhaseName) -> Self {
        self.push(phase, Reply::Fail(format!("{} collaborator unavailable", phase)))
    }

    /// Answer with a closure; replaces any queued replies for the phase
    pub fn with_handler<F>(self, phase: PhaseName, handler: F) -> Self
    where
        F: Fn(&AgentRequest) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.insert(phase, VecDeque::from([Reply::Handler(Box::new(handler))]));
        }
        self
    }

    /// Delay every reply
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn calls(&self, phase: PhaseName) -> usize {
        self.requests().iter().filter(|r| r.phase == phase).count()
    }

    fn reply(&self, request: &AgentRequest) -> anyhow::Result<Value> {
        let mut scripts = self
            .scripts
            .lock()
            .map_err(|_| anyhow::anyhow!("script lock poisoned"))?;
        let queue = scripts
            .get_mut(&request.phase)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| anyhow::anyhow!("no script for phase {}", request.phase))?;

        let reply = if queue.len() > 1 {
            queue.pop_front()
        } else {
            None
        };
        let reply = match &reply {
            Some(reply) => reply,
            None => &queue[0],
        };

        match reply {
            Reply::Value(value) => Ok(value.clone()),
            Reply::Fail(message) => Err(anyhow::anyhow!("{}", message)),
            Reply::Handler(handler) => handler(request),
        }
    }
}

#[async_trait]
impl Collaborator for ScriptedCollaborator {
    async fn invoke(&self, request: AgentRequest) -> anyhow::Result<Value> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply(&request)
    }
}

pub fn discovery_json() -> Value {
    json!({
        "summary": "Personal task tracker with a REST API",
        "requirements": [
            { "id": "R1", "statement": "Users can create tasks", "priority": "must" },
            { "id": "R2", "statement": "Users can list their tasks", "priority": "should" }
        ],
        "assumptions": ["Single tenant"],
        "open_questions": []
    })
}

pub fn challenge_json(needs_loop: bool) -> Value {
    json!({
        "challenges": [
            { "target": "R2", "concern": "Pagination is unspecified", "severity": "minor" }
        ],
        "needs_discovery_loop": needs_loop,
        "feedback": ["Clarify list size limits"]
    })
}

pub fn design_json() -> Value {
    let verified = Utc::now().format("%Y-%m-%d").to_string();
    json!({
        "decisions": [{
            "id": "D1",
            "topic": "http framework",
            "chosen_option": "axum",
            "rationale": "Tower middleware ecosystem",
            "rejected_alternatives": [
                { "option": "actix-web", "reason": "Separate runtime model" },
                { "option": "warp", "reason": "Filter types hurt compile times" }
            ],
            "verification_source": "https://docs.rs/axum/0.7.5/axum/",
            "verification_timestamp": verified
        }],
        "tech_stack": [
            { "name": "axum", "version": "0.7.5", "source": "https://crates.io/crates/axum/0.7.5" }
        ]
    })
}

pub fn decomposition_json() -> Value {
    json!({
        "stories": [
            {
                "id": "S1",
                "title": "Task model",
                "steps": [{
                    "file_path": "src/task.ts",
                    "action": "create",
                    "code": "export interface Task {\n  id: string;\n  title: string;\n  done: boolean;\n}\n"
                }],
                "affected_files": ["src/task.ts"],
                "blocked_by": [],
                "blocks": ["S2"]
            },
            {
                "id": "S2",
                "title": "Task listing",
                "steps": [{
                    "file_path": "src/list.ts",
                    "action": "create",
                    "code": "import { Task } from './task';\n\nexport function openTasks(tasks: Task[]): Task[] {\n  return tasks.filter((t) => !t.done);\n}\n"
                }],
                "affected_files": ["src/list.ts"],
                "blocked_by": ["S1"],
                "blocks": []
            }
        ],
        "schemas": [{
            "name": "task",
            "content": "export interface Task {\n  id: string;\n  title: string;\n  done: boolean;\n}\n"
        }],
        "non_atomic_detected": false,
        "non_atomic_story_ids": []
    })
}

pub fn synthesis_json() -> Value {
    json!({
        "title": "Task Tracker Specification",
        "summary": "REST task tracker built on axum",
        "sections": [
            { "heading": "Architecture", "body": "axum service with a task model" }
        ],
        "story_order": ["S1", "S2"]
    })
}

pub fn passing_design() -> DesignOutput {
    serde_json::from_value(design_json()).expect("design fixture")
}

pub fn passing_decomposition() -> DecompositionOutput {
    serde_json::from_value(decomposition_json()).expect("decomposition fixture")
}
