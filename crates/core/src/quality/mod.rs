//! # Quality Gates
//!
//! Deterministic validators that score the artifact produced by the design
//! and decomposition phases. Each validator is independent and returns a
//! [`CategoryReport`]; the [`QualityGate`] combines them.
//!
//! ## Validators
//!
//! - `completeness` - Incompletion markers in step code (TODO, `...`, empty bodies)
//! - `citation` - Decision sources, freshness and pinned tech-stack versions
//! - `atomic` - At most 3 distinct files per story
//! - `schema` - Balanced delimiters and non-empty exports in schema sources
//! - `dependency_graph` - Story dependencies form a DAG with no dangling edges

pub mod aggregator;
pub mod atomic;
pub mod citation;
pub mod completeness;
pub mod dependency_graph;
pub mod issue;
pub mod schema;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::phases::{
    Decision, DecompositionOutput, DesignOutput, PhaseName, SchemaBlob, Story, TechStackEntry,
};

pub use aggregator::{QualityGate, QualityReport};
pub use atomic::AtomicSizeChecker;
pub use citation::CitationChecker;
pub use completeness::CompletenessScanner;
pub use dependency_graph::{DependencyGraph, DependencyGraphChecker};
pub use issue::{CategoryReport, Severity, ValidationIssue};
pub use schema::SchemaBalanceChecker;

/// The five scored quality categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityCategory {
    Completeness,
    Citation,
    AtomicSize,
    SchemaBalance,
    DependencyGraph,
}

impl QualityCategory {
    pub const ALL: [QualityCategory; 5] = [
        QualityCategory::Completeness,
        QualityCategory::Citation,
        QualityCategory::AtomicSize,
        QualityCategory::SchemaBalance,
        QualityCategory::DependencyGraph,
    ];

    /// Tag used on the category's issues
    pub fn tag(&self) -> &'static str {
        match self {
            QualityCategory::Completeness => "completeness",
            QualityCategory::Citation => "citation",
            QualityCategory::AtomicSize => "atomic_size",
            QualityCategory::SchemaBalance => "schema_balance",
            QualityCategory::DependencyGraph => "dependency_graph",
        }
    }

    /// Upstream phase that produced the data this category checks
    pub fn implicated_phase(&self) -> PhaseName {
        match self {
            QualityCategory::Citation => PhaseName::Design,
            QualityCategory::Completeness
            | QualityCategory::AtomicSize
            | QualityCategory::SchemaBalance
            | QualityCategory::DependencyGraph => PhaseName::Decomposition,
        }
    }
}

impl fmt::Display for QualityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Read-only view over the accumulated artifact
#[derive(Debug, Clone, Copy)]
pub struct Artifact<'a> {
    pub stories: &'a [Story],
    pub decisions: &'a [Decision],
    pub tech_stack: &'a [TechStackEntry],
    pub schemas: &'a [SchemaBlob],
}

impl<'a> Artifact<'a> {
    pub fn new(design: &'a DesignOutput, decomposition: &'a DecompositionOutput) -> Self {
        Self {
            stories: &decomposition.stories,
            decisions: &design.decisions,
            tech_stack: &design.tech_stack,
            schemas: &decomposition.schemas,
        }
    }
}

/// A single quality check over the artifact
pub trait Validator: Send + Sync {
    fn category(&self) -> QualityCategory;

    fn validate(&self, artifact: &Artifact<'_>) -> CategoryReport;
}
