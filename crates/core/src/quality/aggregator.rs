//! # Quality Aggregator
//!
//! Runs every validator and folds the results into one [`QualityReport`].
//! Confidence is the minimum category score, so a single failing category
//! fails the artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::atomic::AtomicSizeChecker;
use super::citation::CitationChecker;
use super::completeness::CompletenessScanner;
use super::dependency_graph::DependencyGraphChecker;
use super::issue::{CategoryReport, ValidationIssue};
use super::schema::SchemaBalanceChecker;
use super::{Artifact, QualityCategory, Validator};
use crate::phases::PhaseName;
use crate::pipeline::config::QualityConfig;

/// Combined quality verdict for an artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    /// Minimum of the category scores (0-100)
    pub confidence: u8,
    /// True only at confidence 100
    pub passes: bool,
    pub categories: Vec<CategoryReport>,
    /// Warnings that never influence the score (soft-capped loops,
    /// reviewer notes)
    #[serde(default)]
    pub advisories: Vec<ValidationIssue>,
    /// Earliest upstream phase implicated by a failing category
    #[serde(default)]
    pub restart_from: Option<PhaseName>,
    pub generated_at: DateTime<Utc>,
}

impl QualityReport {
    /// Build a report from category results
    pub fn from_categories(categories: Vec<CategoryReport>) -> Self {
        let confidence = categories.iter().map(|c| c.score).min().unwrap_or(100);

        // Design comes first in the pipeline; restarting there also re-runs
        // decomposition.
        let restart_from = categories
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.category.implicated_phase())
            .min();

        Self {
            confidence,
            passes: confidence == 100,
            categories,
            advisories: Vec::new(),
            restart_from,
            generated_at: Utc::now(),
        }
    }

    pub fn category(&self, category: QualityCategory) -> Option<&CategoryReport> {
        self.categories.iter().find(|c| c.category == category)
    }

    /// Error-severity issues across all categories
    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.categories
            .iter()
            .flat_map(|c| c.issues.iter())
            .filter(|i| i.is_error())
    }

    /// Ids of stories named in failing issues (`story <id> ...` locations)
    pub fn implicated_stories(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .errors()
            .filter_map(|i| i.location.strip_prefix("story "))
            .filter_map(|rest| rest.split_whitespace().next())
            .map(str::to_string)
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// Runs the configured validators
pub struct QualityGate {
    validators: Vec<Box<dyn Validator>>,
}

impl QualityGate {
    /// Gate with the five standard validators
    pub fn new(config: &QualityConfig) -> Self {
        Self::with_validators(vec![
            Box::new(CompletenessScanner::new(&config.completeness)),
            Box::new(CitationChecker::new(config.citation_freshness_days)),
            Box::new(AtomicSizeChecker::new()),
            Box::new(SchemaBalanceChecker::new(&config.completeness)),
            Box::new(DependencyGraphChecker::new()),
        ])
    }

    pub fn with_validators(validators: Vec<Box<dyn Validator>>) -> Self {
        Self { validators }
    }

    pub fn evaluate(&self, artifact: &Artifact<'_>) -> QualityReport {
        let categories = self
            .validators
            .iter()
            .map(|v| {
                let report = v.validate(artifact);
                tracing::debug!(
                    category = %v.category(),
                    score = report.score,
                    errors = report.error_count(),
                    warnings = report.warning_count(),
                    "Validator finished"
                );
                report
            })
            .collect();
        QualityReport::from_categories(categories)
    }
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(&QualityConfig::default())
    }
}
