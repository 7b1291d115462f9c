//! Issue and per-category result types shared by every validator.

use serde::{Deserialize, Serialize};

use super::QualityCategory;

/// Issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// A single finding against the artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    /// Category tag (e.g. "completeness", "loop_budget")
    pub category: String,
    pub message: String,
    /// Where in the artifact the issue was found
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
}

impl ValidationIssue {
    pub fn error(
        category: impl Into<String>,
        message: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Error,
            category: category.into(),
            message: message.into(),
            location: location.into(),
            suggested_fix: None,
        }
    }

    pub fn warning(
        category: impl Into<String>,
        message: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(category, message, location)
        }
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Score and issues for one quality category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryReport {
    pub category: QualityCategory,
    /// 0-100
    pub score: u8,
    pub passed: bool,
    pub issues: Vec<ValidationIssue>,
}

impl CategoryReport {
    /// Build a category result. An error-severity issue always fails the
    /// category, whatever score the validator computed.
    pub fn new(category: QualityCategory, score: u8, issues: Vec<ValidationIssue>) -> Self {
        let has_errors = issues.iter().any(ValidationIssue::is_error);
        let score = if has_errors { score.min(99) } else { score.min(100) };
        Self {
            category,
            score,
            passed: score == 100,
            issues,
        }
    }

    pub fn error_count(&self) -> usize {
        self.issues.iter().filter(|i| i.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues.len() - self.error_count()
    }
}

/// Score that drops 10 points per error, floored at 0
pub(crate) fn graded_score(errors: usize) -> u8 {
    100usize.saturating_sub(errors.saturating_mul(10)) as u8
}

/// All-or-nothing score
pub(crate) fn binary_score(errors: usize) -> u8 {
    if errors == 0 {
        100
    } else {
        0
    }
}
