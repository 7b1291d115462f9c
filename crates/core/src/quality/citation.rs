//! # Citation Checker
//!
//! Every architecture decision must cite a verification source, carry a
//! recent verification date and list at least two rejected alternatives
//! with reasons. Tech-stack entries must be pinned to an exact version and
//! backed by a URL.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use reqwest::Url;

use super::issue::{binary_score, CategoryReport, ValidationIssue};
use super::{Artifact, QualityCategory, Validator};
use crate::phases::{Decision, TechStackEntry};

/// Default age after which a verification date is considered stale
pub const DEFAULT_FRESHNESS_DAYS: u32 = 90;

/// Minimum number of rejected alternatives per decision
const MIN_ALTERNATIVES: usize = 2;

#[derive(Debug, Clone)]
pub struct CitationChecker {
    freshness: Duration,
    /// Fixed clock for tests; `None` reads the system clock on each validation
    now: Option<DateTime<Utc>>,
}

impl Default for CitationChecker {
    fn default() -> Self {
        Self::new(DEFAULT_FRESHNESS_DAYS)
    }
}

impl CitationChecker {
    pub fn new(freshness_days: u32) -> Self {
        Self {
            freshness: Duration::days(i64::from(freshness_days)),
            now: None,
        }
    }

    /// Checker that evaluates freshness against a fixed instant
    pub fn at(now: DateTime<Utc>, freshness_days: u32) -> Self {
        Self {
            now: Some(now),
            ..Self::new(freshness_days)
        }
    }

    fn check_decision(
        &self,
        decision: &Decision,
        now: DateTime<Utc>,
        issues: &mut Vec<ValidationIssue>,
    ) {
        let tag = QualityCategory::Citation.tag();
        let location = format!("decision {}", decision.id);

        if !is_http_url(&decision.verification_source) {
            issues.push(
                ValidationIssue::error(
                    tag,
                    format!(
                        "Verification source '{}' is not an http(s) URL",
                        decision.verification_source
                    ),
                    &location,
                )
                .with_fix("Cite the documentation or release page the decision was verified against"),
            );
        }

        match parse_timestamp(&decision.verification_timestamp) {
            None => issues.push(
                ValidationIssue::error(
                    tag,
                    format!(
                        "Verification timestamp '{}' is not a date",
                        decision.verification_timestamp
                    ),
                    &location,
                )
                .with_fix("Use RFC 3339 or YYYY-MM-DD"),
            ),
            Some(verified) if verified > now => issues.push(ValidationIssue::warning(
                tag,
                format!(
                    "Verification timestamp {} is in the future",
                    decision.verification_timestamp
                ),
                &location,
            )),
            Some(verified) if now - verified > self.freshness => issues.push(
                ValidationIssue::warning(
                    tag,
                    format!(
                        "Verification is {} days old (limit {})",
                        (now - verified).num_days(),
                        self.freshness.num_days()
                    ),
                    &location,
                )
                .with_fix("Re-verify the source"),
            ),
            Some(_) => {}
        }

        if decision.rejected_alternatives.len() < MIN_ALTERNATIVES {
            issues.push(
                ValidationIssue::error(
                    tag,
                    format!(
                        "Only {} rejected alternative(s), at least {} required",
                        decision.rejected_alternatives.len(),
                        MIN_ALTERNATIVES
                    ),
                    &location,
                )
                .with_fix("Document the other options considered and why they lost"),
            );
        }

        for (i, alternative) in decision.rejected_alternatives.iter().enumerate() {
            if alternative.reason.trim().is_empty() {
                issues.push(ValidationIssue::error(
                    tag,
                    format!("Rejected alternative '{}' has no reason", alternative.option),
                    format!("{} / alternative {}", location, i + 1),
                ));
            }
        }
    }

    fn check_tech_entry(&self, entry: &TechStackEntry, issues: &mut Vec<ValidationIssue>) {
        let tag = QualityCategory::Citation.tag();
        let location = format!("tech stack {}", entry.name);

        if !is_http_url(&entry.source) {
            issues.push(ValidationIssue::error(
                tag,
                format!("Source '{}' is not an http(s) URL", entry.source),
                &location,
            ));
        }

        let version = entry.version.trim();
        if version.eq_ignore_ascii_case("latest") {
            issues.push(
                ValidationIssue::error(tag, "Version 'latest' is not pinned", &location)
                    .with_fix("Pin the exact released version"),
            );
        } else if is_bare_major(version) {
            issues.push(
                ValidationIssue::error(
                    tag,
                    format!(
                        "Version '{}' names only a major version, which resolves as a range",
                        entry.version
                    ),
                    &location,
                )
                .with_fix(format!(
                    "Pin at least major.minor (for example '{}.0' or the exact release such as '{}.4')",
                    version.trim_start_matches('v'),
                    version.trim_start_matches('v')
                )),
            );
        } else if !is_exact_version(version) {
            issues.push(
                ValidationIssue::error(
                    tag,
                    format!("Version '{}' is a range, not an exact version", entry.version),
                    &location,
                )
                .with_fix("Pin the exact released version as major.minor[.patch]"),
            );
        }
    }
}

impl Validator for CitationChecker {
    fn category(&self) -> QualityCategory {
        QualityCategory::Citation
    }

    fn validate(&self, artifact: &Artifact<'_>) -> CategoryReport {
        let now = self.now.unwrap_or_else(Utc::now);
        let mut issues = Vec::new();

        for decision in artifact.decisions {
            self.check_decision(decision, now, &mut issues);
        }
        for entry in artifact.tech_stack {
            self.check_tech_entry(entry, &mut issues);
        }

        let errors = issues.iter().filter(|i| i.is_error()).count();
        CategoryReport::new(QualityCategory::Citation, binary_score(errors), issues)
    }
}

fn is_http_url(source: &str) -> bool {
    match Url::parse(source.trim()) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// `16`, `v18`: a major alone, which package managers treat as a range
fn is_bare_major(version: &str) -> bool {
    let version = version.strip_prefix('v').unwrap_or(version);
    !version.is_empty() && version.chars().all(|c| c.is_ascii_digit())
}

/// `1.2`, `1.2.3`, `v1.2.3`, `1.2.3-rc.1` are exact; `^1.2`, `1.x`, `>=1` are not
fn is_exact_version(version: &str) -> bool {
    let version = version.strip_prefix('v').unwrap_or(version);
    let core = version.split(['-', '+']).next().unwrap_or("");
    let parts: Vec<&str> = core.split('.').collect();
    (2..=4).contains(&parts.len())
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}
