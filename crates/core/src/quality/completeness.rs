//! # Completeness Scanner
//!
//! Flags code that was left unfinished: ellipses, TODO/FIXME comments,
//! lazy references ("same as above"), empty function bodies and
//! placeholder returns.
//!
//! ## Features
//!
//! - Line-based marker catalog (regex)
//! - Empty bodies inside type-definition blocks (interface, trait, declare)
//!   are not flagged
//! - Exemption patterns (glob syntax) for declaration files, where empty
//!   bodies are expected

use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::issue::{graded_score, CategoryReport, ValidationIssue};
use super::{Artifact, QualityCategory, Validator};

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the completeness scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletenessConfig {
    /// Files where empty bodies and placeholder returns are allowed (glob syntax)
    pub exemptions: Vec<String>,
}

impl Default for CompletenessConfig {
    fn default() -> Self {
        Self {
            exemptions: vec!["**/*.d.ts".into(), "*.d.ts".into()],
        }
    }
}

// ============================================================================
// Marker Catalog
// ============================================================================

/// Kind of incompletion marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    Ellipsis,
    TodoComment,
    LazyReference,
    EmptyBody,
    Placeholder,
}

impl MarkerKind {
    pub fn describe(&self) -> &'static str {
        match self {
            MarkerKind::Ellipsis => "Elided code",
            MarkerKind::TodoComment => "TODO/FIXME marker",
            MarkerKind::LazyReference => "Lazy reference to other code",
            MarkerKind::EmptyBody => "Empty function body",
            MarkerKind::Placeholder => "Placeholder implementation",
        }
    }

    fn fix(&self) -> &'static str {
        match self {
            MarkerKind::Ellipsis => "Write out the elided code in full",
            MarkerKind::TodoComment => "Implement the pending work and remove the marker",
            MarkerKind::LazyReference => "Repeat the referenced code explicitly",
            MarkerKind::EmptyBody | MarkerKind::Placeholder => {
                "Provide the complete function implementation"
            }
        }
    }

    /// Shape-based markers, which are legitimate inside type definitions
    fn is_structural(&self) -> bool {
        matches!(self, MarkerKind::EmptyBody | MarkerKind::Placeholder)
    }
}

const MARKER_PATTERNS: &[(&str, MarkerKind)] = &[
    // Ellipses
    (r"…", MarkerKind::Ellipsis),
    (r"^\s*\.\.\.\s*;?\s*$", MarkerKind::Ellipsis),
    (r"\{\s*\.\.\.\s*\}", MarkerKind::Ellipsis),
    (r"(?://|#|/\*|--)\s*\.\.\.", MarkerKind::Ellipsis),
    // TODO / FIXME in line, block, doc, SQL and HTML comments
    (
        r"(?://+|#+|/\*+|^\s*\*|--|<!--)\s*(?:TODO|FIXME)\b",
        MarkerKind::TodoComment,
    ),
    // Lazy references
    (
        r"(?i)\bsimilar to (?:the )?(?:above|before|previous)",
        MarkerKind::LazyReference,
    ),
    (
        r"(?i)\bsame as (?:above|before|previous)",
        MarkerKind::LazyReference,
    ),
    (r"(?i)\betc\.", MarkerKind::LazyReference),
    (
        r"(?i)\brest of (?:the )?(?:code|implementation|methods|file)\b",
        MarkerKind::LazyReference,
    ),
    (
        r"(?i)\b(?:code|implementation) (?:omitted|goes here)\b",
        MarkerKind::LazyReference,
    ),
    (r"(?i)\band so on\b", MarkerKind::LazyReference),
    // Empty bodies
    (
        r"\bfunction\b[^{;]*\)\s*(?::\s*[^{;]+)?\{\s*\}",
        MarkerKind::EmptyBody,
    ),
    (r"=>\s*\{\s*\}", MarkerKind::EmptyBody),
    (r"\bfn\s+\w+[^{;]*\{\s*\}", MarkerKind::EmptyBody),
    (
        r"^\s*(?:async\s+)?def\s+\w+\s*\(.*\)\s*(?:->\s*[^:]+)?:\s*(?:pass|\.\.\.)\s*$",
        MarkerKind::EmptyBody,
    ),
    // Placeholder returns
    (r"\breturn\s+undefined\b", MarkerKind::Placeholder),
    (r"=>\s*undefined\b", MarkerKind::Placeholder),
    (r"\b(?:todo|unimplemented)!\s*\(", MarkerKind::Placeholder),
    (
        r#"(?i)throw\s+new\s+Error\(\s*["'`]not\s+implemented"#,
        MarkerKind::Placeholder,
    ),
    (r"\braise\s+NotImplementedError\b", MarkerKind::Placeholder),
];

/// Start of a block whose members may legitimately have no body
const TYPE_BLOCK_START: &str = r"^\s*(?:export\s+)?(?:default\s+)?(?:declare\b|interface\b|abstract\s+class\b|(?:pub(?:\([^)]*\))?\s+)?trait\b|type\s+\w+(?:<[^>]*>)?\s*=)";

// ============================================================================
// Scanner
// ============================================================================

/// A marker found in a piece of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerHit {
    /// 1-based line number
    pub line: usize,
    pub kind: MarkerKind,
    /// Trimmed source line (truncated)
    pub excerpt: String,
}

#[derive(Debug, Clone)]
struct Marker {
    kind: MarkerKind,
    regex: Regex,
}

/// Scans step code for incompletion markers
#[derive(Debug, Clone)]
pub struct CompletenessScanner {
    markers: Vec<Marker>,
    type_block_start: Option<Regex>,
    exemptions: Vec<Pattern>,
}

impl Default for CompletenessScanner {
    fn default() -> Self {
        Self::new(&CompletenessConfig::default())
    }
}

impl CompletenessScanner {
    pub fn new(config: &CompletenessConfig) -> Self {
        let mut markers = Vec::with_capacity(MARKER_PATTERNS.len());
        for (pattern, kind) in MARKER_PATTERNS {
            if let Ok(regex) = Regex::new(pattern) {
                markers.push(Marker { kind: *kind, regex });
            } else {
                tracing::warn!("Skipping invalid completeness pattern: {}", pattern);
            }
        }

        let exemptions = config
            .exemptions
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .collect();

        Self {
            markers,
            type_block_start: Regex::new(TYPE_BLOCK_START).ok(),
            exemptions,
        }
    }

    /// Check if a file path is exempt from structural markers
    pub fn is_exempt(&self, path: &str) -> bool {
        self.exemptions.iter().any(|p| p.matches(path))
    }

    /// Scan a text blob. Structural markers (empty bodies, placeholder
    /// returns) are only reported when `structural` is true and the line is
    /// outside a type-definition block.
    pub fn scan_text(&self, text: &str, structural: bool) -> Vec<MarkerHit> {
        let mut hits = Vec::new();
        let mut depth: i64 = 0;
        // (depth when the block started, whether its brace has opened yet)
        let mut type_block: Option<(i64, bool)> = None;

        for (idx, line) in text.lines().enumerate() {
            if type_block.is_none()
                && self
                    .type_block_start
                    .as_ref()
                    .is_some_and(|re| re.is_match(line))
            {
                type_block = Some((depth, false));
            }
            let in_type_block = type_block.is_some();

            let mut kinds_on_line: Vec<MarkerKind> = Vec::new();
            for marker in &self.markers {
                if marker.kind.is_structural() && (!structural || in_type_block) {
                    continue;
                }
                if kinds_on_line.contains(&marker.kind) {
                    continue;
                }
                if marker.regex.is_match(line) {
                    kinds_on_line.push(marker.kind);
                    hits.push(MarkerHit {
                        line: idx + 1,
                        kind: marker.kind,
                        excerpt: excerpt(line),
                    });
                }
            }

            depth += line.matches('{').count() as i64 - line.matches('}').count() as i64;
            if let Some((start, opened)) = type_block {
                let opened = opened || depth > start || line.contains('{');
                type_block = if (opened && depth <= start) || (!opened && line.contains(';')) {
                    None
                } else {
                    Some((start, opened))
                };
            }
        }

        hits
    }
}

fn excerpt(line: &str) -> String {
    const MAX_CHARS: usize = 80;
    let trimmed = line.trim();
    if trimmed.chars().count() > MAX_CHARS {
        let mut cut: String = trimmed.chars().take(MAX_CHARS).collect();
        cut.push_str("...");
        cut
    } else {
        trimmed.to_string()
    }
}

impl Validator for CompletenessScanner {
    fn category(&self) -> QualityCategory {
        QualityCategory::Completeness
    }

    fn validate(&self, artifact: &Artifact<'_>) -> CategoryReport {
        let mut issues = Vec::new();

        for story in artifact.stories {
            for (i, step) in story.steps.iter().enumerate() {
                let structural = !self.is_exempt(&step.file_path);
                for hit in self.scan_text(&step.code, structural) {
                    issues.push(
                        ValidationIssue::error(
                            QualityCategory::Completeness.tag(),
                            format!(
                                "{} in {}: `{}`",
                                hit.kind.describe(),
                                step.file_path,
                                hit.excerpt
                            ),
                            format!(
                                "story {} / step {} / {}:{}",
                                story.id,
                                i + 1,
                                step.file_path,
                                hit.line
                            ),
                        )
                        .with_fix(hit.kind.fix()),
                    );
                }
            }
        }

        CategoryReport::new(
            QualityCategory::Completeness,
            graded_score(issues.len()),
            issues,
        )
    }
}
