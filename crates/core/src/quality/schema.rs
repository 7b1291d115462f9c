//! # Schema-Balance Checker
//!
//! Sanity checks over the schema sources emitted by decomposition:
//! balanced `{}` / `()` delimiters, no empty blobs, no blob whose exports
//! are all empty, and no incompletion markers.

use regex::Regex;

use super::completeness::{CompletenessConfig, CompletenessScanner};
use super::issue::{graded_score, CategoryReport, ValidationIssue};
use super::{Artifact, QualityCategory, Validator};
use crate::phases::SchemaBlob;

#[derive(Debug, Clone)]
pub struct SchemaBalanceChecker {
    scanner: CompletenessScanner,
    export: Option<Regex>,
    empty_export: Option<Regex>,
}

impl Default for SchemaBalanceChecker {
    fn default() -> Self {
        Self::new(&CompletenessConfig::default())
    }
}

impl SchemaBalanceChecker {
    pub fn new(config: &CompletenessConfig) -> Self {
        Self {
            scanner: CompletenessScanner::new(config),
            export: Regex::new(r"\bexport\b").ok(),
            empty_export: Regex::new(
                r"\bexport\s+(?:(?:default|declare)\s+)?(?:interface|class|enum|type|const|namespace|module)\s+\w+[^{=;]*(?:=\s*)?\{\s*\}|\bexport\s*\{\s*\}",
            )
            .ok(),
        }
    }

    fn check_blob(&self, blob: &SchemaBlob, issues: &mut Vec<ValidationIssue>) {
        let tag = QualityCategory::SchemaBalance.tag();
        let location = format!("schema {}", blob.name);

        if blob.content.trim().is_empty() {
            issues.push(
                ValidationIssue::error(tag, "Schema is empty", &location)
                    .with_fix("Provide the full schema definition"),
            );
            return;
        }

        let balance = DelimiterBalance::scan(&blob.content);
        for (open, close, counts) in [('{', '}', balance.braces), ('(', ')', balance.parens)] {
            if let Some(problem) = counts.problem(open, close) {
                issues.push(ValidationIssue::error(tag, problem, &location));
            }
        }

        if let (Some(export), Some(empty_export)) = (&self.export, &self.empty_export) {
            let exports = export.find_iter(&blob.content).count();
            let empty = empty_export.find_iter(&blob.content).count();
            if exports > 0 && empty >= exports {
                issues.push(
                    ValidationIssue::error(tag, "Every export in the schema is empty", &location)
                        .with_fix("Declare the exported fields"),
                );
            }
        }

        for hit in self.scanner.scan_text(&blob.content, true) {
            issues.push(ValidationIssue::error(
                tag,
                format!("{}: `{}`", hit.kind.describe(), hit.excerpt),
                format!("{}:{}", location, hit.line),
            ));
        }
    }
}

impl Validator for SchemaBalanceChecker {
    fn category(&self) -> QualityCategory {
        QualityCategory::SchemaBalance
    }

    fn validate(&self, artifact: &Artifact<'_>) -> CategoryReport {
        let mut issues = Vec::new();
        for blob in artifact.schemas {
            self.check_blob(blob, &mut issues);
        }
        CategoryReport::new(
            QualityCategory::SchemaBalance,
            graded_score(issues.len()),
            issues,
        )
    }
}

/// Open/close counts for one delimiter pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PairCount {
    open: usize,
    close: usize,
    /// First line where a closer appeared with nothing open
    stray_close_line: Option<usize>,
}

impl PairCount {
    fn push_open(&mut self) {
        self.open += 1;
    }

    fn push_close(&mut self, line: usize) {
        self.close += 1;
        if self.close > self.open && self.stray_close_line.is_none() {
            self.stray_close_line = Some(line);
        }
    }

    fn problem(&self, open: char, close: char) -> Option<String> {
        if let Some(line) = self.stray_close_line {
            return Some(format!("Unmatched '{}' on line {}", close, line));
        }
        (self.open != self.close).then(|| {
            format!(
                "Unbalanced delimiters: {} '{}' vs {} '{}'",
                self.open, open, self.close, close
            )
        })
    }
}

#[derive(Debug, Default)]
struct DelimiterBalance {
    braces: PairCount,
    parens: PairCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Code,
    LineComment,
    BlockComment,
    Str(char),
}

impl DelimiterBalance {
    /// Count delimiters outside string literals and comments. Strings end at
    /// their closing quote or at end of line.
    fn scan(source: &str) -> Self {
        let mut balance = Self::default();
        let mut state = LexState::Code;
        let mut line = 1;
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '\n' {
                line += 1;
                if matches!(state, LexState::LineComment | LexState::Str(_)) {
                    state = LexState::Code;
                }
                continue;
            }

            match state {
                LexState::Code => match c {
                    '/' if chars.peek() == Some(&'/') => {
                        chars.next();
                        state = LexState::LineComment;
                    }
                    '/' if chars.peek() == Some(&'*') => {
                        chars.next();
                        state = LexState::BlockComment;
                    }
                    '"' | '\'' | '`' => state = LexState::Str(c),
                    '{' => balance.braces.push_open(),
                    '}' => balance.braces.push_close(line),
                    '(' => balance.parens.push_open(),
                    ')' => balance.parens.push_close(line),
                    _ => {}
                },
                LexState::LineComment => {}
                LexState::BlockComment => {
                    if c == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        state = LexState::Code;
                    }
                }
                LexState::Str(quote) => {
                    if c == '\\' {
                        if chars.peek() != Some(&'\n') {
                            chars.next();
                        }
                    } else if c == quote {
                        state = LexState::Code;
                    }
                }
            }
        }

        balance
    }
}
