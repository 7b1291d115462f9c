//! # Atomic-Size Checker
//!
//! A story may touch at most [`MAX_FILES_PER_STORY`] distinct files. Larger
//! stories get a suggested split, with files grouped by directory.

use std::collections::BTreeMap;

use super::issue::{binary_score, CategoryReport, ValidationIssue};
use super::{Artifact, QualityCategory, Validator};

pub const MAX_FILES_PER_STORY: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct AtomicSizeChecker;

impl AtomicSizeChecker {
    pub fn new() -> Self {
        Self
    }
}

impl Validator for AtomicSizeChecker {
    fn category(&self) -> QualityCategory {
        QualityCategory::AtomicSize
    }

    fn validate(&self, artifact: &Artifact<'_>) -> CategoryReport {
        let mut issues = Vec::new();

        for story in artifact.stories {
            let files = story.distinct_files();
            if files.len() <= MAX_FILES_PER_STORY {
                continue;
            }

            let split = suggest_split(&files)
                .iter()
                .map(|group| format!("[{}]", group.join(", ")))
                .collect::<Vec<_>>()
                .join(" | ");

            issues.push(
                ValidationIssue::error(
                    QualityCategory::AtomicSize.tag(),
                    format!(
                        "Story touches {} files (max {}): {}",
                        files.len(),
                        MAX_FILES_PER_STORY,
                        files.join(", ")
                    ),
                    format!("story {}", story.id),
                )
                .with_fix(format!("Split into stories: {}", split)),
            );
        }

        let errors = issues.len();
        CategoryReport::new(QualityCategory::AtomicSize, binary_score(errors), issues)
    }
}

/// Group files by parent directory, then pack the groups into chunks of at
/// most [`MAX_FILES_PER_STORY`] files. Files sharing a directory stay
/// together where they fit.
pub fn suggest_split(files: &[String]) -> Vec<Vec<String>> {
    let mut by_dir: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for file in files {
        let dir = file.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        by_dir.entry(dir).or_default().push(file.clone());
    }

    let mut groups: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    for dir_files in by_dir.into_values() {
        for chunk in dir_files.chunks(MAX_FILES_PER_STORY) {
            if current.len() + chunk.len() > MAX_FILES_PER_STORY {
                groups.push(std::mem::take(&mut current));
            }
            current.extend_from_slice(chunk);
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::{Step, StepAction, Story};

    fn story(id: &str, paths: &[&str]) -> Story {
        Story {
            id: id.into(),
            title: String::new(),
            steps: paths
                .iter()
                .map(|p| Step {
                    file_path: p.to_string(),
                    action: StepAction::Modify,
                    code: "export const x = 1;".into(),
                })
                .collect(),
            affected_files: vec![],
            blocked_by: vec![],
            blocks: vec![],
        }
    }

    fn check(stories: &[Story]) -> CategoryReport {
        let artifact = Artifact {
            stories,
            decisions: &[],
            tech_stack: &[],
            schemas: &[],
        };
        AtomicSizeChecker::new().validate(&artifact)
    }

    #[test]
    fn test_three_files_pass() {
        let report = check(&[story("S1", &["a.ts", "b.ts", "c.ts"])]);
        assert_eq!(report.score, 100);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_four_files_fail_with_score_zero() {
        let report = check(&[story("S1", &["src/a.ts", "src/b.ts", "lib/c.ts", "lib/d.ts"])]);
        assert_eq!(report.score, 0);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].location, "story S1");
        assert!(report.issues[0].suggested_fix.is_some());
    }

    #[test]
    fn test_duplicate_paths_count_once() {
        let mut s = story("S1", &["src/a.ts", "./src/a.ts", "src\\b.ts"]);
        s.affected_files = vec!["src/b.ts".into(), "src/c.ts".into()];
        assert_eq!(s.distinct_files().len(), 3);
        assert!(check(&[s]).passed);
    }

    #[test]
    fn test_affected_files_are_counted() {
        let mut s = story("S2", &["a.ts"]);
        s.affected_files = vec!["b.ts".into(), "c.ts".into(), "d.ts".into()];
        assert_eq!(check(&[s]).score, 0);
    }

    #[test]
    fn test_split_keeps_directories_together() {
        let files: Vec<String> = ["api/a.rs", "api/b.rs", "db/c.rs", "db/d.rs", "ui/e.rs"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let groups = suggest_split(&files);
        assert!(groups.iter().all(|g| g.len() <= MAX_FILES_PER_STORY));
        assert_eq!(groups[0], vec!["api/a.rs", "api/b.rs"]);
        assert_eq!(groups[1], vec!["db/c.rs", "db/d.rs", "ui/e.rs"]);
        assert_eq!(groups.iter().map(Vec::len).sum::<usize>(), 5);
    }
}
