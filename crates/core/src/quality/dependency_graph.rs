//! # Dependency-Graph Checker
//!
//! Story dependencies must form a DAG: every edge points at a known story
//! and there are no cycles. Also exposes a deterministic topological order
//! used by synthesis.

use std::collections::{BTreeMap, BTreeSet};

use super::issue::{binary_score, CategoryReport, ValidationIssue};
use super::{Artifact, QualityCategory, Validator};
use crate::phases::Story;

/// Story id → ids it depends on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
    /// `(story, target)` for `blocks` entries naming no known story
    unknown_blocks: BTreeSet<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an explicit node → depends-on map
    pub fn from_map<I, K, D>(map: I) -> Self
    where
        I: IntoIterator<Item = (K, D)>,
        K: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        let mut graph = Self::new();
        for (node, deps) in map {
            let node = node.into();
            graph.add_node(&node);
            for dep in deps {
                graph.add_edge(&node, dep.into());
            }
        }
        graph
    }

    /// Build from stories: `blocked_by` edges plus inverted `blocks` edges
    pub fn from_stories(stories: &[Story]) -> Self {
        let mut graph = Self::new();
        for story in stories {
            graph.add_node(&story.id);
        }
        for story in stories {
            for dep in &story.blocked_by {
                graph.add_edge(&story.id, dep.clone());
            }
            for dependent in &story.blocks {
                if graph.edges.contains_key(dependent) {
                    graph.add_edge(dependent, story.id.clone());
                } else {
                    graph
                        .unknown_blocks
                        .insert((story.id.clone(), dependent.clone()));
                }
            }
        }
        graph
    }

    fn add_node(&mut self, node: &str) {
        self.edges.entry(node.to_string()).or_default();
    }

    fn add_edge(&mut self, node: &str, depends_on: String) {
        self.edges
            .entry(node.to_string())
            .or_default()
            .insert(depends_on);
    }

    pub fn contains(&self, node: &str) -> bool {
        self.edges.contains_key(node)
    }

    pub fn dependencies_of(&self, node: &str) -> impl Iterator<Item = &str> {
        self.edges
            .get(node)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Edges `(from, to)` whose target is not a node of the graph
    pub fn dangling_edges(&self) -> Vec<(String, String)> {
        self.edges
            .iter()
            .flat_map(|(from, deps)| {
                deps.iter()
                    .filter(|to| !self.edges.contains_key(*to))
                    .map(move |to| (from.clone(), to.clone()))
            })
            .collect()
    }

    /// `blocks` entries `(story, target)` whose target is not a node
    pub fn unknown_blocks(&self) -> impl Iterator<Item = (&str, &str)> {
        self.unknown_blocks
            .iter()
            .map(|(from, to)| (from.as_str(), to.as_str()))
    }

    /// Every distinct cycle reachable by DFS, as a closed path
    /// (`[A, B, C, A]`), rotated to start at its smallest id.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();
        let mut stack: Vec<&str> = Vec::new();
        let mut seen: BTreeSet<Vec<String>> = BTreeSet::new();
        let mut cycles = Vec::new();

        for node in self.edges.keys() {
            if !marks.contains_key(node.as_str()) {
                self.visit(node, &mut marks, &mut stack, &mut seen, &mut cycles);
            }
        }
        cycles
    }

    fn visit<'a>(
        &'a self,
        node: &'a str,
        marks: &mut BTreeMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
        seen: &mut BTreeSet<Vec<String>>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        marks.insert(node, Mark::InProgress);
        stack.push(node);

        for dep in self.dependencies_of(node) {
            if !self.contains(dep) {
                continue;
            }
            match marks.get(dep) {
                Some(Mark::InProgress) => {
                    if let Some(start) = stack.iter().position(|n| *n == dep) {
                        let cycle = canonical_cycle(&stack[start..]);
                        if seen.insert(cycle.clone()) {
                            cycles.push(cycle);
                        }
                    }
                }
                Some(Mark::Done) => {}
                None => self.visit(dep, marks, stack, seen, cycles),
            }
        }

        stack.pop();
        marks.insert(node, Mark::Done);
    }

    /// Dependencies before dependents, ties broken by id. `None` when the
    /// graph has a cycle. Dangling edges are ignored.
    pub fn topological_order(&self) -> Option<Vec<String>> {
        let mut remaining: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for (node, deps) in &self.edges {
            let known: Vec<&str> = deps
                .iter()
                .map(String::as_str)
                .filter(|d| self.contains(d))
                .collect();
            remaining.insert(node.as_str(), known.len());
            for dep in known {
                dependents.entry(dep).or_default().push(node.as_str());
            }
        }

        let mut ready: BTreeSet<&str> = remaining
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&node, _)| node)
            .collect();
        let mut order = Vec::with_capacity(self.edges.len());

        while let Some(node) = ready.pop_first() {
            order.push(node.to_string());
            for dependent in dependents.get(node).into_iter().flatten() {
                if let Some(count) = remaining.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }

        (order.len() == self.edges.len()).then_some(order)
    }
}

/// Rotate an open cycle so it starts at its smallest node, then close it
fn canonical_cycle(path: &[&str]) -> Vec<String> {
    let start = path
        .iter()
        .enumerate()
        .min_by_key(|(_, node)| **node)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut cycle: Vec<String> = path[start..]
        .iter()
        .chain(&path[..start])
        .map(|n| n.to_string())
        .collect();
    if let Some(first) = cycle.first().cloned() {
        cycle.push(first);
    }
    cycle
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraphChecker;

impl DependencyGraphChecker {
    pub fn new() -> Self {
        Self
    }

    /// Errors for dangling edges, unknown `blocks` targets and cycles
    pub fn check_graph(&self, graph: &DependencyGraph) -> Vec<ValidationIssue> {
        let tag = QualityCategory::DependencyGraph.tag();
        let mut issues = Vec::new();

        for (from, to) in graph.dangling_edges() {
            issues.push(
                ValidationIssue::error(
                    tag,
                    format!("Story {} depends on unknown story {}", from, to),
                    format!("story {}", from),
                )
                .with_fix(format!("Remove the dependency on {} or add the story", to)),
            );
        }

        for (from, to) in graph.unknown_blocks() {
            issues.push(
                ValidationIssue::error(
                    tag,
                    format!("Story {} blocks unknown story {}", from, to),
                    format!("story {}", from),
                )
                .with_fix(format!("Remove {} from blocks or add the story", to)),
            );
        }

        for cycle in graph.find_cycles() {
            let members = &cycle[..cycle.len().saturating_sub(1)];
            issues.push(
                ValidationIssue::error(
                    tag,
                    format!("dependency cycle: {}", cycle.join(" → ")),
                    format!("stories {}", members.join(", ")),
                )
                .with_fix("Break the cycle by removing one of its dependencies"),
            );
        }

        issues
    }
}

/// `blocks` declarations the target story does not mirror in `blocked_by`
fn asymmetry_warnings(stories: &[Story]) -> Vec<ValidationIssue> {
    let by_id: BTreeMap<&str, &Story> = stories.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut issues = Vec::new();
    for story in stories {
        for target in &story.blocks {
            let Some(other) = by_id.get(target.as_str()) else {
                continue;
            };
            if !other.blocked_by.iter().any(|id| id == &story.id) {
                issues.push(ValidationIssue::warning(
                    QualityCategory::DependencyGraph.tag(),
                    format!(
                        "Story {} blocks {}, but {} does not list it in blocked_by",
                        story.id, target, target
                    ),
                    format!("story {}", story.id),
                ));
            }
        }
    }
    issues
}

impl Validator for DependencyGraphChecker {
    fn category(&self) -> QualityCategory {
        QualityCategory::DependencyGraph
    }

    fn validate(&self, artifact: &Artifact<'_>) -> CategoryReport {
        let graph = DependencyGraph::from_stories(artifact.stories);
        let mut issues = self.check_graph(&graph);
        let errors = issues.len();
        issues.extend(asymmetry_warnings(artifact.stories));
        CategoryReport::new(QualityCategory::DependencyGraph, binary_score(errors), issues)
    }
}
