//! Dependency graph over task records.
//!
//! Nodes live in an arena addressed by index; edges point from prerequisite to
//! dependent. A built graph is always acyclic, and every view in
//! [`crate::core::views`] is a pure query over it.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::Serialize;

use crate::core::errors::{CycleError, GraphError, GraphErrors};
use crate::core::types::{ErrorMode, TaskRecord};

/// Whether an edge was declared or synthesized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Explicit,
    Inferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
    pub kind: EdgeKind,
}

/// Edge with resolved ids, for introspection and reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeView<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Default)]
pub struct GraphOptions {
    pub mode: ErrorMode,
    /// Opt-in shared-file heuristic.
    pub infer_file_dependencies: bool,
    /// Ids that may be referenced without being part of the batch
    /// (typically tasks already in the store).
    pub known_external: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Unvisited,
    InProgress,
    Done,
}

#[derive(Debug, Clone)]
pub struct TaskGraph {
    pub(crate) nodes: Vec<TaskRecord>,
    pub(crate) index: HashMap<String, usize>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) prerequisites: Vec<Vec<usize>>,
    pub(crate) dependents: Vec<Vec<usize>>,
    diagnostics: Vec<GraphError>,
}

impl TaskGraph {
    /// Build and validate a graph.
    ///
    /// Both modes collect every structural error: later duplicate ids are
    /// dropped, unresolvable edges are skipped, and every cycle is reported.
    /// Strict mode then fails on any error; best-effort mode keeps the
    /// recoverable ones as [`TaskGraph::diagnostics`] and only fails on cycles.
    pub fn build(records: Vec<TaskRecord>, options: &GraphOptions) -> Result<Self, GraphErrors> {
        let strict = options.mode == ErrorMode::Strict;
        let mut errors = Vec::new();

        let mut nodes: Vec<TaskRecord> = Vec::with_capacity(records.len());
        let mut index: HashMap<String, usize> = HashMap::new();
        for mut record in records {
            if let Some(&first) = index.get(&record.id) {
                errors.push(GraphError::DuplicateId {
                    id: record.id.clone(),
                    first_line: nodes[first].line,
                    line: record.line,
                });
                continue;
            }
            record.inferred_dependencies.clear();
            index.insert(record.id.clone(), nodes.len());
            nodes.push(record);
        }

        let mut explicit = Vec::new();
        for (to, node) in nodes.iter().enumerate() {
            for dep in &node.dependencies {
                if *dep == node.id {
                    errors.push(GraphError::SelfDependency {
                        id: node.id.clone(),
                    });
                    continue;
                }
                match index.get(dep) {
                    Some(&from) => explicit.push((from, to)),
                    None if node.external_dependencies.contains(dep)
                        || options.known_external.contains(dep) => {}
                    None => errors.push(GraphError::DanglingDependency {
                        task: node.id.clone(),
                        dependency: dep.clone(),
                    }),
                }
            }
        }

        let count = nodes.len();
        let mut graph = Self {
            nodes,
            index,
            edges: Vec::new(),
            prerequisites: vec![Vec::new(); count],
            dependents: vec![Vec::new(); count],
            diagnostics: Vec::new(),
        };
        for (from, to) in explicit {
            graph.add_edge(from, to, EdgeKind::Explicit);
        }

        let cycles = graph.find_cycles();
        let cyclic = !cycles.is_empty();
        errors.extend(cycles.into_iter().map(GraphError::Cycle));
        if cyclic || (strict && !errors.is_empty()) {
            return Err(GraphErrors(errors));
        }
        graph.diagnostics = errors;

        if options.infer_file_dependencies {
            graph.infer_file_edges();
        }
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Records in declaration order.
    pub fn tasks(&self) -> &[TaskRecord] {
        &self.nodes
    }

    pub fn task(&self, id: &str) -> Option<&TaskRecord> {
        self.index.get(id).map(|&idx| &self.nodes[idx])
    }

    /// Recoverable problems tolerated in best-effort mode.
    pub fn diagnostics(&self) -> &[GraphError] {
        &self.diagnostics
    }

    pub fn edges(&self) -> impl Iterator<Item = EdgeView<'_>> {
        self.edges.iter().map(|edge| EdgeView {
            from: self.nodes[edge.from].id.as_str(),
            to: self.nodes[edge.to].id.as_str(),
            kind: edge.kind,
        })
    }

    pub fn inferred_edges(&self) -> impl Iterator<Item = EdgeView<'_>> {
        self.edges().filter(|edge| edge.kind == EdgeKind::Inferred)
    }

    pub fn into_tasks(self) -> Vec<TaskRecord> {
        self.nodes
    }

    fn add_edge(&mut self, from: usize, to: usize, kind: EdgeKind) {
        if self.dependents[from].contains(&to) {
            return;
        }
        self.dependents[from].push(to);
        self.prerequisites[to].push(from);
        self.edges.push(Edge { from, to, kind });
    }

    /// Depth-first search with explicit node states.
    ///
    /// A dependent found `InProgress` closes a cycle on the active path; the
    /// reported cycle is the shortest one through that node.
    fn find_cycles(&self) -> Vec<CycleError> {
        let count = self.nodes.len();
        let mut state = vec![NodeState::Unvisited; count];
        let mut cycles = Vec::new();
        let mut reported: HashSet<Vec<usize>> = HashSet::new();

        for root in 0..count {
            if state[root] != NodeState::Unvisited {
                continue;
            }
            state[root] = NodeState::InProgress;
            let mut path = vec![root];
            let mut cursor = vec![0usize];

            while let Some(&node) = path.last() {
                let top = cursor.len() - 1;
                let next = cursor[top];
                let Some(&child) = self.dependents[node].get(next) else {
                    state[node] = NodeState::Done;
                    path.pop();
                    cursor.pop();
                    continue;
                };
                cursor[top] += 1;

                match state[child] {
                    NodeState::Unvisited => {
                        state[child] = NodeState::InProgress;
                        path.push(child);
                        cursor.push(0);
                    }
                    NodeState::InProgress => {
                        let Some(start) = path.iter().position(|&idx| idx == child) else {
                            continue;
                        };
                        let cycle = self.minimal_cycle(child, &path[start..]);
                        let mut key = cycle.clone();
                        key.sort_unstable();
                        if reported.insert(key) {
                            cycles.push(self.cycle_error(&cycle));
                        }
                    }
                    NodeState::Done => {}
                }
            }
        }
        cycles
    }

    /// Shortest cycle through `start`, falling back to the DFS path.
    fn minimal_cycle(&self, start: usize, fallback: &[usize]) -> Vec<usize> {
        let mut parent: Vec<Option<usize>> = vec![None; self.nodes.len()];
        let mut visited = vec![false; self.nodes.len()];
        let mut queue = VecDeque::from([start]);
        visited[start] = true;

        while let Some(node) = queue.pop_front() {
            for &next in &self.dependents[node] {
                if next == start {
                    let mut cycle = vec![node];
                    let mut current = node;
                    while let Some(prev) = parent[current] {
                        cycle.push(prev);
                        current = prev;
                    }
                    cycle.reverse();
                    return cycle;
                }
                if !visited[next] {
                    visited[next] = true;
                    parent[next] = Some(node);
                    queue.push_back(next);
                }
            }
        }
        fallback.to_vec()
    }

    /// Rotate so the earliest-declared member leads, then resolve ids.
    fn cycle_error(&self, cycle: &[usize]) -> CycleError {
        let lead = cycle
            .iter()
            .enumerate()
            .min_by_key(|(_, idx)| **idx)
            .map_or(0, |(pos, _)| pos);
        let cycle = cycle[lead..]
            .iter()
            .chain(&cycle[..lead])
            .map(|&idx| self.nodes[idx].id.clone())
            .collect();
        CycleError { cycle }
    }

    /// Order earlier-declared writers before later ones on shared files.
    ///
    /// Pairs already ordered in either direction are left alone, so the
    /// graph stays acyclic.
    fn infer_file_edges(&mut self) {
        for later in 0..self.nodes.len() {
            for earlier in 0..later {
                if !shares_file(&self.nodes[earlier], &self.nodes[later]) {
                    continue;
                }
                if self.reaches(earlier, later) || self.reaches(later, earlier) {
                    continue;
                }
                self.add_edge(earlier, later, EdgeKind::Inferred);
                let prerequisite = self.nodes[earlier].id.clone();
                self.nodes[later].inferred_dependencies.push(prerequisite);
            }
        }
    }

    fn reaches(&self, from: usize, target: usize) -> bool {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            if node == target {
                return true;
            }
            if std::mem::replace(&mut visited[node], true) {
                continue;
            }
            stack.extend(self.dependents[node].iter().copied());
        }
        false
    }
}

fn shares_file(a: &TaskRecord, b: &TaskRecord) -> bool {
    a.files.iter().any(|file| b.files.contains(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{task, task_with_files};

    fn strict() -> GraphOptions {
        GraphOptions::default()
    }

    fn best_effort() -> GraphOptions {
        GraphOptions {
            mode: ErrorMode::BestEffort,
            ..GraphOptions::default()
        }
    }

    #[test]
    fn builds_edges_from_prerequisite_to_dependent() {
        let graph = TaskGraph::build(
            vec![task("T1", &[]), task("T2", &["T1"]), task("T3", &["T1"])],
            &strict(),
        )
        .expect("build");
        let edges: Vec<(&str, &str)> = graph.edges().map(|e| (e.from, e.to)).collect();
        assert_eq!(edges, vec![("T1", "T2"), ("T1", "T3")]);
        assert!(graph.diagnostics().is_empty());
    }

    #[test]
    fn two_node_cycle_is_reported_exactly() {
        let err = TaskGraph::build(vec![task("T1", &["T2"]), task("T2", &["T1"])], &strict())
            .expect_err("cycle");
        let cycles: Vec<&CycleError> = err.cycles().collect();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].cycle, vec!["T1", "T2"]);
    }

    #[test]
    fn reported_cycle_is_minimal_and_closes() {
        // A -> B -> C -> D -> B (and a long detour A -> D).
        let records = vec![
            task("A", &[]),
            task("B", &["A", "D"]),
            task("C", &["B"]),
            task("D", &["C", "A"]),
        ];
        let err = TaskGraph::build(records.clone(), &strict()).expect_err("cycle");
        let cycle = err.cycles().next().expect("one cycle").cycle.clone();
        assert_eq!(cycle, vec!["B", "C", "D"]);

        // Every consecutive pair (wrapping around) must be an edge: dep -> dependent.
        let by_id: HashMap<&str, &TaskRecord> =
            records.iter().map(|r| (r.id.as_str(), r)).collect();
        for (pos, from) in cycle.iter().enumerate() {
            let to = &cycle[(pos + 1) % cycle.len()];
            assert!(by_id[to.as_str()].dependencies.contains(from));
        }
    }

    #[test]
    fn dangling_dependency_fails_unless_external() {
        let err = TaskGraph::build(vec![task("T1", &["T0"])], &strict()).expect_err("dangling");
        assert_eq!(
            err.0,
            vec![GraphError::DanglingDependency {
                task: "T1".to_string(),
                dependency: "T0".to_string(),
            }]
        );

        let mut marked = task("T1", &["T0"]);
        marked.external_dependencies.push("T0".to_string());
        let graph = TaskGraph::build(vec![marked], &strict()).expect("external accepted");
        assert_eq!(graph.edges().count(), 0);

        let options = GraphOptions {
            known_external: BTreeSet::from(["T0".to_string()]),
            ..strict()
        };
        TaskGraph::build(vec![task("T1", &["T0"])], &options).expect("persisted accepted");
    }

    #[test]
    fn both_modes_collect_every_error() {
        let records = vec![
            task("A", &["A"]),
            task("B", &["missing"]),
            task("A", &[]),
        ];
        let err = TaskGraph::build(records.clone(), &strict()).expect_err("strict");
        assert_eq!(err.0.len(), 3);
        assert!(matches!(err.0[0], GraphError::DuplicateId { .. }));

        let graph = TaskGraph::build(records, &best_effort()).expect("best effort recovers");
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.diagnostics().len(), 3);
        assert!(graph.diagnostics().iter().all(GraphError::is_recoverable));
    }

    #[test]
    fn best_effort_still_fails_on_cycles_and_reports_everything() {
        let records = vec![
            task("A", &["B"]),
            task("B", &["A"]),
            task("C", &["D"]),
            task("D", &["C", "nope"]),
        ];
        let err = TaskGraph::build(records, &best_effort()).expect_err("cycles");
        assert_eq!(err.cycles().count(), 2);
        assert!(err
            .0
            .iter()
            .any(|e| matches!(e, GraphError::DanglingDependency { .. })));
    }

    #[test]
    fn strict_reports_every_dangling_dependency_and_cycle() {
        let records = vec![
            task("T1", &["X", "Y"]),
            task("T2", &["Z"]),
            task("T3", &["T4"]),
            task("T4", &["T3"]),
        ];
        let err = TaskGraph::build(records, &strict()).expect_err("strict");
        let dangling: Vec<&str> = err
            .0
            .iter()
            .filter_map(|e| match e {
                GraphError::DanglingDependency { dependency, .. } => Some(dependency.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(dangling, vec!["X", "Y", "Z"]);
        assert_eq!(err.cycles().count(), 1);
    }

    #[test]
    fn inference_is_opt_in_and_marked() {
        let records = vec![
            task_with_files("T1", &[], &["src/lib.rs"]),
            task_with_files("T2", &[], &["src/lib.rs", "src/a.rs"]),
            task_with_files("T3", &["T2"], &["src/a.rs"]),
        ];
        let plain = TaskGraph::build(records.clone(), &strict()).expect("build");
        assert_eq!(plain.inferred_edges().count(), 0);

        let options = GraphOptions {
            infer_file_dependencies: true,
            ..strict()
        };
        let graph = TaskGraph::build(records, &options).expect("build");
        let inferred: Vec<(&str, &str)> =
            graph.inferred_edges().map(|e| (e.from, e.to)).collect();
        // T2 -> T3 already explicit, so only T1 -> T2 is synthesized.
        assert_eq!(inferred, vec![("T1", "T2")]);
        assert_eq!(
            graph.task("T2").expect("T2").inferred_dependencies,
            vec!["T1"]
        );
        assert!(graph.task("T2").expect("T2").dependencies.is_empty());
    }

    #[test]
    fn inference_never_reverses_existing_order() {
        // T2 is declared later but is already a prerequisite of T1.
        let records = vec![
            task_with_files("T1", &["T2"], &["shared.rs"]),
            task_with_files("T2", &[], &["shared.rs"]),
        ];
        let options = GraphOptions {
            infer_file_dependencies: true,
            ..strict()
        };
        let graph = TaskGraph::build(records, &options).expect("build");
        assert_eq!(graph.inferred_edges().count(), 0);
    }
}
