//! Generation pipeline: task document in, ordered plan and persisted units out.
//!
//! `plan` is read-only and produces the full report, including the predicted
//! outcome of every write. `run` executes the same plan and replaces the
//! predictions with what actually happened.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::conflict::{Conflict, ConflictKind, ExistingTask, detect, suffixed_id};
use crate::core::errors::{ConflictError, GraphError, ParseError, WriteConflictError};
use crate::core::graph::{EdgeKind, GraphOptions, TaskGraph};
use crate::core::grouping::{TaskGroup, group_tasks};
use crate::core::parser::parse_document;
use crate::core::types::{ConflictPolicy, ErrorMode, Grouping, TaskRecord};
use crate::core::views::{Batch, CriticalPath};
use crate::io::task_store::{StoreReader, StoredUnit, TaskStore, WriteOutcome};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerateOptions {
    pub grouping: Grouping,
    pub conflict_policy: ConflictPolicy,
    pub error_mode: ErrorMode,
    pub infer_file_dependencies: bool,
    pub dry_run: bool,
    /// Overwrite differing units instead of reporting write conflicts. A
    /// unit persisted under the same id is then an update, not a conflict.
    pub force: bool,
}

impl GenerateOptions {
    fn graph_options(&self, known_external: BTreeSet<String>) -> GraphOptions {
        GraphOptions {
            mode: self.error_mode,
            infer_file_dependencies: self.infer_file_dependencies,
            known_external,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteAction {
    Create,
    Unchanged,
    Overwrite,
    Conflict,
}

impl From<&WriteOutcome> for WriteAction {
    fn from(outcome: &WriteOutcome) -> Self {
        match outcome {
            WriteOutcome::Created => WriteAction::Create,
            WriteOutcome::Unchanged => WriteAction::Unchanged,
            WriteOutcome::Overwritten => WriteAction::Overwrite,
            WriteOutcome::Conflict(_) => WriteAction::Conflict,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedWrite {
    pub task_id: String,
    pub filename: String,
    pub action: WriteAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Renamed {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationReport {
    pub dry_run: bool,
    /// Task ids, prerequisites first.
    pub order: Vec<String>,
    pub batches: Vec<Batch>,
    pub critical_path: CriticalPath,
    /// Every collision with a persisted task, whatever the policy did.
    pub conflicts: Vec<Conflict>,
    pub skipped: Vec<String>,
    pub renamed: Vec<Renamed>,
    pub groups: Vec<TaskGroup>,
    pub writes: Vec<PlannedWrite>,
    /// Problems tolerated in best-effort mode.
    pub diagnostics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeRecord {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
}

/// Graph-only view of a document, without touching any store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub order: Vec<String>,
    pub batches: Vec<Batch>,
    pub critical_path: CriticalPath,
    pub edges: Vec<EdgeRecord>,
    pub diagnostics: Vec<String>,
}

/// Everything that made a run fail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub parse: Vec<ParseError>,
    pub graph: Vec<GraphError>,
    pub conflicts: Vec<ConflictError>,
    pub write_conflicts: Vec<WriteConflictError>,
}

impl Diagnostics {
    pub fn is_empty(&self) -> bool {
        self.parse.is_empty()
            && self.graph.is_empty()
            && self.conflicts.is_empty()
            && self.write_conflicts.is_empty()
    }

    /// True when the input itself was valid and only collisions with the
    /// store stopped the run.
    pub fn is_conflict_only(&self) -> bool {
        self.parse.is_empty()
            && self.graph.is_empty()
            && !(self.conflicts.is_empty() && self.write_conflicts.is_empty())
    }

    pub fn messages(&self) -> Vec<String> {
        let parse = self.parse.iter().map(ToString::to_string);
        let graph = self.graph.iter().map(ToString::to_string);
        let conflicts = self.conflicts.iter().map(ToString::to_string);
        let writes = self.write_conflicts.iter().map(ToString::to_string);
        parse.chain(graph).chain(conflicts).chain(writes).collect()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for message in self.messages() {
            writeln!(f, "- {message}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("generation rejected:\n{0}")]
    Rejected(Diagnostics),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// A computed plan plus the records it would write, in write order.
struct Plan {
    report: GenerationReport,
    records: Vec<TaskRecord>,
}

/// Run the whole pipeline without writing anything.
pub fn plan(
    input: &str,
    store: &impl StoreReader,
    options: &GenerateOptions,
) -> Result<GenerationReport, GenerateError> {
    let mut report = build_plan(input, store, options)?.report;
    report.dry_run = true;
    Ok(report)
}

/// Run the pipeline and persist the plan, unless `options.dry_run` is set.
pub fn run(
    input: &str,
    store: &TaskStore,
    options: &GenerateOptions,
) -> Result<GenerationReport, GenerateError> {
    if options.dry_run {
        return plan(input, store, options);
    }
    let Plan {
        mut report,
        records,
    } = build_plan(input, store, options)?;

    for (planned, record) in report.writes.iter_mut().zip(&records) {
        let written = store.persist(record, options.force)?;
        planned.action = WriteAction::from(&written.outcome);
        planned.filename = written.filename;
    }
    info!(
        tasks = records.len(),
        root = %store.root().display(),
        "generation finished"
    );
    Ok(report)
}

/// Parse and validate a document, returning its graph views.
pub fn check(input: &str, options: &GenerateOptions) -> Result<CheckReport, GenerateError> {
    let (records, mut diagnostics) = parse_stage(input);
    let graph = graph_stage(records, options.graph_options(BTreeSet::new()), &diagnostics)?;
    reject_parse_errors(&diagnostics, options.error_mode)?;
    diagnostics.graph = graph.diagnostics().to_vec();

    Ok(CheckReport {
        order: owned_order(&graph),
        batches: graph.batches(),
        critical_path: graph.critical_path(),
        edges: graph
            .edges()
            .map(|edge| EdgeRecord {
                from: edge.from.to_string(),
                to: edge.to.to_string(),
                kind: edge.kind,
            })
            .collect(),
        diagnostics: diagnostics.messages(),
    })
}

fn build_plan(
    input: &str,
    store: &impl StoreReader,
    options: &GenerateOptions,
) -> Result<Plan, GenerateError> {
    let (records, mut recovered) = parse_stage(input);

    let persisted = store.list_units()?;
    let mut known_external: BTreeSet<String> =
        persisted.iter().map(|unit| unit.meta.id.clone()).collect();
    let graph = graph_stage(
        records,
        options.graph_options(known_external.clone()),
        &recovered,
    )?;
    reject_parse_errors(&recovered, options.error_mode)?;
    recovered.graph = graph.diagnostics().to_vec();

    let mut conflicts = conflict_stage(&graph, store, &persisted, options.force)?;
    report_conflicts(&conflicts);
    let mut skipped = Vec::new();
    let mut renamed = Vec::new();
    let graph = if conflicts.is_empty() {
        graph
    } else {
        let order = owned_order(&graph);
        let mut records = graph.into_tasks();
        match options.conflict_policy {
            ConflictPolicy::Fail => {
                recovered.conflicts = conflicts.into_iter().map(ConflictError).collect();
                return Err(GenerateError::Rejected(recovered));
            }
            ConflictPolicy::SkipDuplicates => {
                skipped = skip_conflicting(&mut records, &conflicts, &mut known_external);
            }
            ConflictPolicy::RenameOnConflict => {
                renamed = rename_conflicting(
                    &mut records,
                    &mut conflicts,
                    &order,
                    store,
                    &known_external,
                    options.force,
                )?;
            }
        }
        debug!(
            skipped = skipped.len(),
            renamed = renamed.len(),
            "conflict policy applied, rebuilding graph"
        );
        let rebuilt = graph_stage(records, options.graph_options(known_external), &recovered)?;
        for diagnostic in rebuilt.diagnostics() {
            if !recovered.graph.contains(diagnostic) {
                recovered.graph.push(diagnostic.clone());
            }
        }
        rebuilt
    };
    finish_plan(graph, store, options, conflicts, skipped, renamed, recovered)
}

fn finish_plan(
    graph: TaskGraph,
    store: &impl StoreReader,
    options: &GenerateOptions,
    conflicts: Vec<Conflict>,
    skipped: Vec<String>,
    renamed: Vec<Renamed>,
    mut recovered: Diagnostics,
) -> Result<Plan, GenerateError> {
    let order = owned_order(&graph);
    let ordered: Vec<&TaskRecord> = order.iter().filter_map(|id| graph.task(id)).collect();
    let groups = group_tasks(&ordered, options.grouping);

    let mut writes = Vec::with_capacity(ordered.len());
    let mut claimed = BTreeSet::new();
    for record in &ordered {
        let prepared = store.prepare(record, options.force, &claimed)?;
        claimed.insert(prepared.filename.clone());
        if let WriteOutcome::Conflict(conflict) = &prepared.outcome {
            recovered.write_conflicts.push(conflict.clone());
        }
        writes.push(PlannedWrite {
            task_id: record.id.clone(),
            filename: prepared.filename,
            action: WriteAction::from(&prepared.outcome),
        });
    }

    if options.error_mode == ErrorMode::Strict && !recovered.write_conflicts.is_empty() {
        return Err(GenerateError::Rejected(recovered));
    }
    for diagnostic in recovered.messages() {
        warn!(diagnostic = %diagnostic, "continuing past problem");
    }

    let records: Vec<TaskRecord> = ordered.into_iter().cloned().collect();
    let report = GenerationReport {
        dry_run: options.dry_run,
        batches: graph.batches(),
        critical_path: graph.critical_path(),
        order,
        conflicts,
        skipped,
        renamed,
        groups,
        writes,
        diagnostics: recovered.messages(),
    };
    info!(
        tasks = report.order.len(),
        batches = report.batches.len(),
        conflicts = report.conflicts.len(),
        "plan computed"
    );
    Ok(Plan { report, records })
}

fn parse_stage(input: &str) -> (Vec<TaskRecord>, Diagnostics) {
    let outcome = parse_document(input);
    debug!(
        records = outcome.records.len(),
        errors = outcome.errors.len(),
        "document parsed"
    );
    let diagnostics = Diagnostics {
        parse: outcome.errors,
        ..Diagnostics::default()
    };
    (outcome.records, diagnostics)
}

/// Strict mode refuses unparseable lines. Runs after the graph stage so the
/// parsed remainder has its own errors reported in the same rejection.
fn reject_parse_errors(recovered: &Diagnostics, mode: ErrorMode) -> Result<(), GenerateError> {
    if mode == ErrorMode::Strict && !recovered.parse.is_empty() {
        return Err(GenerateError::Rejected(recovered.clone()));
    }
    Ok(())
}

fn graph_stage(
    records: Vec<TaskRecord>,
    options: GraphOptions,
    recovered: &Diagnostics,
) -> Result<TaskGraph, GenerateError> {
    TaskGraph::build(records, &options).map_err(|errors| {
        GenerateError::Rejected(Diagnostics {
            parse: recovered.parse.clone(),
            graph: errors.0,
            ..Diagnostics::default()
        })
    })
}

/// Collisions between batch candidates and persisted units.
///
/// A candidate whose rendered unit already sits byte-identical in the store
/// is unchanged, not in conflict. With `force`, the unit persisted under the
/// candidate's own id is an update target rather than a collision.
fn conflict_stage(
    graph: &TaskGraph,
    store: &impl StoreReader,
    persisted: &[StoredUnit],
    force: bool,
) -> Result<Vec<Conflict>, GenerateError> {
    if persisted.is_empty() {
        return Ok(Vec::new());
    }
    let mut conflicts = Vec::new();
    for record in graph.tasks() {
        let prepared = store.prepare(record, force, &BTreeSet::new())?;
        if prepared.outcome == WriteOutcome::Unchanged {
            continue;
        }
        let existing: Vec<ExistingTask<'_>> = persisted
            .iter()
            .filter(|unit| !(force && unit.meta.id == record.id))
            .map(|unit| ExistingTask {
                id: &unit.meta.id,
                title: &unit.meta.title,
                files: &unit.meta.files,
                filename: &unit.filename,
            })
            .collect();
        if let Some(conflict) = detect(record, &existing) {
            conflicts.push(conflict);
        }
    }
    Ok(conflicts)
}

fn report_conflicts(conflicts: &[Conflict]) {
    for conflict in conflicts {
        info!(
            task = %conflict.candidate_id,
            existing = %conflict.existing_id,
            kind = %conflict.kind,
            "conflict with persisted task"
        );
    }
}

/// Drop every colliding candidate. References to a dropped duplicate are
/// pointed at the persisted task it duplicates; references to other dropped
/// candidates are accepted as external.
fn skip_conflicting(
    records: &mut Vec<TaskRecord>,
    conflicts: &[Conflict],
    known_external: &mut BTreeSet<String>,
) -> Vec<String> {
    let dropped: BTreeSet<&str> = conflicts.iter().map(|c| c.candidate_id.as_str()).collect();
    let redirects: BTreeMap<String, String> = conflicts
        .iter()
        .filter(|c| c.kind == ConflictKind::Duplicate && c.candidate_id != c.existing_id)
        .map(|c| (c.candidate_id.clone(), c.existing_id.clone()))
        .collect();

    records.retain(|record| !dropped.contains(record.id.as_str()));
    rewrite_references(records, &redirects);
    known_external.extend(dropped.iter().map(|id| id.to_string()));
    conflicts.iter().map(|c| c.candidate_id.clone()).collect()
}

/// Give every colliding candidate a `<id>-N` id and rewrite in-batch
/// references to it.
///
/// Conflicts are resolved in topological order. A candidate that becomes
/// byte-identical to its persisted unit once earlier renames are applied is
/// no longer a conflict. Otherwise a persisted `<id>-N` unit that already
/// holds exactly the renamed candidate is reused, so repeated runs converge.
/// Only then is the first free suffix taken.
fn rename_conflicting(
    records: &mut [TaskRecord],
    conflicts: &mut Vec<Conflict>,
    order: &[String],
    store: &impl StoreReader,
    persisted_ids: &BTreeSet<String>,
    force: bool,
) -> Result<Vec<Renamed>, GenerateError> {
    let batch_ids: BTreeSet<String> = records.iter().map(|record| record.id.clone()).collect();
    let mut taken: BTreeSet<String> = persisted_ids.union(&batch_ids).cloned().collect();
    let mut reused: BTreeSet<String> = BTreeSet::new();
    conflicts.sort_by_key(|c| order.iter().position(|id| *id == c.candidate_id));

    let mut renames = BTreeMap::new();
    let mut renamed = Vec::with_capacity(conflicts.len());
    let mut resolved = Vec::new();
    for conflict in &*conflicts {
        let Some(record) = records.iter().find(|r| r.id == conflict.candidate_id) else {
            continue;
        };
        let mut candidate = record.clone();
        rewrite_record(&mut candidate, &renames);
        if is_unchanged(store, &candidate, force)? {
            debug!(task = %candidate.id, "conflict resolved by earlier renames");
            resolved.push(conflict.candidate_id.clone());
            continue;
        }

        let mut to = None;
        for id in persisted_ids.iter().filter(|id| {
            is_suffix_of(id, &conflict.candidate_id)
                && !batch_ids.contains(id.as_str())
                && !reused.contains(id.as_str())
        }) {
            candidate.id = id.clone();
            if is_unchanged(store, &candidate, force)? {
                to = Some(id.clone());
                break;
            }
        }
        let to = match to {
            Some(id) => {
                reused.insert(id.clone());
                id
            }
            None => {
                let id = suffixed_id(&conflict.candidate_id, |id| taken.contains(id));
                taken.insert(id.clone());
                id
            }
        };
        renames.insert(conflict.candidate_id.clone(), to.clone());
        renamed.push(Renamed {
            from: conflict.candidate_id.clone(),
            to,
        });
    }
    conflicts.retain(|c| !resolved.contains(&c.candidate_id));

    for record in &mut *records {
        if let Some(to) = renames.get(&record.id) {
            record.id = to.clone();
        }
    }
    rewrite_references(records, &renames);
    Ok(renamed)
}

fn is_unchanged(
    store: &impl StoreReader,
    record: &TaskRecord,
    force: bool,
) -> Result<bool, GenerateError> {
    let prepared = store.prepare(record, force, &BTreeSet::new())?;
    Ok(prepared.outcome == WriteOutcome::Unchanged)
}

/// True for `<base>-N` with a numeric `N`.
fn is_suffix_of(id: &str, base: &str) -> bool {
    id.strip_prefix(base)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

fn rewrite_references(records: &mut [TaskRecord], renames: &BTreeMap<String, String>) {
    if renames.is_empty() {
        return;
    }
    for record in records {
        rewrite_record(record, renames);
    }
}

fn rewrite_record(record: &mut TaskRecord, renames: &BTreeMap<String, String>) {
    let deps = record
        .dependencies
        .iter_mut()
        .chain(record.inferred_dependencies.iter_mut());
    for dep in deps {
        if let Some(to) = renames.get(dep) {
            *dep = to.clone();
        }
    }
}

fn owned_order(graph: &TaskGraph) -> Vec<String> {
    graph
        .topological_order()
        .into_iter()
        .map(str::to_string)
        .collect()
}
