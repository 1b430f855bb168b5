//! Shared deterministic types for the generation pipeline.
//!
//! These types define stable contracts between the parser, graph builder,
//! mapper and store. They do not depend on external state or I/O.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a persisted task.
///
/// The pipeline only ever creates tasks as `Pending`; later transitions belong
/// to whoever manages the store afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Blocked,
    Ready,
    Done,
}

/// A single declared unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub title: String,
    /// Name of the phase header the task was declared under.
    pub phase: Option<String>,
    /// Ordinal of that phase header (0 before any header).
    pub phase_order: u32,
    pub story: Option<String>,
    pub parallel: bool,
    /// Lower value ranks first (`P1` before `P2`).
    pub priority: Option<u8>,
    /// Critical-path weight; `None` counts as 1.
    pub cost: Option<u32>,
    pub files: Vec<String>,
    pub dependencies: Vec<String>,
    /// Dependencies accepted even when absent from the batch.
    pub external_dependencies: Vec<String>,
    /// Edges added by shared-file inference, never declared in the input.
    #[serde(default)]
    pub inferred_dependencies: Vec<String>,
    pub status: TaskStatus,
    /// 1-based source line, doubling as declaration order.
    pub line: usize,
}

impl TaskRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>, line: usize) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            phase: None,
            phase_order: 0,
            story: None,
            parallel: false,
            priority: None,
            cost: None,
            files: Vec::new(),
            dependencies: Vec::new(),
            external_dependencies: Vec::new(),
            inferred_dependencies: Vec::new(),
            status: TaskStatus::Pending,
            line,
        }
    }

    /// Weight used by the critical path computation.
    pub fn weight(&self) -> u64 {
        u64::from(self.cost.unwrap_or(1))
    }
}

/// How structural problems are handled across the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorMode {
    /// Report every structural error and write nothing.
    #[default]
    Strict,
    /// Collect every problem and continue wherever a safe recovery exists.
    BestEffort,
}

/// Presentation grouping for the write plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Grouping {
    #[default]
    ByPhase,
    ByStory,
    Flat,
}

/// What to do when a candidate collides with an already-persisted task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    #[default]
    Fail,
    SkipDuplicates,
    RenameOnConflict,
}
