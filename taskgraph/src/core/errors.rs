//! Error taxonomy for the generation pipeline.
//!
//! Per-line problems (`ParseError`) are recoverable; structural graph problems
//! (`GraphError`) are fatal unless the caller runs in best-effort mode;
//! conflicts depend on the configured policy; write conflicts are always
//! surfaced.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::conflict::Conflict;

/// What went wrong on a single input line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("malformed checkbox")]
    MalformedCheckbox,
    #[error("missing task identifier")]
    MissingIdentifier,
    #[error("invalid task identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("unclosed marker")]
    UnclosedMarker,
    #[error("empty marker")]
    EmptyMarker,
    #[error("unknown marker '[{0}]'")]
    UnknownMarker(String),
    #[error("invalid value in marker '[{0}]'")]
    InvalidMarkerValue(String),
    #[error("duplicate marker '[{0}]'")]
    DuplicateMarker(String),
    #[error("missing title")]
    MissingTitle,
}

/// A malformed task line, with its position and raw text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {kind}: {raw}")]
pub struct ParseError {
    pub line: usize,
    pub raw: String,
    pub kind: ParseErrorKind,
}

/// A dependency cycle as distinct task ids.
///
/// Following the edge from each id to the next, and from the last back to the
/// first, closes the cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError {
    pub cycle: Vec<String>,
}

impl CycleError {
    /// The closed path, repeating the first id at the end.
    pub fn path(&self) -> Vec<&str> {
        let mut path: Vec<&str> = self.cycle.iter().map(String::as_str).collect();
        if let Some(first) = self.cycle.first() {
            path.push(first.as_str());
        }
        path
    }
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dependency cycle: {}", self.path().join(" -> "))
    }
}

impl std::error::Error for CycleError {}

/// Structural problems found while building the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("duplicate task id '{id}' (lines {first_line} and {line})")]
    DuplicateId {
        id: String,
        first_line: usize,
        line: usize,
    },
    #[error("task '{id}' depends on itself")]
    SelfDependency { id: String },
    #[error("task '{task}' depends on unknown task '{dependency}'")]
    DanglingDependency { task: String, dependency: String },
    #[error(transparent)]
    Cycle(#[from] CycleError),
}

impl GraphError {
    /// Whether best-effort mode can drop the offending item and continue.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, GraphError::Cycle(_))
    }
}

/// Every structural problem collected during one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphErrors(pub Vec<GraphError>);

impl GraphErrors {
    pub fn cycles(&self) -> impl Iterator<Item = &CycleError> {
        self.0.iter().filter_map(|err| match err {
            GraphError::Cycle(cycle) => Some(cycle),
            _ => None,
        })
    }
}

impl fmt::Display for GraphErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "graph validation failed:\n- {}", messages.join("\n- "))
    }
}

impl std::error::Error for GraphErrors {}

/// A candidate collided with a persisted task and the policy forbids it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "task '{}' conflicts with persisted task '{}' ({})",
    .0.candidate_id,
    .0.existing_id,
    .0.kind
)]
pub struct ConflictError(pub Conflict);

/// The target unit exists with different content and `force` was not set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("refusing to overwrite {} for task '{task_id}': content differs", .path.display())]
pub struct WriteConflictError {
    pub task_id: String,
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_path_returns_to_start() {
        let err = CycleError {
            cycle: vec!["T1".to_string(), "T2".to_string()],
        };
        assert_eq!(err.path(), vec!["T1", "T2", "T1"]);
        assert_eq!(err.to_string(), "dependency cycle: T1 -> T2 -> T1");
    }

    #[test]
    fn parse_error_names_line_and_text() {
        let err = ParseError {
            line: 7,
            raw: "- [ ] T1 [ZZ] title".to_string(),
            kind: ParseErrorKind::UnknownMarker("ZZ".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "line 7: unknown marker '[ZZ]': - [ ] T1 [ZZ] title"
        );
    }

    #[test]
    fn graph_errors_list_every_problem() {
        let errors = GraphErrors(vec![
            GraphError::SelfDependency {
                id: "A".to_string(),
            },
            GraphError::DanglingDependency {
                task: "B".to_string(),
                dependency: "Z".to_string(),
            },
        ]);
        let rendered = errors.to_string();
        assert!(rendered.contains("task 'A' depends on itself"));
        assert!(rendered.contains("task 'B' depends on unknown task 'Z'"));
    }
}
