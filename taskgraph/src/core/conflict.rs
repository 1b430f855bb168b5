//! Collision classification between candidates and persisted tasks.
//!
//! Only equality and overlap checks are used; there is no fuzzy matching.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::core::types::TaskRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    /// Same title and same file set.
    Duplicate,
    /// Same file set (or same id) under a different title.
    Rename,
    /// Same title over a different file set.
    Split,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConflictKind::Duplicate => "duplicate",
            ConflictKind::Rename => "rename",
            ConflictKind::Split => "split",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub candidate_id: String,
    pub existing_id: String,
    pub existing_filename: String,
    pub kind: ConflictKind,
}

/// The parts of a persisted task that conflict detection looks at.
#[derive(Debug, Clone, Copy)]
pub struct ExistingTask<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub files: &'a [String],
    pub filename: &'a str,
}

/// Classify a single candidate/persisted pair, or `None` if they do not
/// collide.
pub fn classify(candidate: &TaskRecord, existing: &ExistingTask<'_>) -> Option<ConflictKind> {
    let same_id = candidate.id == existing.id;
    let same_title = candidate.title.trim() == existing.title.trim();
    let candidate_files = file_set(&candidate.files);
    let existing_files = file_set(existing.files);
    let same_files = candidate_files == existing_files;
    let shared_files = !candidate_files.is_empty() && same_files;

    match (same_title, same_files) {
        (true, true) => Some(ConflictKind::Duplicate),
        (true, false) => Some(ConflictKind::Split),
        (false, _) if shared_files || same_id => Some(ConflictKind::Rename),
        (false, _) => None,
    }
}

/// First collision for `candidate`, checking the same-id unit before the
/// rest in store order.
pub fn detect(candidate: &TaskRecord, existing: &[ExistingTask<'_>]) -> Option<Conflict> {
    let same_id = existing.iter().filter(|e| e.id == candidate.id);
    let others = existing.iter().filter(|e| e.id != candidate.id);
    same_id.chain(others).find_map(|unit| {
        classify(candidate, unit).map(|kind| Conflict {
            candidate_id: candidate.id.clone(),
            existing_id: unit.id.to_string(),
            existing_filename: unit.filename.to_string(),
            kind,
        })
    })
}

/// `<id>-2`, `<id>-3`, ... whichever is first not `taken`.
pub fn suffixed_id(id: &str, taken: impl Fn(&str) -> bool) -> String {
    (2u32..)
        .map(|n| format!("{id}-{n}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| format!("{id}-{}", u32::MAX))
}

fn file_set(files: &[String]) -> BTreeSet<&str> {
    files.iter().map(String::as_str).collect()
}
