//! Directory of persisted task units, one Markdown file per task.
//!
//! Reads never mutate the directory. Writes go through [`TaskStore::write`],
//! which refuses to replace differing content unless forced.
//!
//! The check-then-write sequence is not atomic across processes; concurrent
//! runs against one store must be serialized by the caller.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use crate::core::errors::WriteConflictError;
use crate::core::slug::{unit_filename, unit_stem};
use crate::core::types::TaskRecord;
use crate::io::fs_util::write_atomic;
use crate::io::unit::{UnitMetadata, parse_unit, render_unit};

const UNIT_EXTENSION: &str = "md";

/// A parsed unit as found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUnit {
    pub filename: String,
    pub content: String,
    pub meta: UnitMetadata,
}

/// Where a record would be written, and what currently lives there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub filename: String,
    pub current: Option<StoredUnit>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    /// Target already holds byte-identical content.
    Unchanged,
    Overwritten,
    /// Target holds different content and `force` was not set.
    Conflict(WriteConflictError),
}

/// A rendered unit plus the outcome writing it would have right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedWrite {
    pub filename: String,
    pub content: String,
    pub outcome: WriteOutcome,
}

/// Read-only view of a unit store.
pub trait StoreReader {
    /// Directory the units live in.
    fn root(&self) -> &Path;

    /// Every parseable unit, sorted by filename.
    fn list_units(&self) -> Result<Vec<StoredUnit>>;

    /// Raw contents of `filename`, if it exists.
    fn read_file(&self, filename: &str) -> Result<Option<String>>;

    fn find_by_id(&self, id: &str) -> Result<Option<StoredUnit>> {
        Ok(self
            .list_units()?
            .into_iter()
            .find(|unit| unit.meta.id == id))
    }

    /// Resolve the target file for `record`.
    ///
    /// A unit already persisted under the same id keeps its file. Otherwise
    /// the first of `<stem>.md`, `<stem>-2.md`, ... that is free or already
    /// owned by this id is used. Files that belong to another id, that
    /// cannot be parsed, or that appear in `claimed` are never targeted.
    fn read_target(&self, record: &TaskRecord, claimed: &BTreeSet<String>) -> Result<Target> {
        if let Some(unit) = self.find_by_id(&record.id)? {
            return Ok(Target {
                filename: unit.filename.clone(),
                current: Some(unit),
            });
        }
        let stem = unit_stem(&record.id, &record.title);
        for attempt in 1..=u32::MAX {
            let filename = unit_filename(&stem, attempt);
            if claimed.contains(&filename) {
                continue;
            }
            let Some(content) = self.read_file(&filename)? else {
                return Ok(Target {
                    filename,
                    current: None,
                });
            };
            match parse_unit(&content) {
                Ok(meta) if meta.id == record.id => {
                    return Ok(Target {
                        filename: filename.clone(),
                        current: Some(StoredUnit {
                            filename,
                            content,
                            meta,
                        }),
                    });
                }
                Ok(meta) => {
                    debug!(filename = %filename, owner = %meta.id, "target taken by another task");
                }
                Err(err) => {
                    debug!(filename = %filename, error = %err, "target holds unparseable unit");
                }
            }
        }
        Err(anyhow!("no free unit filename for task {}", record.id))
    }

    /// Render `record` against its target and predict the write outcome
    /// without touching the disk. `claimed` holds filenames already taken by
    /// earlier records of the same batch.
    fn prepare(
        &self,
        record: &TaskRecord,
        force: bool,
        claimed: &BTreeSet<String>,
    ) -> Result<PreparedWrite> {
        let target = self.read_target(record, claimed)?;
        let status = target
            .current
            .as_ref()
            .map_or(record.status, |unit| unit.meta.status);
        let content = render_unit(&UnitMetadata::from_record(record, status))?;
        let outcome = match &target.current {
            None => WriteOutcome::Created,
            Some(unit) if unit.content == content => WriteOutcome::Unchanged,
            Some(_) if force => WriteOutcome::Overwritten,
            Some(_) => WriteOutcome::Conflict(WriteConflictError {
                task_id: record.id.clone(),
                path: self.root().join(&target.filename),
            }),
        };
        Ok(PreparedWrite {
            filename: target.filename,
            content,
            outcome,
        })
    }
}

/// Filesystem-backed store.
#[derive(Debug, Clone)]
pub struct TaskStore {
    root: PathBuf,
}

impl TaskStore {
    /// Open (and create if needed) the store directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("create store directory {}", root.display()))?;
        Ok(Self { root })
    }

    /// Store handle that does not create the directory; a missing directory
    /// reads as empty. Used for dry runs.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Persist `record`. Conflicts are returned as
    /// [`WriteOutcome::Conflict`] so callers can continue with other records.
    pub fn write(&self, record: &TaskRecord, force: bool) -> Result<WriteOutcome> {
        self.persist(record, force).map(|prepared| prepared.outcome)
    }

    /// Like [`TaskStore::write`], but also reports the file that was targeted.
    pub fn persist(&self, record: &TaskRecord, force: bool) -> Result<PreparedWrite> {
        let prepared = self.prepare(record, force, &BTreeSet::new())?;
        let path = self.root.join(&prepared.filename);
        match &prepared.outcome {
            WriteOutcome::Created | WriteOutcome::Overwritten => {
                write_atomic(&path, &prepared.content)
                    .with_context(|| format!("write unit for task {}", record.id))?;
                info!(task = %record.id, path = %path.display(), outcome = ?prepared.outcome, "unit written");
            }
            WriteOutcome::Unchanged => {
                debug!(task = %record.id, path = %path.display(), "unit unchanged");
            }
            WriteOutcome::Conflict(_) => {
                warn!(task = %record.id, path = %path.display(), "unit differs, not overwriting");
            }
        }
        Ok(prepared)
    }
}

impl StoreReader for TaskStore {
    fn root(&self) -> &Path {
        &self.root
    }

    fn list_units(&self) -> Result<Vec<StoredUnit>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("read store directory {}", self.root.display()))?;

        let mut filenames = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("read entry in {}", self.root.display()))?;
            let path = entry.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != UNIT_EXTENSION) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                filenames.push(name.to_string());
            }
        }
        filenames.sort();

        let mut units = Vec::with_capacity(filenames.len());
        for filename in filenames {
            let Some(content) = self.read_file(&filename)? else {
                continue;
            };
            match parse_unit(&content) {
                Ok(meta) => units.push(StoredUnit {
                    filename,
                    content,
                    meta,
                }),
                Err(err) => {
                    warn!(filename = %filename, error = %format!("{err:#}"), "skipping unparseable unit");
                }
            }
        }
        debug!(root = %self.root.display(), count = units.len(), "listed units");
        Ok(units)
    }

    fn read_file(&self, filename: &str) -> Result<Option<String>> {
        let path = self.root.join(filename);
        if !path.is_file() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .with_context(|| format!("read unit {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TaskStatus;
    use crate::test_support::{task_with_files, temp_store};

    fn login() -> TaskRecord {
        let mut record = task_with_files("42", &[], &["src/login.rs"]);
        record.title = "Add login".to_string();
        record
    }

    #[test]
    fn writes_unit_under_sanitized_filename() {
        let (_temp, store) = temp_store();
        assert_eq!(store.write(&login(), false).expect("write"), WriteOutcome::Created);

        let units = store.list_units().expect("list");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].filename, "42-add-login.md");
        assert_eq!(units[0].meta.id, "42");
        assert_eq!(units[0].meta.files, vec!["src/login.rs"]);
    }

    #[test]
    fn identical_rewrite_is_unchanged_and_different_content_conflicts() {
        let (_temp, store) = temp_store();
        let record = login();
        store.write(&record, false).expect("first write");
        assert_eq!(store.write(&record, false).expect("second write"), WriteOutcome::Unchanged);

        let mut edited = record.clone();
        edited.files.push("src/session.rs".to_string());
        let outcome = store.write(&edited, false).expect("third write");
        let WriteOutcome::Conflict(conflict) = outcome else {
            panic!("expected conflict, got {outcome:?}");
        };
        assert_eq!(conflict.task_id, "42");
        assert!(conflict.path.ends_with("42-add-login.md"));

        let stored = store.find_by_id("42").expect("find").expect("present");
        assert_eq!(stored.meta.files, vec!["src/login.rs"]);
    }

    #[test]
    fn force_overwrites_but_keeps_status() {
        let (_temp, store) = temp_store();
        let record = login();
        store.write(&record, false).expect("write");

        let path = store.root().join("42-add-login.md");
        let content = fs::read_to_string(&path).expect("read");
        fs::write(&path, content.replace("status: pending", "status: done")).expect("mark done");

        let mut edited = record;
        edited.cost = Some(3);
        assert_eq!(store.write(&edited, true).expect("forced"), WriteOutcome::Overwritten);

        let stored = store.find_by_id("42").expect("find").expect("present");
        assert_eq!(stored.meta.status, TaskStatus::Done);
        assert_eq!(stored.meta.cost, Some(3));
    }

    #[test]
    fn renamed_task_keeps_its_file() {
        let (_temp, store) = temp_store();
        let record = login();
        store.write(&record, false).expect("write");

        let mut renamed = record;
        renamed.title = "Add sign in".to_string();
        let prepared = store
            .prepare(&renamed, true, &BTreeSet::new())
            .expect("prepare");
        assert_eq!(prepared.filename, "42-add-login.md");
        assert_eq!(prepared.outcome, WriteOutcome::Overwritten);
    }

    #[test]
    fn filename_owned_by_other_id_gets_suffix() {
        let (_temp, store) = temp_store();
        let mut first = task_with_files("T1", &[], &[]);
        first.title = "Setup".to_string();
        let mut second = task_with_files("t1", &[], &[]);
        second.title = "Setup".to_string();

        store.write(&first, false).expect("first");
        assert_eq!(store.write(&second, false).expect("second"), WriteOutcome::Created);
        let names: Vec<String> = store
            .list_units()
            .expect("list")
            .into_iter()
            .map(|unit| unit.filename)
            .collect();
        assert_eq!(names, vec!["t1-setup-2.md", "t1-setup.md"]);
    }

    #[test]
    fn claimed_filenames_are_skipped() {
        let (_temp, store) = temp_store();
        let claimed = BTreeSet::from(["42-add-login.md".to_string()]);
        let prepared = store.prepare(&login(), false, &claimed).expect("prepare");
        assert_eq!(prepared.filename, "42-add-login-2.md");
        assert_eq!(prepared.outcome, WriteOutcome::Created);

        let written = store.persist(&login(), false).expect("persist");
        assert_eq!(written.filename, "42-add-login.md");
        assert_eq!(written.outcome, WriteOutcome::Created);
    }

    #[test]
    fn unparseable_files_are_skipped_and_never_targeted() {
        let (_temp, store) = temp_store();
        fs::write(store.root().join("42-add-login.md"), "not a unit").expect("write junk");
        fs::write(store.root().join("notes.txt"), "ignored").expect("write txt");

        assert!(store.list_units().expect("list").is_empty());
        let target = store
            .read_target(&login(), &BTreeSet::new())
            .expect("target");
        assert_eq!(target.filename, "42-add-login-2.md");
        assert!(target.current.is_none());
    }

    #[test]
    fn missing_directory_reads_as_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::at(temp.path().join("absent"));
        assert!(store.list_units().expect("list").is_empty());
        let prepared = store
            .prepare(&login(), false, &BTreeSet::new())
            .expect("prepare");
        assert_eq!(prepared.outcome, WriteOutcome::Created);
        assert!(!store.root().exists());
    }
}
