//! Test-only helpers for constructing task records and scratch stores.

use tempfile::TempDir;

use crate::core::types::TaskRecord;
use crate::io::task_store::TaskStore;

/// Create a deterministic record with default fields and the given
/// prerequisites.
pub fn task(id: &str, deps: &[&str]) -> TaskRecord {
    let mut record = TaskRecord::new(id, format!("{} title", id), 0);
    record.dependencies = deps.iter().map(|dep| dep.to_string()).collect();
    record
}

/// Create a record that touches the given files.
pub fn task_with_files(id: &str, deps: &[&str], files: &[&str]) -> TaskRecord {
    TaskRecord {
        files: files.iter().map(|file| file.to_string()).collect(),
        ..task(id, deps)
    }
}

/// Open a store rooted in a fresh temp directory. Keep the `TempDir` alive
/// for as long as the store is used.
pub fn temp_store() -> (TempDir, TaskStore) {
    let temp = TempDir::new().expect("tempdir");
    let store = TaskStore::open(temp.path().join("tasks")).expect("open store");
    (temp, store)
}
