//! Project configuration stored in `taskgraph.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use crate::core::types::{ConflictPolicy, ErrorMode, Grouping};

/// Default config filename, looked up in the working directory.
pub const CONFIG_FILE: &str = "taskgraph.toml";

/// Generation defaults (TOML). Every field may be overridden on the command
/// line; missing fields fall back to [`TaskgraphConfig::default`].
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TaskgraphConfig {
    /// Directory holding one Markdown unit per task.
    pub store_dir: PathBuf,
    pub grouping: Grouping,
    pub conflict_policy: ConflictPolicy,
    pub error_mode: ErrorMode,
    /// Order tasks that touch the same file by declaration order.
    pub infer_file_dependencies: bool,
}

impl Default for TaskgraphConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("tasks"),
            grouping: Grouping::ByPhase,
            conflict_policy: ConflictPolicy::Fail,
            error_mode: ErrorMode::Strict,
            infer_file_dependencies: false,
        }
    }
}

impl TaskgraphConfig {
    pub fn validate(&self) -> Result<()> {
        if self.store_dir.as_os_str().is_empty() {
            return Err(anyhow!("store_dir must not be empty"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `TaskgraphConfig::default()`.
pub fn load_config(path: &Path) -> Result<TaskgraphConfig> {
    if !path.exists() {
        let cfg = TaskgraphConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: TaskgraphConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}
