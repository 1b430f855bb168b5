//! Persisted unit format: YAML front matter plus Markdown sections.
//!
//! ```text
//! ---
//! id: T001
//! title: Create project skeleton
//! status: pending
//! files:
//! - src/lib.rs
//! ---
//!
//! # T001: Create project skeleton
//!
//! ## Implementation Plan
//! ...
//! ## Notes
//! ```

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::{TaskRecord, TaskStatus};

const FENCE: &str = "---";

/// Structured metadata block of a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitMetadata {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<u32>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inferred_dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_dependencies: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
}

impl UnitMetadata {
    /// Metadata for `record`, carrying `status` over from an existing unit.
    pub fn from_record(record: &TaskRecord, status: TaskStatus) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            status,
            phase: record.phase.clone(),
            story: record.story.clone(),
            priority: record.priority,
            parallel: record.parallel,
            cost: record.cost,
            dependencies: record.dependencies.clone(),
            inferred_dependencies: record.inferred_dependencies.clone(),
            external_dependencies: record.external_dependencies.clone(),
            files: record.files.clone(),
        }
    }
}

/// Render a complete unit document.
pub fn render_unit(meta: &UnitMetadata) -> Result<String> {
    let yaml = serde_yaml::to_string(meta)
        .with_context(|| format!("serialize metadata for task {}", meta.id))?;

    let mut out = String::new();
    out.push_str(FENCE);
    out.push('\n');
    out.push_str(&yaml);
    out.push_str(FENCE);
    out.push_str("\n\n");
    out.push_str(&format!("# {}: {}\n\n", meta.id, meta.title));
    out.push_str("## Implementation Plan\n\n");
    if meta.files.is_empty() {
        out.push_str("_Not planned yet._\n");
    } else {
        for file in &meta.files {
            out.push_str(&format!("- [ ] Update `{file}`\n"));
        }
    }
    out.push_str("\n## Notes\n\n_None._\n");
    Ok(out)
}

/// Parse the metadata block of a unit document.
pub fn parse_unit(content: &str) -> Result<UnitMetadata> {
    let (yaml, _body) = split_front_matter(content)?;
    serde_yaml::from_str(yaml).context("parse unit metadata")
}

fn split_front_matter(content: &str) -> Result<(&str, &str)> {
    let rest = content
        .strip_prefix(FENCE)
        .and_then(|rest| rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n")))
        .ok_or_else(|| anyhow!("unit is missing the opening '{FENCE}' fence"))?;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FENCE {
            return Ok((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    Err(anyhow!("unit is missing the closing '{FENCE}' fence"))
}
