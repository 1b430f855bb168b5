//! Presentation grouping of an ordered task set.
//!
//! Groups never influence ordering or batching; they only partition the
//! already-ordered ids.

use serde::Serialize;

use crate::core::types::{Grouping, TaskRecord};

pub const UNPHASED: &str = "Unphased";
pub const UNASSIGNED: &str = "Unassigned";
pub const ALL: &str = "All";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskGroup {
    pub name: String,
    pub task_ids: Vec<String>,
}

/// Partition `ordered` into groups. Group order follows the first appearance
/// of each group in `ordered`; ids keep their relative order.
pub fn group_tasks(ordered: &[&TaskRecord], grouping: Grouping) -> Vec<TaskGroup> {
    let mut groups: Vec<TaskGroup> = Vec::new();
    for record in ordered {
        let name = match grouping {
            Grouping::ByPhase => record.phase.as_deref().unwrap_or(UNPHASED),
            Grouping::ByStory => record.story.as_deref().unwrap_or(UNASSIGNED),
            Grouping::Flat => ALL,
        };
        match groups.iter_mut().find(|group| group.name == name) {
            Some(group) => group.task_ids.push(record.id.clone()),
            None => groups.push(TaskGroup {
                name: name.to_string(),
                task_ids: vec![record.id.clone()],
            }),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::task;

    fn sample() -> Vec<TaskRecord> {
        let mut a = task("A", &[]);
        a.phase = Some("Setup".to_string());
        let mut b = task("B", &[]);
        b.phase = Some("Build".to_string());
        b.story = Some("US1".to_string());
        let mut c = task("C", &[]);
        c.phase = Some("Setup".to_string());
        let d = task("D", &[]);
        vec![a, b, c, d]
    }

    #[test]
    fn by_phase_keeps_order_within_groups() {
        let records = sample();
        let ordered: Vec<&TaskRecord> = records.iter().collect();
        let groups = group_tasks(&ordered, Grouping::ByPhase);
        let summary: Vec<(&str, Vec<&str>)> = groups
            .iter()
            .map(|g| {
                (
                    g.name.as_str(),
                    g.task_ids.iter().map(String::as_str).collect(),
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Setup", vec!["A", "C"]),
                ("Build", vec!["B"]),
                (UNPHASED, vec!["D"]),
            ]
        );
    }

    #[test]
    fn by_story_and_flat() {
        let records = sample();
        let ordered: Vec<&TaskRecord> = records.iter().collect();
        let by_story = group_tasks(&ordered, Grouping::ByStory);
        assert_eq!(by_story[0].name, UNASSIGNED);
        assert_eq!(by_story[0].task_ids, vec!["A", "C", "D"]);
        assert_eq!(by_story[1].name, "US1");

        let flat = group_tasks(&ordered, Grouping::Flat);
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].task_ids.len(), 4);
    }
}
