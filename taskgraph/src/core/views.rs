//! Derived views over a validated graph: order, batches, critical path.
//!
//! All three are pure queries. Ties are broken by phase order, then priority
//! (lower rank first, unranked last), then declaration order, so identical
//! input always yields identical output.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use serde::Serialize;

use crate::core::graph::TaskGraph;

/// Tasks at the same dependency depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Batch {
    pub level: usize,
    pub task_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CriticalPath {
    pub task_ids: Vec<String>,
    /// Sum of task weights along the path.
    pub length: u64,
}

type SortKey = (u32, u8, usize, usize);

impl TaskGraph {
    fn sort_key(&self, idx: usize) -> SortKey {
        let node = &self.nodes[idx];
        (
            node.phase_order,
            node.priority.unwrap_or(u8::MAX),
            node.line,
            idx,
        )
    }

    /// Kahn's algorithm with a min-heap over the tie-break key.
    pub(crate) fn topological_indices(&self) -> Vec<usize> {
        let mut remaining: Vec<usize> = self.prerequisites.iter().map(Vec::len).collect();
        let mut ready: BinaryHeap<Reverse<SortKey>> = remaining
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(idx, _)| Reverse(self.sort_key(idx)))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse((_, _, _, idx))) = ready.pop() {
            order.push(idx);
            for &next in &self.dependents[idx] {
                remaining[next] -= 1;
                if remaining[next] == 0 {
                    ready.push(Reverse(self.sort_key(next)));
                }
            }
        }
        order
    }

    /// Every task id, prerequisites first.
    pub fn topological_order(&self) -> Vec<&str> {
        self.topological_indices()
            .into_iter()
            .map(|idx| self.nodes[idx].id.as_str())
            .collect()
    }

    /// Level of each task by arena index: 0 without prerequisites, otherwise
    /// one more than the deepest prerequisite.
    pub(crate) fn levels(&self) -> Vec<usize> {
        let mut levels = vec![0; self.nodes.len()];
        for idx in self.topological_indices() {
            levels[idx] = self.prerequisites[idx]
                .iter()
                .map(|&prev| levels[prev] + 1)
                .max()
                .unwrap_or(0);
        }
        levels
    }

    pub fn level_of(&self, id: &str) -> Option<usize> {
        let idx = *self.index.get(id)?;
        self.levels().get(idx).copied()
    }

    /// Tasks grouped by level, in increasing level order. Within a batch,
    /// tasks keep their topological position.
    pub fn batches(&self) -> Vec<Batch> {
        let levels = self.levels();
        let mut batches: Vec<Batch> = Vec::new();
        for idx in self.topological_indices() {
            let level = levels[idx];
            while batches.len() <= level {
                batches.push(Batch {
                    level: batches.len(),
                    task_ids: Vec::new(),
                });
            }
            batches[level].task_ids.push(self.nodes[idx].id.clone());
        }
        batches
    }

    /// Longest weighted path, by dynamic programming over topological order.
    pub fn critical_path(&self) -> CriticalPath {
        let order = self.topological_indices();
        let mut position = vec![0; self.nodes.len()];
        for (pos, &idx) in order.iter().enumerate() {
            position[idx] = pos;
        }

        let mut best = vec![0u64; self.nodes.len()];
        let mut via: Vec<Option<usize>> = vec![None; self.nodes.len()];
        for &idx in &order {
            let prev = self.prerequisites[idx]
                .iter()
                .copied()
                .max_by(|&a, &b| best[a].cmp(&best[b]).then(position[b].cmp(&position[a])));
            best[idx] = self.nodes[idx].weight() + prev.map_or(0, |p| best[p]);
            via[idx] = prev;
        }

        let Some(end) = order
            .iter()
            .copied()
            .max_by(|&a, &b| best[a].cmp(&best[b]).then(position[b].cmp(&position[a])))
        else {
            return CriticalPath::default();
        };

        let mut task_ids = vec![self.nodes[end].id.clone()];
        let mut current = end;
        while let Some(prev) = via[current] {
            task_ids.push(self.nodes[prev].id.clone());
            current = prev;
        }
        task_ids.reverse();
        CriticalPath {
            task_ids,
            length: best[end],
        }
    }
}
