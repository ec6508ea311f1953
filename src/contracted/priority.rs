//! Contraction order heuristic
//!
//! ```text
//! priority = difference_factor * (shortcuts_added - edges_removed)
//!          + depth_factor      * depth(v)
//!          + contracted_factor * contracted_neighbours(v)
//! ```
//!
//! Lower priorities are contracted first.

use super::hierarchy::BuildState;
use crate::config::ContractionConfig;

pub struct PriorityCalculator {
    difference_factor: i64,
    depth_factor: i64,
    contracted_factor: i64,
    depth: Vec<i64>,
    contracted_neighbours: Vec<i64>,
}

impl PriorityCalculator {
    pub fn new(vertex_count: u32, config: &ContractionConfig) -> Self {
        Self {
            difference_factor: config.difference_factor,
            depth_factor: config.depth_factor,
            contracted_factor: config.contracted_factor,
            depth: vec![0; vertex_count as usize],
            contracted_neighbours: vec![0; vertex_count as usize],
        }
    }

    /// Priority of `vertex` given its simulated contraction
    pub fn priority(&self, vertex: u32, shortcuts_added: usize, edges_removed: usize) -> i64 {
        let v = vertex as usize;
        self.difference_factor * (shortcuts_added as i64 - edges_removed as i64)
            + self.depth_factor * self.depth[v]
            + self.contracted_factor * self.contracted_neighbours[v]
    }

    /// Simulate contracting `vertex` and score it
    pub(crate) fn calculate(&self, state: &mut BuildState<'_>, vertex: u32) -> i64 {
        let plan = state.plan(vertex);
        self.priority(vertex, plan.shortcuts.len(), plan.removed)
    }

    /// Record that `vertex` was contracted with these uncontracted neighbours
    pub fn notify_contracted(&mut self, vertex: u32, neighbours: &[u32]) {
        let depth = self.depth[vertex as usize] + 1;
        for &n in neighbours {
            let n = n as usize;
            self.contracted_neighbours[n] += 1;
            self.depth[n] = self.depth[n].max(depth);
        }
    }

    pub fn depth(&self, vertex: u32) -> i64 {
        self.depth[vertex as usize]
    }

    pub fn contracted_neighbours(&self, vertex: u32) -> i64 {
        self.contracted_neighbours[vertex as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_formula() {
        let calculator = PriorityCalculator::new(3, &ContractionConfig::default());
        assert_eq!(calculator.priority(0, 1, 4), -15);
        assert_eq!(calculator.priority(0, 0, 0), 0);
    }

    #[test]
    fn test_notify_updates_depth_and_counts() {
        let mut calculator = PriorityCalculator::new(4, &ContractionConfig::default());
        calculator.notify_contracted(0, &[1, 2]);
        assert_eq!(calculator.depth(1), 1);
        assert_eq!(calculator.contracted_neighbours(2), 1);

        calculator.notify_contracted(1, &[2, 3]);
        assert_eq!(calculator.depth(2), 2);
        assert_eq!(calculator.depth(3), 2);
        assert_eq!(calculator.contracted_neighbours(2), 2);
        // 5 * (2 - 1) + 5 * 2 + 8 * 2
        assert_eq!(calculator.priority(2, 2, 1), 31);
    }

    #[test]
    fn test_depth_never_decreases() {
        let mut calculator = PriorityCalculator::new(3, &ContractionConfig::default());
        calculator.notify_contracted(0, &[1]);
        calculator.notify_contracted(1, &[2]);
        calculator.notify_contracted(0, &[2]);
        assert_eq!(calculator.depth(2), 2);
    }
}
