//! Witness search
//!
//! A bounded Dijkstra from the source of a candidate shortcut over the
//! remaining graph. It never enters contracted vertices, the vertex being
//! contracted, or edges touching a restricted vertex, so any witness it
//! finds is free of restrictions.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::graph::DirectedGraph;

#[derive(Clone, Copy)]
struct DistEntry {
    dist: f32,
    version: u32,
}

#[derive(Clone, Copy)]
struct DijkstraState {
    vertex: u32,
    cost: f32,
}

impl PartialEq for DijkstraState {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DijkstraState {}

impl PartialOrd for DijkstraState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DijkstraState {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: reverse ordering, lowest vertex first on ties
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.vertex.cmp(&self.vertex))
    }
}

/// Reusable bounded Dijkstra for witness queries
pub struct WitnessCalculator {
    dist: Vec<DistEntry>,
    version: u32,
    heap: BinaryHeap<DijkstraState>,
    max_settles: Option<usize>,
    /// Searches cut short by the settle cap
    cutoffs: u64,
}

impl WitnessCalculator {
    pub fn new(vertex_count: u32, max_settles: Option<usize>) -> Self {
        Self {
            dist: vec![
                DistEntry {
                    dist: f32::INFINITY,
                    version: 0
                };
                vertex_count as usize
            ],
            version: 0,
            heap: BinaryHeap::with_capacity(64),
            max_settles,
            cutoffs: 0,
        }
    }

    pub fn cutoffs(&self) -> u64 {
        self.cutoffs
    }

    fn reset(&mut self) {
        self.version = self.version.wrapping_add(1);
        if self.version == 0 {
            for entry in &mut self.dist {
                entry.version = 0;
            }
            self.version = 1;
        }
        self.heap.clear();
    }

    fn get_dist(&self, vertex: u32) -> f32 {
        let entry = &self.dist[vertex as usize];
        if entry.version == self.version {
            entry.dist
        } else {
            f32::INFINITY
        }
    }

    fn set_dist(&mut self, vertex: u32, dist: f32) {
        self.dist[vertex as usize] = DistEntry {
            dist,
            version: self.version,
        };
    }

    /// For each `(target, max_weight)`, whether a path of at most
    /// `max_weight` exists from `source` avoiding `excluded`
    pub fn calculate(
        &mut self,
        graph: &DirectedGraph,
        contracted: &[bool],
        source: u32,
        targets: &[(u32, f32)],
        excluded: u32,
    ) -> Vec<bool> {
        let mut found = vec![false; targets.len()];
        let Some(bound) = targets.iter().map(|&(_, w)| w).reduce(f32::max) else {
            return found;
        };

        self.reset();
        self.set_dist(source, 0.0);
        self.heap.push(DijkstraState {
            vertex: source,
            cost: 0.0,
        });

        let mut settled = 0usize;
        while let Some(DijkstraState { vertex, cost }) = self.heap.pop() {
            if cost > self.get_dist(vertex) {
                continue;
            }
            if cost > bound {
                break;
            }
            settled += 1;
            if self.max_settles.is_some_and(|max| settled > max) {
                self.cutoffs += 1;
                tracing::trace!(source, excluded, settled, "witness search hit settle cap");
                break;
            }

            for &id in graph.outgoing(vertex) {
                let edge = graph.edge(id);
                let next = edge.to;
                if edge.restricted || next == excluded || contracted[next as usize] {
                    continue;
                }
                let next_cost = cost + edge.weight;
                if next_cost <= bound && next_cost < self.get_dist(next) {
                    self.set_dist(next, next_cost);
                    self.heap.push(DijkstraState {
                        vertex: next,
                        cost: next_cost,
                    });
                }
            }
        }

        for (i, &(target, max_weight)) in targets.iter().enumerate() {
            found[i] = self.get_dist(target) <= max_weight;
        }
        found
    }

    /// Single-target form of [`calculate`](Self::calculate)
    pub fn exists(
        &mut self,
        graph: &DirectedGraph,
        contracted: &[bool],
        source: u32,
        target: u32,
        excluded: u32,
        max_weight: f32,
    ) -> bool {
        self.calculate(graph, contracted, source, &[(target, max_weight)], excluded)[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeKind;

    fn graph(edges: &[(u32, u32, f32)], vertex_count: u32) -> DirectedGraph {
        let mut graph = DirectedGraph::new(vertex_count);
        for (i, &(from, to, weight)) in edges.iter().enumerate() {
            graph.add_edge(from, to, weight, EdgeKind::Original { base_edge: i as u32 });
        }
        graph
    }

    #[test]
    fn test_witness_found_and_equal_cost_counts() {
        // 0 -> 1 -> 2 costs 2, alternative 0 -> 3 -> 2 costs 2
        let g = graph(&[(0, 1, 1.0), (1, 2, 1.0), (0, 3, 1.0), (3, 2, 1.0)], 4);
        let contracted = vec![false; 4];
        let mut witness = WitnessCalculator::new(4, None);
        assert!(witness.exists(&g, &contracted, 0, 2, 1, 2.0));
        assert!(!witness.exists(&g, &contracted, 0, 2, 1, 1.5));
    }

    #[test]
    fn test_witness_is_directed() {
        let g = graph(&[(0, 1, 1.0), (1, 2, 1.0), (0, 3, 1.0), (3, 2, 1.0)], 4);
        let contracted = vec![false; 4];
        let mut witness = WitnessCalculator::new(4, None);
        assert!(!witness.exists(&g, &contracted, 2, 0, 1, 10.0));
    }

    #[test]
    fn test_skips_contracted_and_restricted() {
        let mut g = graph(&[(0, 1, 1.0), (1, 2, 1.0), (0, 3, 1.0), (3, 2, 1.0)], 4);
        let mut contracted = vec![false; 4];
        let mut witness = WitnessCalculator::new(4, None);

        contracted[3] = true;
        assert!(!witness.exists(&g, &contracted, 0, 2, 1, 5.0));

        contracted[3] = false;
        g.edge_mut(3).restricted = true;
        assert!(!witness.exists(&g, &contracted, 0, 2, 1, 5.0));
    }

    #[test]
    fn test_batched_targets() {
        let g = graph(&[(0, 1, 1.0), (1, 2, 1.0), (1, 3, 4.0), (0, 4, 1.0), (4, 2, 1.0)], 5);
        let contracted = vec![false; 5];
        let mut witness = WitnessCalculator::new(5, None);
        let found = witness.calculate(&g, &contracted, 0, &[(2, 2.0), (3, 5.0)], 1);
        assert_eq!(found, vec![true, false]);
    }

    #[test]
    fn test_settle_cap() {
        let g = graph(&[(0, 1, 1.0), (1, 2, 1.0), (2, 3, 1.0), (3, 4, 1.0)], 5);
        let contracted = vec![false; 5];
        let mut witness = WitnessCalculator::new(5, Some(2));
        assert!(!witness.exists(&g, &contracted, 0, 4, 9, 10.0));
        assert_eq!(witness.cutoffs(), 1);

        let mut unbounded = WitnessCalculator::new(5, None);
        assert!(unbounded.exists(&g, &contracted, 0, 4, 9, 10.0));
    }
}
