//! Hierarchy construction
//!
//! Vertices are contracted one by one in priority order. Contracting `v`
//! considers every pair `u -> v -> w` of uncontracted neighbours and adds a
//! shortcut `u -> w` unless
//! - a restriction containing `v` occurs in the pair's vertex window, or
//! - a restriction-free witness of equal or lower cost exists, or
//! - an equal or cheaper parallel edge with the same inner sequences exists.
//!
//! Routes may turn around. In edge-based mode the pair `u -> v -> u` is a
//! candidate like any other and yields a loop shortcut at `u` when `u` is
//! restricted. Loops at `v` are folded into the edges arriving at `v`
//! before `v` is contracted, so a turn-around at `v` survives its removal.

use std::cmp::Reverse;
use std::time::Instant;

use priority_queue::PriorityQueue;

use super::priority::PriorityCalculator;
use super::witness::WitnessCalculator;
use super::{window_is_restricted, ContractedDb, ContractionMode, RestrictionLookup};
use crate::config::ContractionConfig;
use crate::error::{Error, Result};
use crate::graph::{DirectedGraph, EdgeId, EdgeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    Initialized,
    Running,
    Done,
}

/// A pair `from -> via -> to` that needs a shortcut
#[derive(Debug, Clone, Copy)]
pub(crate) struct PlannedShortcut {
    pub e1: EdgeId,
    pub e2: EdgeId,
    pub from: u32,
    pub to: u32,
    pub weight: f32,
}

/// Outcome of simulating the contraction of one vertex
#[derive(Debug, Default)]
pub(crate) struct ContractionPlan {
    pub shortcuts: Vec<PlannedShortcut>,
    /// Active edges to uncontracted neighbours
    pub removed: usize,
    /// Uncontracted neighbours, deduplicated
    pub neighbours: Vec<u32>,
}

/// Mutable graph state shared by the builder and the priority calculator
pub(crate) struct BuildState<'a> {
    pub graph: DirectedGraph,
    lookup: &'a dyn RestrictionLookup,
    mode: ContractionMode,
    cap: usize,
    pub contracted: Vec<bool>,
    restricted_vertex: Vec<bool>,
    witness: WitnessCalculator,
}

impl<'a> BuildState<'a> {
    fn new(
        graph: DirectedGraph,
        lookup: &'a dyn RestrictionLookup,
        mode: ContractionMode,
        cap: usize,
        max_settles: Option<usize>,
    ) -> Self {
        let n = graph.vertex_count();
        Self {
            witness: WitnessCalculator::new(n, max_settles),
            contracted: vec![false; n as usize],
            restricted_vertex: vec![false; n as usize],
            graph,
            lookup,
            mode,
            cap,
        }
    }

    /// Flag restricted vertices and every original edge touching one
    fn mark_restricted(&mut self) -> usize {
        let mut count = 0;
        for v in 0..self.graph.vertex_count() {
            if !self.lookup.restrictions(v).is_empty() {
                self.restricted_vertex[v as usize] = true;
                count += 1;
            }
        }
        for id in 0..self.graph.edge_count() as EdgeId {
            let edge = self.graph.edge(id);
            let restricted = edge.restricted
                || self.restricted_vertex[edge.from as usize]
                || self.restricted_vertex[edge.to as usize];
            self.graph.edge_mut(id).restricted = restricted;
        }
        count
    }

    /// Vertices around `via` when taking `e1` then `e2`
    fn window(&self, e1: EdgeId, via: u32, e2: EdgeId) -> Vec<u32> {
        let (first, second) = (self.graph.edge(e1), self.graph.edge(e2));
        if self.mode == ContractionMode::VertexBased {
            return vec![first.from, via, second.to];
        }
        let (left, right) = (first.sequence2(), second.sequence1());
        let mut window = Vec::with_capacity(left.len() + right.len() + 3);
        if left.len() < self.cap {
            window.push(first.from);
        }
        window.extend_from_slice(left);
        window.push(via);
        window.extend_from_slice(right);
        if right.len() < self.cap {
            window.push(second.to);
        }
        window
    }

    /// Bounded inner sequences of the shortcut `e1 + via + e2`
    fn shortcut_sequences(&self, e1: EdgeId, via: u32, e2: EdgeId) -> (Vec<u32>, Vec<u32>) {
        if self.mode == ContractionMode::VertexBased || self.cap == 0 {
            return (Vec::new(), Vec::new());
        }
        let (first, second) = (self.graph.edge(e1), self.graph.edge(e2));

        let mut seq1 = first.sequence1().to_vec();
        if seq1.len() < self.cap {
            seq1.push(via);
            seq1.extend_from_slice(second.sequence1());
        }
        seq1.truncate(self.cap);

        let mut seq2 = Vec::new();
        if second.sequence2().len() < self.cap {
            seq2.extend_from_slice(first.sequence2());
            seq2.push(via);
        }
        seq2.extend_from_slice(second.sequence2());
        let skip = seq2.len().saturating_sub(self.cap);
        seq2.drain(..skip);

        (seq1, seq2)
    }

    /// Simulate contracting `vertex` against the current graph
    pub fn plan(&mut self, vertex: u32) -> ContractionPlan {
        let graph = &self.graph;
        let contracted = &self.contracted;
        let incoming: Vec<EdgeId> = graph
            .incoming(vertex)
            .iter()
            .copied()
            .filter(|&e| {
                let from = graph.edge(e).from;
                from != vertex && !contracted[from as usize]
            })
            .collect();
        let outgoing: Vec<EdgeId> = graph
            .outgoing(vertex)
            .iter()
            .copied()
            .filter(|&e| {
                let to = graph.edge(e).to;
                to != vertex && !contracted[to as usize]
            })
            .collect();

        let mut neighbours: Vec<u32> = incoming
            .iter()
            .map(|&e| graph.edge(e).from)
            .chain(outgoing.iter().map(|&e| graph.edge(e).to))
            .collect();
        neighbours.sort_unstable();
        neighbours.dedup();

        let restrictions = if self.restricted_vertex[vertex as usize] {
            self.lookup.restrictions(vertex)
        } else {
            Vec::new()
        };

        let mut shortcuts = Vec::new();
        for &e1 in &incoming {
            let (from, w1) = (self.graph.edge(e1).from, self.graph.edge(e1).weight);
            let candidates: Vec<PlannedShortcut> = outgoing
                .iter()
                .filter_map(|&e2| {
                    let edge = self.graph.edge(e2);
                    // a loop never shortens a route unless turns are tracked
                    if edge.to == from && self.mode == ContractionMode::VertexBased {
                        return None;
                    }
                    if !restrictions.is_empty()
                        && window_is_restricted(&self.window(e1, vertex, e2), &restrictions)
                    {
                        return None;
                    }
                    Some(PlannedShortcut {
                        e1,
                        e2,
                        from,
                        to: edge.to,
                        weight: w1 + edge.weight,
                    })
                })
                .collect();
            if candidates.is_empty() {
                continue;
            }

            let witnessed = if self.restricted_vertex[from as usize] {
                vec![false; candidates.len()]
            } else {
                let targets: Vec<(u32, f32)> = candidates.iter().map(|c| (c.to, c.weight)).collect();
                self.witness
                    .calculate(&self.graph, &self.contracted, from, &targets, vertex)
            };
            shortcuts.extend(
                candidates
                    .into_iter()
                    .zip(witnessed)
                    .filter(|(c, witnessed)| !witnessed || self.restricted_vertex[c.to as usize])
                    .map(|(c, _)| c),
            );
        }

        ContractionPlan {
            removed: incoming.len() + outgoing.len(),
            shortcuts,
            neighbours,
        }
    }

    /// Extend every edge arriving at `vertex` by the loops at `vertex`.
    ///
    /// Extended edges are extended again until a parallel edge with the same
    /// inner sequences dominates them. Returns the number of edges added.
    fn fold_loops(&mut self, vertex: u32) -> usize {
        if self.mode != ContractionMode::EdgeBased {
            return 0;
        }
        let loops: Vec<EdgeId> = self
            .graph
            .outgoing(vertex)
            .iter()
            .copied()
            .filter(|&e| self.graph.edge(e).to == vertex)
            .collect();
        if loops.is_empty() {
            return 0;
        }

        let restrictions = self.lookup.restrictions(vertex);
        let mut pending: Vec<EdgeId> = self
            .graph
            .incoming(vertex)
            .iter()
            .copied()
            .filter(|&e| {
                let from = self.graph.edge(e).from;
                from != vertex && !self.contracted[from as usize]
            })
            .collect();
        let mut added = 0;
        while let Some(e1) = pending.pop() {
            if self.graph.edge(e1).superseded {
                continue;
            }
            for &l in &loops {
                if self.graph.edge(l).superseded
                    || window_is_restricted(&self.window(e1, vertex, l), &restrictions)
                {
                    continue;
                }
                let planned = PlannedShortcut {
                    e1,
                    e2: l,
                    from: self.graph.edge(e1).from,
                    to: vertex,
                    weight: self.graph.edge(e1).weight + self.graph.edge(l).weight,
                };
                if let Some(id) = self.add_shortcut(&planned, vertex) {
                    pending.push(id);
                    added += 1;
                }
            }
        }
        added
    }

    /// Insert a planned shortcut; `None` when a parallel edge dominates it
    fn add_shortcut(&mut self, planned: &PlannedShortcut, via: u32) -> Option<EdgeId> {
        let (seq1, seq2) = self.shortcut_sequences(planned.e1, via, planned.e2);
        let restricted = self.graph.edge(planned.e1).restricted
            || self.graph.edge(planned.e2).restricted
            || self.restricted_vertex[via as usize];

        let mut dominated = Vec::new();
        for &id in self.graph.outgoing(planned.from) {
            let edge = self.graph.edge(id);
            if edge.to != planned.to {
                continue;
            }
            if self.mode == ContractionMode::EdgeBased
                && (edge.sequence1() != seq1.as_slice()
                    || edge.sequence2() != seq2.as_slice()
                    || edge.restricted != restricted)
            {
                continue;
            }
            if edge.weight <= planned.weight {
                return None;
            }
            dominated.push(id);
        }
        for id in dominated {
            self.graph.supersede(id);
        }

        let id = self.graph.add_edge(
            planned.from,
            planned.to,
            planned.weight,
            EdgeKind::Shortcut {
                via,
                children: [planned.e1, planned.e2],
                seq1,
                seq2,
            },
        );
        self.graph.edge_mut(id).restricted = restricted;
        Some(id)
    }
}

/// Contracts a directed graph into a [`ContractedDb`]
pub struct HierarchyBuilder<'a> {
    state: BuilderState,
    build: BuildState<'a>,
    priorities: PriorityCalculator,
    queue: PriorityQueue<u32, Reverse<(i64, u32)>>,
    levels: Vec<u32>,
    progress_interval: usize,
}

impl<'a> HierarchyBuilder<'a> {
    pub fn new(
        graph: DirectedGraph,
        mode: ContractionMode,
        lookup: &'a dyn RestrictionLookup,
        config: &ContractionConfig,
    ) -> Self {
        let cap = match mode {
            ContractionMode::VertexBased => 0,
            ContractionMode::EdgeBased => config
                .max_sequence_len
                .unwrap_or_else(|| lookup.max_restriction_len()),
        };
        let n = graph.vertex_count();
        Self {
            state: BuilderState::Initialized,
            build: BuildState::new(graph, lookup, mode, cap, config.witness_max_settles),
            priorities: PriorityCalculator::new(n, config),
            queue: PriorityQueue::with_capacity(n as usize),
            levels: vec![0; n as usize],
            progress_interval: config.progress_interval.max(1),
        }
    }

    pub fn state(&self) -> BuilderState {
        self.state
    }

    /// Contract every vertex; can only run once
    pub fn run(&mut self) -> Result<ContractedDb> {
        if self.state != BuilderState::Initialized {
            return Err(Error::invalid_operation("hierarchy builder has already run"));
        }
        self.build.graph.validate()?;
        self.state = BuilderState::Running;

        let start = Instant::now();
        let n = self.build.graph.vertex_count();
        let original_edges = self.build.graph.edge_count();
        let span = tracing::info_span!("contraction", mode = ?self.build.mode, cap = self.build.cap);
        let _guard = span.enter();
        tracing::info!(vertices = n, edges = original_edges, "contraction started");

        let restricted = self.build.mark_restricted();
        tracing::debug!(restricted_vertices = restricted, "restrictions marked");

        for v in 0..n {
            let priority = self.priorities.calculate(&mut self.build, v);
            self.queue.push(v, Reverse((priority, v)));
        }

        let mut level = 0u32;
        let mut shortcuts = 0usize;
        while let Some((vertex, _)) = self.queue.pop() {
            shortcuts += self.build.fold_loops(vertex);
            let plan = self.build.plan(vertex);
            for planned in &plan.shortcuts {
                if self.build.add_shortcut(planned, vertex).is_some() {
                    shortcuts += 1;
                }
            }
            self.build.contracted[vertex as usize] = true;
            self.levels[vertex as usize] = level;
            level += 1;

            self.priorities.notify_contracted(vertex, &plan.neighbours);
            for &neighbour in &plan.neighbours {
                let priority = self.priorities.calculate(&mut self.build, neighbour);
                self.queue.change_priority(&neighbour, Reverse((priority, neighbour)));
            }

            if level as usize % self.progress_interval == 0 {
                tracing::debug!(
                    contracted = level,
                    remaining = self.queue.len(),
                    shortcuts,
                    "contraction progress"
                );
            }
        }

        let graph = std::mem::take(&mut self.build.graph);
        let superseded = graph.edges().iter().filter(|e| e.superseded).count();
        let db = ContractedDb::new(
            self.build.mode,
            self.build.cap,
            std::mem::take(&mut self.levels),
            graph.into_edges(),
        );
        self.state = BuilderState::Done;

        tracing::info!(
            vertices = n,
            edges = original_edges,
            shortcuts,
            superseded,
            witness_cutoffs = self.build.witness.cutoffs(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "contraction finished"
        );
        Ok(db)
    }
}
