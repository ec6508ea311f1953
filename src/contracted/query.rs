//! Bidirectional hierarchy queries
//!
//! Both searches only climb: the forward search from the source follows
//! upward edges, the backward search from the target follows downward
//! edges against their direction. Every settled label is a candidate
//! meeting point and the cheapest admissible combination wins.
//!
//! Vertex-based hierarchies key labels by vertex and only avoid forbidden
//! vertices. Edge-based hierarchies key labels by `(vertex, edge)` so a
//! vertex may be reached more than once, and every junction is checked
//! against the restrictions passing through it using the inner sequences
//! stored on shortcuts. Turning around is allowed anywhere; loop shortcuts
//! are relaxed by both searches.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use super::edge_path::EdgePath;
use super::{window_is_restricted, ContractedDb, ContractionMode, RestrictionLookup};
use crate::error::{Error, Result};
use crate::graph::{EdgeId, EdgeKind, EdgeSequences, Reversed};

/// Vertex plus the edge used to reach it (edge-based mode only)
type LabelKey = (u32, Option<EdgeId>);
type Labels = FxHashMap<LabelKey, Rc<EdgePath<f32>>>;

/// A route over original edges
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub weight: f32,
    /// Source first, target last
    pub vertices: Vec<u32>,
    /// Original edges of the contracted graph, in travel order
    pub edges: Vec<EdgeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

struct HeapEntry {
    weight: f32,
    key: LabelKey,
    path: Rc<EdgePath<f32>>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on weight
        other
            .weight
            .total_cmp(&self.weight)
            .then_with(|| other.key.cmp(&self.key))
    }
}

/// Up to `cap` vertices before the end of `path`, in travel order.
///
/// Shortcuts contribute their `seq2`; when that sequence is shorter than
/// `cap` it holds every inner vertex and the walk carries on past the
/// shortcut's start.
fn left_context<S: EdgeSequences + ?Sized>(path: &EdgePath<f32>, sequences: &S, cap: usize) -> Vec<u32> {
    let mut reversed = Vec::new();
    let mut node = path;
    while reversed.len() < cap {
        let Some(previous) = &node.from else { break };
        if let Some(edge) = node.edge.filter(|&e| sequences.is_shortcut(e)) {
            let seq2 = sequences.sequence2(edge);
            reversed.extend(seq2.iter().rev());
            if seq2.len() >= cap {
                break;
            }
        }
        reversed.push(previous.vertex);
        node = previous;
    }
    reversed.truncate(cap);
    reversed.reverse();
    reversed
}

/// Query engine over a finished hierarchy
pub struct ChQuery<'a> {
    db: &'a ContractedDb,
    lookup: &'a dyn RestrictionLookup,
}

impl<'a> ChQuery<'a> {
    pub fn new(db: &'a ContractedDb, lookup: &'a dyn RestrictionLookup) -> Self {
        Self { db, lookup }
    }

    fn edge_based(&self) -> bool {
        self.db.mode() == ContractionMode::EdgeBased
    }

    fn check_vertex(&self, vertex: u32) -> Result<()> {
        if vertex >= self.db.vertex_count() {
            return Err(Error::invalid_argument(format!(
                "vertex {vertex} is outside 0..{}",
                self.db.vertex_count()
            )));
        }
        Ok(())
    }

    /// Vertices around junction `vertex` when `path` continues over `edge`
    fn junction_window(&self, path: &EdgePath<f32>, vertex: u32, edge: EdgeId, direction: Direction) -> Vec<u32> {
        let cap = self.db.cap();
        let next = self.db.edge(edge);
        let mut window = Vec::new();
        match direction {
            Direction::Forward => {
                window.extend(left_context(path, self.db, cap));
                window.push(vertex);
                let seq1 = next.sequence1();
                window.extend_from_slice(seq1);
                if seq1.len() < cap {
                    window.push(next.to);
                }
            }
            Direction::Backward => {
                let seq2 = next.sequence2();
                if seq2.len() < cap {
                    window.push(next.from);
                }
                window.extend_from_slice(seq2);
                window.push(vertex);
                let mut right = left_context(path, &Reversed(self.db), cap);
                right.reverse();
                window.extend(right);
            }
        }
        window
    }

    /// Exhaustive upward search from `start`
    fn search(&self, start: u32, direction: Direction) -> Labels {
        let edge_based = self.edge_based();
        let mut settled = Labels::default();
        let mut best: FxHashMap<LabelKey, f32> = FxHashMap::default();
        let mut heap = BinaryHeap::new();

        best.insert((start, None), 0.0);
        heap.push(HeapEntry {
            weight: 0.0,
            key: (start, None),
            path: EdgePath::new(start),
        });

        while let Some(HeapEntry { weight, key, path }) = heap.pop() {
            if settled.contains_key(&key) || best.get(&key).is_some_and(|&w| weight > w) {
                continue;
            }
            let vertex = key.0;
            let restrictions = if edge_based {
                self.lookup.restrictions(vertex)
            } else {
                Vec::new()
            };

            let adjacent = match direction {
                Direction::Forward => self.db.up(vertex),
                Direction::Backward => self.db.down(vertex),
            };
            for &id in adjacent {
                let edge = self.db.edge(id);
                let next = match direction {
                    Direction::Forward => edge.to,
                    Direction::Backward => edge.from,
                };
                if edge_based {
                    if !restrictions.is_empty()
                        && window_is_restricted(&self.junction_window(&path, vertex, id, direction), &restrictions)
                    {
                        continue;
                    }
                } else if self.lookup.is_forbidden(next) {
                    continue;
                }

                let next_key = (next, edge_based.then_some(id));
                let next_weight = weight + edge.weight;
                if best.get(&next_key).map_or(true, |&w| next_weight < w) {
                    best.insert(next_key, next_weight);
                    heap.push(HeapEntry {
                        weight: next_weight,
                        key: next_key,
                        path: EdgePath::append(&path, Some(id), next, edge.weight),
                    });
                }
            }
            settled.insert(key, path);
        }
        settled
    }

    /// True when forward path `f` and backward path `b` may be joined
    fn can_meet(&self, vertex: u32, f: &EdgePath<f32>, b: &EdgePath<f32>, restrictions: &[Vec<u32>]) -> bool {
        if !self.edge_based() {
            return !self.lookup.is_forbidden(vertex);
        }
        if restrictions.is_empty() {
            return true;
        }
        let cap = self.db.cap();
        let mut window = left_context(f, self.db, cap);
        window.push(vertex);
        let mut right = left_context(b, &Reversed(self.db), cap);
        right.reverse();
        window.extend(right);
        !window_is_restricted(&window, restrictions)
    }

    /// Cheapest admissible meeting of two search spaces
    fn best_meeting(&self, forward: &Labels, backward: &Labels) -> Option<(Rc<EdgePath<f32>>, Rc<EdgePath<f32>>)> {
        let mut by_vertex: FxHashMap<u32, Vec<&Rc<EdgePath<f32>>>> = FxHashMap::default();
        for (&(vertex, _), path) in backward {
            by_vertex.entry(vertex).or_default().push(path);
        }

        let mut restrictions: FxHashMap<u32, Vec<Vec<u32>>> = FxHashMap::default();
        let mut best: Option<(f32, &Rc<EdgePath<f32>>, &Rc<EdgePath<f32>>)> = None;
        for (&(vertex, _), f) in forward {
            let Some(candidates) = by_vertex.get(&vertex) else {
                continue;
            };
            let local: &[Vec<u32>] = if self.edge_based() {
                restrictions
                    .entry(vertex)
                    .or_insert_with(|| self.lookup.restrictions(vertex))
                    .as_slice()
            } else {
                &[]
            };
            for &b in candidates {
                let weight = f.weight + b.weight;
                if best.is_some_and(|(w, _, _)| w <= weight) {
                    continue;
                }
                if self.can_meet(vertex, f, b, local) {
                    best = Some((weight, f, b));
                }
            }
        }
        best.map(|(_, f, b)| (Rc::clone(f), Rc::clone(b)))
    }

    /// Expand `edge` into original edges, in travel order
    fn unpack(&self, edge: EdgeId, out: &mut Vec<EdgeId>) {
        let mut stack = vec![edge];
        while let Some(id) = stack.pop() {
            match &self.db.edge(id).kind {
                EdgeKind::Original { .. } => out.push(id),
                EdgeKind::Shortcut { via, children, .. } => {
                    tracing::trace!(edge = id, via, "unpacking shortcut");
                    stack.push(children[1]);
                    stack.push(children[0]);
                }
            }
        }
    }

    fn build_route(&self, source: u32, f: &EdgePath<f32>, b: &EdgePath<f32>) -> Route {
        let mut hierarchy_edges = f.edges();
        hierarchy_edges.extend(b.edges().into_iter().rev());

        let mut edges = Vec::new();
        for id in hierarchy_edges {
            self.unpack(id, &mut edges);
        }
        let mut vertices = Vec::with_capacity(edges.len() + 1);
        vertices.push(source);
        vertices.extend(edges.iter().map(|&id| self.db.edge(id).to));

        Route {
            weight: f.weight + b.weight,
            vertices,
            edges,
        }
    }

    /// Cheapest route from `source` to `target`, `None` when unreachable
    pub fn route(&self, source: u32, target: u32) -> Result<Option<Route>> {
        self.check_vertex(source)?;
        self.check_vertex(target)?;
        if !self.edge_based() && (self.lookup.is_forbidden(source) || self.lookup.is_forbidden(target)) {
            return Ok(None);
        }

        let forward = self.search(source, Direction::Forward);
        let backward = self.search(target, Direction::Backward);
        let route = self
            .best_meeting(&forward, &backward)
            .map(|(f, b)| self.build_route(source, &f, &b));

        tracing::debug!(
            source,
            target,
            forward_settled = forward.len(),
            backward_settled = backward.len(),
            found = route.is_some(),
            "route query"
        );
        Ok(route)
    }

    /// Route weights for every source/target pair, row-major by source
    pub fn many_to_many(&self, sources: &[u32], targets: &[u32]) -> Result<Vec<Option<f32>>> {
        for &v in sources.iter().chain(targets) {
            self.check_vertex(v)?;
        }
        if self.edge_based() {
            Ok(self.many_to_many_edge_based(sources, targets))
        } else {
            Ok(self.many_to_many_buckets(sources, targets))
        }
    }

    /// Bucket join: one backward search per target, one forward per source
    fn many_to_many_buckets(&self, sources: &[u32], targets: &[u32]) -> Vec<Option<f32>> {
        let mut matrix = vec![None; sources.len() * targets.len()];

        let mut buckets: Vec<(u32, usize, f32)> = Vec::new();
        for (t, &target) in targets.iter().enumerate() {
            if self.lookup.is_forbidden(target) {
                continue;
            }
            for (&(vertex, _), path) in &self.search(target, Direction::Backward) {
                buckets.push((vertex, t, path.weight));
            }
        }
        buckets.sort_unstable_by_key(|&(vertex, _, _)| vertex);

        for (s, &source) in sources.iter().enumerate() {
            if self.lookup.is_forbidden(source) {
                continue;
            }
            let row = &mut matrix[s * targets.len()..(s + 1) * targets.len()];
            for (&(vertex, _), path) in &self.search(source, Direction::Forward) {
                let start = buckets.partition_point(|&(v, _, _)| v < vertex);
                for &(_, t, weight) in buckets[start..].iter().take_while(|&&(v, _, _)| v == vertex) {
                    let total = path.weight + weight;
                    if row[t].map_or(true, |w| total < w) {
                        row[t] = Some(total);
                    }
                }
            }
        }
        tracing::debug!(sources = sources.len(), targets = targets.len(), buckets = buckets.len(), "many-to-many");
        matrix
    }

    /// One forward search per source row, rows in parallel
    fn many_to_many_edge_based(&self, sources: &[u32], targets: &[u32]) -> Vec<Option<f32>> {
        sources
            .par_iter()
            .flat_map_iter(|&source| {
                let forward = self.search(source, Direction::Forward);
                targets
                    .iter()
                    .map(|&target| {
                        let backward = self.search(target, Direction::Backward);
                        self.best_meeting(&forward, &backward)
                            .map(|(f, b)| f.weight + b.weight)
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}
