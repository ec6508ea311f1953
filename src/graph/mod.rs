//! Directed weighted graph over an edge arena
//!
//! Holds original edges (one per allowed direction of a network edge) and
//! shortcuts added during contraction. Superseded edges leave the adjacency
//! lists but stay in the arena, so shortcut children always resolve.

use std::borrow::Cow;

use crate::error::{Error, Result};

/// Index into the edge arena
pub type EdgeId = u32;

#[derive(Debug, Clone, PartialEq)]
pub enum EdgeKind {
    /// Copy of a network edge in one direction
    Original { base_edge: u32 },
    /// Replaces `children[0]` (from -> via) followed by `children[1]` (via -> to)
    Shortcut {
        via: u32,
        children: [EdgeId; 2],
        /// First inner vertices, in travel order
        seq1: Vec<u32>,
        /// Last inner vertices, in travel order
        seq2: Vec<u32>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectedEdge {
    pub from: u32,
    pub to: u32,
    pub weight: f32,
    pub kind: EdgeKind,
    /// Some vertex of the full expansion takes part in a restriction
    pub restricted: bool,
    pub superseded: bool,
}

impl DirectedEdge {
    pub fn is_shortcut(&self) -> bool {
        matches!(self.kind, EdgeKind::Shortcut { .. })
    }

    pub fn sequence1(&self) -> &[u32] {
        match &self.kind {
            EdgeKind::Original { .. } => &[],
            EdgeKind::Shortcut { seq1, .. } => seq1,
        }
    }

    pub fn sequence2(&self) -> &[u32] {
        match &self.kind {
            EdgeKind::Original { .. } => &[],
            EdgeKind::Shortcut { seq2, .. } => seq2,
        }
    }
}

/// Access to the inner vertex sequences of edges.
///
/// Original edges have empty sequences.
pub trait EdgeSequences {
    fn is_shortcut(&self, edge: EdgeId) -> bool;

    /// First inner vertices of `edge`, in travel order
    fn sequence1(&self, edge: EdgeId) -> Cow<'_, [u32]>;

    /// Last inner vertices of `edge`, in travel order
    fn sequence2(&self, edge: EdgeId) -> Cow<'_, [u32]>;
}

impl EdgeSequences for [DirectedEdge] {
    fn is_shortcut(&self, edge: EdgeId) -> bool {
        self[edge as usize].is_shortcut()
    }

    fn sequence1(&self, edge: EdgeId) -> Cow<'_, [u32]> {
        Cow::Borrowed(self[edge as usize].sequence1())
    }

    fn sequence2(&self, edge: EdgeId) -> Cow<'_, [u32]> {
        Cow::Borrowed(self[edge as usize].sequence2())
    }
}

/// View of edges traversed against their direction.
///
/// Travel order flips, so the reversed `seq1` is the original `seq2`
/// backwards and vice versa.
pub struct Reversed<'a, S: ?Sized>(pub &'a S);

impl<S: EdgeSequences + ?Sized> EdgeSequences for Reversed<'_, S> {
    fn is_shortcut(&self, edge: EdgeId) -> bool {
        self.0.is_shortcut(edge)
    }

    fn sequence1(&self, edge: EdgeId) -> Cow<'_, [u32]> {
        let mut seq = self.0.sequence2(edge).into_owned();
        seq.reverse();
        Cow::Owned(seq)
    }

    fn sequence2(&self, edge: EdgeId) -> Cow<'_, [u32]> {
        let mut seq = self.0.sequence1(edge).into_owned();
        seq.reverse();
        Cow::Owned(seq)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DirectedGraph {
    vertex_count: u32,
    edges: Vec<DirectedEdge>,
    outgoing: Vec<Vec<EdgeId>>,
    incoming: Vec<Vec<EdgeId>>,
}

impl DirectedGraph {
    pub fn new(vertex_count: u32) -> Self {
        Self {
            vertex_count,
            edges: Vec::new(),
            outgoing: vec![Vec::new(); vertex_count as usize],
            incoming: vec![Vec::new(); vertex_count as usize],
        }
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Size of the arena, superseded edges included
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Add an edge; endpoints outside the vertex range are kept in the arena
    /// and reported by [`validate`](Self::validate)
    pub fn add_edge(&mut self, from: u32, to: u32, weight: f32, kind: EdgeKind) -> EdgeId {
        let id = self.edges.len() as EdgeId;
        self.edges.push(DirectedEdge {
            from,
            to,
            weight,
            kind,
            restricted: false,
            superseded: false,
        });
        if from < self.vertex_count && to < self.vertex_count {
            self.outgoing[from as usize].push(id);
            self.incoming[to as usize].push(id);
        }
        id
    }

    pub fn edge(&self, id: EdgeId) -> &DirectedEdge {
        &self.edges[id as usize]
    }

    pub(crate) fn edge_mut(&mut self, id: EdgeId) -> &mut DirectedEdge {
        &mut self.edges[id as usize]
    }

    pub fn edges(&self) -> &[DirectedEdge] {
        &self.edges
    }

    /// Active edges leaving `vertex`
    pub fn outgoing(&self, vertex: u32) -> &[EdgeId] {
        &self.outgoing[vertex as usize]
    }

    /// Active edges arriving at `vertex`
    pub fn incoming(&self, vertex: u32) -> &[EdgeId] {
        &self.incoming[vertex as usize]
    }

    /// Take an edge out of the adjacency lists, keeping it in the arena
    pub fn supersede(&mut self, id: EdgeId) {
        let edge = &mut self.edges[id as usize];
        if edge.superseded {
            return;
        }
        edge.superseded = true;
        let (from, to) = (edge.from as usize, edge.to as usize);
        if let Some(out) = self.outgoing.get_mut(from) {
            out.retain(|&e| e != id);
        }
        if let Some(inc) = self.incoming.get_mut(to) {
            inc.retain(|&e| e != id);
        }
    }

    /// Check the preconditions of contraction
    pub fn validate(&self) -> Result<()> {
        for (id, edge) in self.edges.iter().enumerate() {
            if edge.from >= self.vertex_count || edge.to >= self.vertex_count {
                return Err(Error::MalformedGraph(format!(
                    "edge {id} ({} -> {}) references a vertex outside 0..{}",
                    edge.from, edge.to, self.vertex_count
                )));
            }
            if !edge.weight.is_finite() || edge.weight < 0.0 {
                return Err(Error::MalformedGraph(format!(
                    "edge {id} has invalid weight {}",
                    edge.weight
                )));
            }
            if let EdgeKind::Shortcut { children, .. } = &edge.kind {
                if children.iter().any(|&c| c as usize >= self.edges.len()) {
                    return Err(Error::MalformedGraph(format!(
                        "shortcut {id} references a missing child"
                    )));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn into_edges(self) -> Vec<DirectedEdge> {
        self.edges
    }
}

impl EdgeSequences for DirectedGraph {
    fn is_shortcut(&self, edge: EdgeId) -> bool {
        self.edges.as_slice().is_shortcut(edge)
    }

    fn sequence1(&self, edge: EdgeId) -> Cow<'_, [u32]> {
        self.edges.as_slice().sequence1(edge)
    }

    fn sequence2(&self, edge: EdgeId) -> Cow<'_, [u32]> {
        self.edges.as_slice().sequence2(edge)
    }
}
