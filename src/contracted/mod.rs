//! Contraction hierarchies with restriction support
//!
//! Build flow:
//! 1. `DirectedGraphBuilder` turns the network + a profile into a graph
//! 2. `HierarchyBuilder` contracts it vertex by vertex, adding shortcuts
//!    only where no restriction-free witness exists
//! 3. The result is a [`ContractedDb`] holding levels, the full edge arena
//!    and an up/down CSR topology for queries
//!
//! Two modes exist. Vertex-based hierarchies can only honour single-vertex
//! restrictions; edge-based hierarchies carry bounded inner vertex
//! sequences on shortcuts so longer restrictions can be checked at
//! junctions.

mod builder;
mod edge_path;
mod hierarchy;
mod priority;
mod query;
mod witness;

use std::borrow::Cow;

pub use builder::DirectedGraphBuilder;
pub use edge_path::{get_sequence1, get_sequence2, EdgePath, Weight};
pub use hierarchy::{BuilderState, HierarchyBuilder};
pub use priority::PriorityCalculator;
pub use query::{ChQuery, Route};
pub use witness::WitnessCalculator;

use crate::graph::{DirectedEdge, EdgeId, EdgeSequences};
use crate::restrictions::RestrictionsDb;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractionMode {
    VertexBased,
    EdgeBased,
}

/// Source of the restrictions that contain a vertex
pub trait RestrictionLookup: Sync {
    /// Restrictions containing `vertex`, each in travel order
    fn restrictions(&self, vertex: u32) -> Vec<Vec<u32>>;

    /// Length of the longest restriction this lookup can return
    fn max_restriction_len(&self) -> usize;

    /// True when `vertex` may not be passed at all
    fn is_forbidden(&self, vertex: u32) -> bool {
        self.restrictions(vertex).iter().any(|r| r.len() == 1)
    }
}

/// Lookup without any restrictions
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRestrictions;

impl RestrictionLookup for NoRestrictions {
    fn restrictions(&self, _vertex: u32) -> Vec<Vec<u32>> {
        Vec::new()
    }

    fn max_restriction_len(&self) -> usize {
        0
    }
}

impl RestrictionLookup for RestrictionsDb {
    fn restrictions(&self, vertex: u32) -> Vec<Vec<u32>> {
        self.restrictions_for(vertex).map(|r| r.to_vec()).collect()
    }

    fn max_restriction_len(&self) -> usize {
        RestrictionsDb::max_restriction_len(self)
    }
}

/// True when some restriction occurs contiguously in `window`
pub(crate) fn window_is_restricted(window: &[u32], restrictions: &[Vec<u32>]) -> bool {
    restrictions
        .iter()
        .any(|r| !r.is_empty() && r.len() <= window.len() && window.windows(r.len()).any(|w| w == r.as_slice()))
}

/// Upward and downward adjacency in CSR form; loops appear in both
#[derive(Debug, Clone, Default)]
pub struct ChTopo {
    /// `up_edges[up_offsets[u]..up_offsets[u+1]]`: edges `u -> v`, level(v) > level(u)
    pub up_offsets: Vec<u64>,
    pub up_edges: Vec<EdgeId>,
    /// `down_edges[down_offsets[v]..down_offsets[v+1]]`: edges `u -> v`, level(u) > level(v)
    pub down_offsets: Vec<u64>,
    pub down_edges: Vec<EdgeId>,
}

impl ChTopo {
    fn build(levels: &[u32], edges: &[DirectedEdge]) -> Self {
        let n = levels.len();
        let mut up: Vec<Vec<EdgeId>> = vec![Vec::new(); n];
        let mut down: Vec<Vec<EdgeId>> = vec![Vec::new(); n];
        for (id, edge) in edges.iter().enumerate() {
            if edge.superseded {
                continue;
            }
            let (from, to) = (edge.from as usize, edge.to as usize);
            if from == to {
                // loops serve both searches
                up[from].push(id as EdgeId);
                down[to].push(id as EdgeId);
            } else if levels[to] > levels[from] {
                up[from].push(id as EdgeId);
            } else {
                down[to].push(id as EdgeId);
            }
        }

        let (up_offsets, up_edges) = to_csr(up);
        let (down_offsets, down_edges) = to_csr(down);
        Self {
            up_offsets,
            up_edges,
            down_offsets,
            down_edges,
        }
    }
}

fn to_csr(lists: Vec<Vec<EdgeId>>) -> (Vec<u64>, Vec<EdgeId>) {
    let mut offsets = Vec::with_capacity(lists.len() + 1);
    let mut flat = Vec::with_capacity(lists.iter().map(Vec::len).sum());
    offsets.push(0u64);
    for list in lists {
        flat.extend(list);
        offsets.push(flat.len() as u64);
    }
    (offsets, flat)
}

/// A finished hierarchy
#[derive(Debug, Clone)]
pub struct ContractedDb {
    mode: ContractionMode,
    cap: usize,
    levels: Vec<u32>,
    edges: Vec<DirectedEdge>,
    topo: ChTopo,
}

impl ContractedDb {
    pub fn new(mode: ContractionMode, cap: usize, levels: Vec<u32>, edges: Vec<DirectedEdge>) -> Self {
        let topo = ChTopo::build(&levels, &edges);
        Self {
            mode,
            cap,
            levels,
            edges,
            topo,
        }
    }

    pub fn mode(&self) -> ContractionMode {
        self.mode
    }

    /// Bound on inner sequence length
    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn vertex_count(&self) -> u32 {
        self.levels.len() as u32
    }

    pub fn level(&self, vertex: u32) -> u32 {
        self.levels[vertex as usize]
    }

    pub fn levels(&self) -> &[u32] {
        &self.levels
    }

    pub fn edge(&self, id: EdgeId) -> &DirectedEdge {
        &self.edges[id as usize]
    }

    pub fn edges(&self) -> &[DirectedEdge] {
        &self.edges
    }

    pub fn shortcut_count(&self) -> usize {
        self.edges.iter().filter(|e| e.is_shortcut()).count()
    }

    pub fn topo(&self) -> &ChTopo {
        &self.topo
    }

    /// Edges `vertex -> v` towards higher levels
    pub fn up(&self, vertex: u32) -> &[EdgeId] {
        let start = self.topo.up_offsets[vertex as usize] as usize;
        let end = self.topo.up_offsets[vertex as usize + 1] as usize;
        &self.topo.up_edges[start..end]
    }

    /// Edges `u -> vertex` from higher levels
    pub fn down(&self, vertex: u32) -> &[EdgeId] {
        let start = self.topo.down_offsets[vertex as usize] as usize;
        let end = self.topo.down_offsets[vertex as usize + 1] as usize;
        &self.topo.down_edges[start..end]
    }
}

impl EdgeSequences for ContractedDb {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeKind;

    #[test]
    fn test_window_matching_is_contiguous() {
        let restrictions = vec![vec![2, 3, 4]];
        assert!(window_is_restricted(&[1, 2, 3, 4, 5], &restrictions));
        assert!(!window_is_restricted(&[2, 3, 5, 4], &restrictions));
        assert!(!window_is_restricted(&[4, 3, 2], &restrictions));
        assert!(!window_is_restricted(&[2, 3], &restrictions));
        assert!(window_is_restricted(&[7], &[vec![7]]));
    }

    #[test]
    fn test_restrictions_db_lookup() {
        let mut db = RestrictionsDb::new(16);
        db.add(&[4]).unwrap();
        db.add(&[1, 4, 2]).unwrap();
        assert!(db.is_forbidden(4));
        assert!(!db.is_forbidden(1));
        assert_eq!(RestrictionLookup::restrictions(&db, 2), vec![vec![1, 4, 2]]);
        assert_eq!(RestrictionLookup::max_restriction_len(&db), 3);
        assert!(!NoRestrictions.is_forbidden(4));
    }

    #[test]
    fn test_topology_split_by_level() {
        let edge = |from, to| DirectedEdge {
            from,
            to,
            weight: 1.0,
            kind: EdgeKind::Original { base_edge: 0 },
            restricted: false,
            superseded: false,
        };
        let mut edges = vec![edge(0, 1), edge(1, 0), edge(1, 2), edge(0, 2), edge(1, 1)];
        edges[3].superseded = true;
        // levels: 0 < 2 < 1
        let db = ContractedDb::new(ContractionMode::VertexBased, 0, vec![0, 2, 1], edges);

        assert_eq!(db.up(0), &[0]);
        assert_eq!(db.down(0), &[1]);
        assert_eq!(db.down(2), &[2]);
        assert!(db.up(2).is_empty());
        assert_eq!(db.up(1), &[4]);
        assert_eq!(db.down(1), &[4]);
        assert_eq!(db.topo().up_edges.len() + db.topo().down_edges.len(), 5);
    }
}
