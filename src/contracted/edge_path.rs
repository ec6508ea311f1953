//! Search paths and the inner-sequence extraction used at junctions
//!
//! An [`EdgePath`] is an immutable reverse linked list built one hop at a
//! time during a search. Every node records the vertex reached, the
//! cumulative weight and the edge used to get there.

use std::fmt::Debug;
use std::ops::Add;
use std::rc::Rc;

use crate::graph::{EdgeId, EdgeSequences};

/// Path weight: non-negative, additive, totally ordered in practice
pub trait Weight: Copy + Default + PartialOrd + Add<Output = Self> + Debug {}

impl Weight for f32 {}
impl Weight for u32 {}

#[derive(Debug, Clone)]
pub struct EdgePath<W: Weight = f32> {
    pub vertex: u32,
    pub weight: W,
    /// Edge used to reach `vertex`; `None` for the source or a virtual hop
    pub edge: Option<EdgeId>,
    pub from: Option<Rc<EdgePath<W>>>,
}

impl<W: Weight> EdgePath<W> {
    /// Single-vertex path
    pub fn new(vertex: u32) -> Rc<Self> {
        Rc::new(Self {
            vertex,
            weight: W::default(),
            edge: None,
            from: None,
        })
    }

    /// Extend `path` by one hop
    pub fn append(path: &Rc<Self>, edge: Option<EdgeId>, vertex: u32, weight: W) -> Rc<Self> {
        Rc::new(Self {
            vertex,
            weight: path.weight + weight,
            edge,
            from: Some(Rc::clone(path)),
        })
    }

    pub fn source(&self) -> u32 {
        let mut node = self;
        while let Some(from) = &node.from {
            node = from;
        }
        node.vertex
    }

    /// Number of vertices on the path
    pub fn len(&self) -> usize {
        self.nodes().len()
    }

    /// Always false; a path holds at least its source
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Nodes from source to target
    fn nodes(&self) -> Vec<&EdgePath<W>> {
        let mut nodes = vec![self];
        let mut node = self;
        while let Some(from) = &node.from {
            node = from;
            nodes.push(node);
        }
        nodes.reverse();
        nodes
    }

    pub fn vertices(&self) -> Vec<u32> {
        self.nodes().iter().map(|n| n.vertex).collect()
    }

    /// Edges from source to target, skipping virtual hops
    pub fn edges(&self) -> Vec<EdgeId> {
        self.nodes().iter().filter_map(|n| n.edge).collect()
    }
}

fn is_plain<S: EdgeSequences + ?Sized>(edge: Option<EdgeId>, sequences: &S) -> bool {
    edge.map_or(true, |e| !sequences.is_shortcut(e))
}

/// Vertices after the source, in travel order.
///
/// Plain hops contribute the vertex they reach; the first shortcut
/// contributes its `seq1` and ends the walk. When the very first hop is a
/// shortcut the last `max_count` entries of its `seq1` are returned,
/// otherwise the first `max_count` entries of the result.
pub fn get_sequence1<W: Weight, S: EdgeSequences + ?Sized>(
    path: &EdgePath<W>,
    sequences: &S,
    max_count: usize,
) -> Vec<u32> {
    let nodes = path.nodes();
    let mut result = Vec::new();
    for (i, node) in nodes.iter().enumerate().skip(1) {
        if is_plain(node.edge, sequences) {
            result.push(node.vertex);
            continue;
        }
        let Some(edge) = node.edge else { continue };
        let seq1 = sequences.sequence1(edge);
        if i == 1 {
            let skip = seq1.len().saturating_sub(max_count);
            return seq1[skip..].to_vec();
        }
        result.extend_from_slice(&seq1);
        break;
    }
    result.truncate(max_count);
    result
}

/// Vertices before the target, in travel order.
///
/// Plain hops contribute the vertex they leave from; the nearest shortcut
/// contributes its `seq2` and ends the walk. Bounded to the last
/// `max_count` entries.
pub fn get_sequence2<W: Weight, S: EdgeSequences + ?Sized>(
    path: &EdgePath<W>,
    sequences: &S,
    max_count: usize,
) -> Vec<u32> {
    let mut reversed = Vec::new();
    let mut node = path;
    while let Some(previous) = &node.from {
        match node.edge {
            Some(edge) if sequences.is_shortcut(edge) => {
                reversed.extend(sequences.sequence2(edge).iter().rev());
                break;
            }
            _ => reversed.push(previous.vertex),
        }
        if reversed.len() >= max_count {
            break;
        }
        node = previous;
    }
    reversed.truncate(max_count);
    reversed.reverse();
    reversed
}
