//! Network + profile -> directed weighted graph

use rustc_hash::FxHashMap;

use crate::attributes::AttributesIndex;
use crate::error::Result;
use crate::graph::{DirectedGraph, EdgeKind};
use crate::network::RoutingNetwork;
use crate::profiles::{Direction, Factor, Profile};

pub struct DirectedGraphBuilder<'a> {
    network: &'a RoutingNetwork,
    edge_profiles: &'a AttributesIndex,
    profile: &'a dyn Profile,
}

impl<'a> DirectedGraphBuilder<'a> {
    pub fn new(network: &'a RoutingNetwork, edge_profiles: &'a AttributesIndex, profile: &'a dyn Profile) -> Self {
        Self {
            network,
            edge_profiles,
            profile,
        }
    }

    /// Weight every network edge once and insert the allowed directions
    pub fn run(&self) -> Result<DirectedGraph> {
        let mut graph = DirectedGraph::new(self.network.vertex_count());
        let mut factors: FxHashMap<u16, Factor> = FxHashMap::default();
        let mut skipped = 0usize;

        for edge in self.network.all_edges() {
            let factor = match factors.get(&edge.data.profile) {
                Some(factor) => *factor,
                None => {
                    let factor = match self.edge_profiles.get(edge.data.profile as u32)? {
                        Some(attributes) => self.profile.factor(&attributes),
                        None => Factor::NO_FACTOR,
                    };
                    factors.insert(edge.data.profile, factor);
                    factor
                }
            };

            if factor.value <= 0.0 || edge.from == edge.to {
                skipped += 1;
                continue;
            }

            let weight = edge.data.distance * factor.value;
            let kind = EdgeKind::Original { base_edge: edge.id };
            if factor.direction != Direction::Backward {
                graph.add_edge(edge.from, edge.to, weight, kind.clone());
            }
            if factor.direction != Direction::Forward {
                graph.add_edge(edge.to, edge.from, weight, kind);
            }
        }

        tracing::debug!(
            profile = self.profile.name(),
            vertices = graph.vertex_count(),
            edges = graph.edge_count(),
            skipped,
            distinct_profiles = factors.len(),
            "built directed graph"
        );
        Ok(graph)
    }
}
