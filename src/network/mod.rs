//! Base routing network
//!
//! An undirected multigraph: vertices carry coordinates, edges carry a
//! distance, an edge-profile id and an edge-meta id. Routing weights are
//! derived from it per profile by the directed graph builder.
//!
//! Stream format (little-endian):
//!   version:  u8 = 2
//!   max_edge_distance: f32          (absent in version 1)
//!   vertex_count: u32, then (lat f32, lon f32) per vertex, NaN = absent
//!   edge_count:   u32, then (from u32, to u32, distance f32, profile u16, reserved u16)
//!   meta:         edge_count x u32

use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::formats::le;

/// Longest edge accepted by default, in meters
pub const DEFAULT_MAX_EDGE_DISTANCE: f32 = 5000.0;

const VERSION: u8 = 2;

/// WGS84 coordinate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub latitude: f32,
    pub longitude: f32,
}

impl Coordinate {
    pub fn new(latitude: f32, longitude: f32) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Per-edge payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeData {
    /// Meters
    pub distance: f32,
    /// Id in the edge-profile attributes index
    pub profile: u16,
    /// Id in the edge-meta attributes index
    pub meta_id: u32,
}

/// An edge as seen from one of its endpoints
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutingEdge {
    pub id: u32,
    pub from: u32,
    pub to: u32,
    pub data: EdgeData,
    /// True when the edge was stored as `to -> from`
    pub data_inverted: bool,
}

#[derive(Debug, Clone, Copy)]
struct StoredEdge {
    from: u32,
    to: u32,
    distance: f32,
    profile: u16,
    removed: bool,
}

#[derive(Debug, Clone)]
pub struct RoutingNetwork {
    coordinates: Vec<Option<Coordinate>>,
    edges: Vec<StoredEdge>,
    meta: Vec<u32>,
    /// Edge ids per vertex, removed edges included until `compress`
    adjacency: Vec<Vec<u32>>,
    max_edge_distance: f32,
    removed: usize,
}

impl RoutingNetwork {
    pub fn new(max_edge_distance: f32) -> Self {
        Self {
            coordinates: Vec::new(),
            edges: Vec::new(),
            meta: Vec::new(),
            adjacency: Vec::new(),
            max_edge_distance,
            removed: 0,
        }
    }

    pub fn max_edge_distance(&self) -> f32 {
        self.max_edge_distance
    }

    pub fn vertex_count(&self) -> u32 {
        self.coordinates.len() as u32
    }

    /// Live edges
    pub fn edge_count(&self) -> u32 {
        (self.edges.len() - self.removed) as u32
    }

    /// Set the coordinate of `vertex`, growing the vertex range as needed
    pub fn add_vertex(&mut self, vertex: u32, coordinate: Coordinate) {
        self.ensure_vertex(vertex);
        self.coordinates[vertex as usize] = Some(coordinate);
    }

    pub fn get_vertex(&self, vertex: u32) -> Option<Coordinate> {
        self.coordinates.get(vertex as usize).copied().flatten()
    }

    fn ensure_vertex(&mut self, vertex: u32) {
        let needed = vertex as usize + 1;
        if self.coordinates.len() < needed {
            self.coordinates.resize(needed, None);
            self.adjacency.resize_with(needed, Vec::new);
        }
    }

    /// Fails unless `distance` lies in `[0, max_edge_distance]`
    pub fn check_distance(&self, distance: f32) -> Result<()> {
        if !(distance >= 0.0) || distance > self.max_edge_distance {
            return Err(Error::invalid_argument(format!(
                "edge distance {distance} outside [0, {}]",
                self.max_edge_distance
            )));
        }
        Ok(())
    }

    /// Add an undirected edge and return its id
    pub fn add_edge(&mut self, from: u32, to: u32, data: EdgeData) -> Result<u32> {
        self.check_distance(data.distance)?;
        let id = u32::try_from(self.edges.len())
            .map_err(|_| Error::invalid_operation("edge id space exhausted"))?;
        self.ensure_vertex(from.max(to));
        self.edges.push(StoredEdge {
            from,
            to,
            distance: data.distance,
            profile: data.profile,
            removed: false,
        });
        self.meta.push(data.meta_id);
        self.adjacency[from as usize].push(id);
        if to != from {
            self.adjacency[to as usize].push(id);
        }
        Ok(id)
    }

    /// Edge in its stored orientation
    pub fn get_edge(&self, id: u32) -> Result<RoutingEdge> {
        match self.edges.get(id as usize) {
            Some(edge) if !edge.removed => Ok(self.oriented(id, edge.from)),
            _ => Err(Error::invalid_argument(format!("unknown edge {id}"))),
        }
    }

    fn oriented(&self, id: u32, from: u32) -> RoutingEdge {
        let edge = &self.edges[id as usize];
        let data = EdgeData {
            distance: edge.distance,
            profile: edge.profile,
            meta_id: self.meta[id as usize],
        };
        if edge.from == from {
            RoutingEdge {
                id,
                from: edge.from,
                to: edge.to,
                data,
                data_inverted: false,
            }
        } else {
            RoutingEdge {
                id,
                from: edge.to,
                to: edge.from,
                data,
                data_inverted: true,
            }
        }
    }

    /// Live edges at `vertex`, each oriented away from it
    pub fn edges(&self, vertex: u32) -> impl Iterator<Item = RoutingEdge> + '_ {
        self.adjacency
            .get(vertex as usize)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter(move |&&id| !self.edges[id as usize].removed)
            .map(move |&id| self.oriented(id, vertex))
    }

    /// All live edges in stored orientation, by id
    pub fn all_edges(&self) -> impl Iterator<Item = RoutingEdge> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.removed)
            .map(move |(id, e)| self.oriented(id as u32, e.from))
    }

    /// Remove one edge; returns false if it was unknown or already gone
    pub fn remove_edge(&mut self, id: u32) -> bool {
        match self.edges.get_mut(id as usize) {
            Some(edge) if !edge.removed => {
                edge.removed = true;
                self.removed += 1;
                true
            }
            _ => false,
        }
    }

    /// Remove every edge at `vertex`; returns how many were removed
    pub fn remove_edges(&mut self, vertex: u32) -> usize {
        let ids = self
            .adjacency
            .get(vertex as usize)
            .cloned()
            .unwrap_or_default();
        ids.into_iter().filter(|&id| self.remove_edge(id)).count()
    }

    /// Exchange two vertex ids, coordinates and edges included
    pub fn switch(&mut self, vertex1: u32, vertex2: u32) {
        if vertex1 == vertex2 {
            return;
        }
        self.ensure_vertex(vertex1.max(vertex2));
        let (a, b) = (vertex1 as usize, vertex2 as usize);
        self.coordinates.swap(a, b);
        self.adjacency.swap(a, b);

        let mut touched: Vec<u32> = self.adjacency[a].clone();
        touched.extend_from_slice(&self.adjacency[b]);
        touched.sort_unstable();
        touched.dedup();
        for id in touched {
            let edge = &mut self.edges[id as usize];
            for end in [&mut edge.from, &mut edge.to] {
                if *end == vertex1 {
                    *end = vertex2;
                } else if *end == vertex2 {
                    *end = vertex1;
                }
            }
        }
    }

    /// Drop removed edges and renumber the rest; returns old -> new ids
    pub fn compress(&mut self) -> Vec<Option<u32>> {
        let mut mapping = vec![None; self.edges.len()];
        let mut edges = Vec::with_capacity(self.edges.len() - self.removed);
        let mut meta = Vec::with_capacity(edges.capacity());
        for (id, edge) in self.edges.iter().enumerate() {
            if edge.removed {
                continue;
            }
            mapping[id] = Some(edges.len() as u32);
            edges.push(*edge);
            meta.push(self.meta[id]);
        }

        for ids in &mut self.adjacency {
            ids.retain_mut(|id| match mapping[*id as usize] {
                Some(new_id) => {
                    *id = new_id;
                    true
                }
                None => false,
            });
        }
        self.edges = edges;
        self.meta = meta;
        self.removed = 0;
        mapping
    }

    /// Write the network after compressing it; returns bytes written
    pub fn serialize<W: Write>(&mut self, writer: &mut W) -> Result<u64> {
        self.compress();

        let mut out = Vec::with_capacity(
            9 + self.coordinates.len() * 8 + self.edges.len() * 20,
        );
        out.push(VERSION);
        out.extend_from_slice(&self.max_edge_distance.to_le_bytes());
        out.extend_from_slice(&self.vertex_count().to_le_bytes());
        for coordinate in &self.coordinates {
            let (lat, lon) = coordinate
                .map(|c| (c.latitude, c.longitude))
                .unwrap_or((f32::NAN, f32::NAN));
            out.extend_from_slice(&lat.to_le_bytes());
            out.extend_from_slice(&lon.to_le_bytes());
        }
        out.extend_from_slice(&(self.edges.len() as u32).to_le_bytes());
        for edge in &self.edges {
            out.extend_from_slice(&edge.from.to_le_bytes());
            out.extend_from_slice(&edge.to.to_le_bytes());
            out.extend_from_slice(&edge.distance.to_le_bytes());
            out.extend_from_slice(&edge.profile.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
        }
        writer.write_all(&out)?;
        le::write_u32_slice(writer, &self.meta)?;
        Ok(out.len() as u64 + self.meta.len() as u64 * 4)
    }

    pub fn deserialize<R: Read>(reader: &mut R) -> Result<Self> {
        let version = le::read_u8(reader)?;
        let max_edge_distance = match version {
            1 => DEFAULT_MAX_EDGE_DISTANCE,
            2 => le::read_f32(reader)?,
            found => {
                return Err(Error::UnsupportedVersion {
                    format: "routing network",
                    found: found as u32,
                    supported: VERSION as u32,
                })
            }
        };

        let mut network = Self::new(max_edge_distance);
        let vertex_count = le::read_u32(reader)?;
        for vertex in 0..vertex_count {
            let lat = le::read_f32(reader)?;
            let lon = le::read_f32(reader)?;
            network.ensure_vertex(vertex);
            if !lat.is_nan() && !lon.is_nan() {
                network.coordinates[vertex as usize] = Some(Coordinate::new(lat, lon));
            }
        }

        let edge_count = le::read_u32(reader)?;
        let mut stored = Vec::with_capacity(edge_count.min(1 << 20) as usize);
        for _ in 0..edge_count {
            let from = le::read_u32(reader)?;
            let to = le::read_u32(reader)?;
            let distance = le::read_f32(reader)?;
            let packed = le::read_u32(reader)?;
            if from >= vertex_count || to >= vertex_count {
                return Err(Error::corrupt(format!(
                    "edge {from}->{to} references a vertex outside 0..{vertex_count}"
                )));
            }
            stored.push((from, to, distance, (packed & 0xffff) as u16));
        }
        let meta = le::read_u32_vec(reader, edge_count as usize)?;

        for ((from, to, distance, profile), meta_id) in stored.into_iter().zip(meta) {
            network
                .add_edge(
                    from,
                    to,
                    EdgeData {
                        distance,
                        profile,
                        meta_id,
                    },
                )
                .map_err(|e| Error::corrupt(format!("invalid edge {from}->{to}: {e}")))?;
        }
        Ok(network)
    }
}

impl Default for RoutingNetwork {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EDGE_DISTANCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(distance: f32, profile: u16) -> EdgeData {
        EdgeData {
            distance,
            profile,
            meta_id: profile as u32 + 100,
        }
    }

    #[test]
    fn test_add_and_enumerate() {
        let mut network = RoutingNetwork::default();
        network.add_vertex(0, Coordinate::new(50.0, 4.0));
        network.add_vertex(1, Coordinate::new(50.1, 4.1));
        let e = network.add_edge(0, 1, data(120.0, 3)).unwrap();

        let at0: Vec<RoutingEdge> = network.edges(0).collect();
        assert_eq!(at0.len(), 1);
        assert_eq!((at0[0].from, at0[0].to, at0[0].data_inverted), (0, 1, false));

        let at1: Vec<RoutingEdge> = network.edges(1).collect();
        assert_eq!((at1[0].from, at1[0].to, at1[0].data_inverted), (1, 0, true));
        assert_eq!(at1[0].id, e);
        assert_eq!(at1[0].data.meta_id, 103);
    }

    #[test]
    fn test_distance_over_max_rejected() {
        let mut network = RoutingNetwork::new(100.0);
        assert!(matches!(
            network.add_edge(0, 1, data(100.5, 0)),
            Err(Error::InvalidArgument(_))
        ));
        assert!(network.add_edge(0, 1, data(100.0, 0)).is_ok());
    }

    #[test]
    fn test_remove_and_compress() {
        let mut network = RoutingNetwork::default();
        let a = network.add_edge(0, 1, data(1.0, 1)).unwrap();
        let b = network.add_edge(1, 2, data(2.0, 2)).unwrap();
        let c = network.add_edge(0, 2, data(3.0, 3)).unwrap();
        assert!(network.remove_edge(b));
        assert!(!network.remove_edge(b));
        assert_eq!(network.edge_count(), 2);

        let mapping = network.compress();
        assert_eq!(mapping, vec![Some(0), None, Some(1)]);
        assert_eq!(network.get_edge(mapping[c as usize].unwrap()).unwrap().data.profile, 3);
        assert_eq!(network.get_edge(mapping[a as usize].unwrap()).unwrap().to, 1);
        assert_eq!(network.edges(2).count(), 1);
    }

    #[test]
    fn test_remove_edges_at_vertex() {
        let mut network = RoutingNetwork::default();
        network.add_edge(0, 1, data(1.0, 0)).unwrap();
        network.add_edge(1, 2, data(1.0, 0)).unwrap();
        network.add_edge(2, 3, data(1.0, 0)).unwrap();
        assert_eq!(network.remove_edges(1), 2);
        assert_eq!(network.edge_count(), 1);
        assert_eq!(network.edges(2).count(), 1);
    }

    #[test]
    fn test_switch_vertices() {
        let mut network = RoutingNetwork::default();
        network.add_vertex(0, Coordinate::new(1.0, 1.0));
        network.add_vertex(2, Coordinate::new(2.0, 2.0));
        network.add_edge(0, 1, data(5.0, 0)).unwrap();
        network.add_edge(1, 2, data(6.0, 0)).unwrap();

        network.switch(0, 2);
        assert_eq!(network.get_vertex(0), Some(Coordinate::new(2.0, 2.0)));
        let at0: Vec<(u32, u32, f32)> = network.edges(0).map(|e| (e.from, e.to, e.data.distance)).collect();
        assert_eq!(at0, vec![(0, 1, 6.0)]);
        let at2: Vec<(u32, u32, f32)> = network.edges(2).map(|e| (e.from, e.to, e.data.distance)).collect();
        assert_eq!(at2, vec![(2, 1, 5.0)]);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let mut network = RoutingNetwork::new(1000.0);
        network.add_vertex(0, Coordinate::new(51.0, 4.5));
        network.add_vertex(2, Coordinate::new(51.1, 4.6));
        network.add_edge(0, 1, data(10.0, 1)).unwrap();
        let removed = network.add_edge(1, 2, data(20.0, 2)).unwrap();
        network.add_edge(2, 0, data(30.0, 3)).unwrap();
        network.remove_edge(removed);

        let mut out = Vec::new();
        let written = network.serialize(&mut out).unwrap();
        assert_eq!(written as usize, out.len());

        let restored = RoutingNetwork::deserialize(&mut out.as_slice()).unwrap();
        assert_eq!(restored.max_edge_distance(), 1000.0);
        assert_eq!(restored.vertex_count(), 3);
        assert_eq!(restored.edge_count(), 2);
        assert_eq!(restored.get_vertex(1), None);
        assert_eq!(restored.get_vertex(2), Some(Coordinate::new(51.1, 4.6)));
        let edges: Vec<RoutingEdge> = restored.all_edges().collect();
        assert_eq!(edges[1].data, data(30.0, 3));
    }

    #[test]
    fn test_deserialize_versions() {
        assert!(matches!(
            RoutingNetwork::deserialize(&mut [3u8].as_slice()),
            Err(Error::UnsupportedVersion { found: 3, .. })
        ));
        assert!(matches!(
            RoutingNetwork::deserialize(&mut [0u8].as_slice()),
            Err(Error::UnsupportedVersion { found: 0, .. })
        ));

        let mut v1 = vec![1u8];
        v1.extend_from_slice(&0u32.to_le_bytes());
        v1.extend_from_slice(&0u32.to_le_bytes());
        let network = RoutingNetwork::deserialize(&mut v1.as_slice()).unwrap();
        assert_eq!(network.max_edge_distance(), DEFAULT_MAX_EDGE_DISTANCE);
    }
}
