//! Immutable weighted road graph in CSR layout
//!
//! Edges are undirected for traversal: every input edge (u, v, w) is stored once
//! in `edges` (as given, for partition export) and twice in the adjacency arrays.
//! Weights are validated at construction; nothing downstream re-checks them.

use refuge_common::{Error, NodeId, Result};
use rstar::{primitives::GeomWithData, RTree};
use rustc_hash::FxHashMap;

use crate::formats::crc::GraphFingerprint;

/// Read-only road graph shared by every source search
#[derive(Debug)]
pub struct WeightedGraph {
    node_ids: Vec<NodeId>,
    node_map: FxHashMap<NodeId, u32>,
    /// (lat, lon) per compact node index
    coords: Vec<(f64, f64)>,
    offsets: Vec<u64>, // n_nodes + 1
    heads: Vec<u32>,   // 2 * n_edges
    weights: Vec<f64>, // 2 * n_edges
    edges: Vec<(u32, u32, f64)>,
    spatial_index: RTree<GeomWithData<[f64; 2], u32>>,
}

impl WeightedGraph {
    pub fn node_count(&self) -> usize {
        self.node_ids.len()
    }

    /// Number of input (undirected) edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// All node ids, in compact index order
    pub fn nodes(&self) -> &[NodeId] {
        &self.node_ids
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.node_map.contains_key(&node)
    }

    /// Compact index of a node id
    pub fn index_of(&self, node: NodeId) -> Result<u32> {
        self.node_map
            .get(&node)
            .copied()
            .ok_or(Error::UnknownNode(node))
    }

    /// Node id at a compact index
    pub fn node_id(&self, idx: u32) -> NodeId {
        self.node_ids[idx as usize]
    }

    /// Neighbours of `node` with edge weights, in both traversal directions
    pub fn neighbors(&self, node: NodeId) -> Result<impl Iterator<Item = (NodeId, f64)> + '_> {
        let idx = self.index_of(node)?;
        let (heads, weights) = self.adjacency(idx);
        Ok(heads
            .iter()
            .zip(weights)
            .map(move |(&h, &w)| (self.node_ids[h as usize], w)))
    }

    /// Raw adjacency slices for a compact index (search inner loop)
    #[inline]
    pub fn adjacency(&self, idx: u32) -> (&[u32], &[f64]) {
        let start = self.offsets[idx as usize] as usize;
        let end = self.offsets[idx as usize + 1] as usize;
        (&self.heads[start..end], &self.weights[start..end])
    }

    /// Input edges as (u, v, weight) node ids
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId, f64)> + '_ {
        self.edges
            .iter()
            .map(|&(u, v, w)| (self.node_ids[u as usize], self.node_ids[v as usize], w))
    }

    /// (lat, lon) of a node
    pub fn coord(&self, node: NodeId) -> Result<(f64, f64)> {
        let idx = self.index_of(node)?;
        Ok(self.coords[idx as usize])
    }

    /// Snap a coordinate to the nearest graph node (R-tree, planar degrees)
    pub fn nearest_node(&self, lat: f64, lon: f64) -> Option<NodeId> {
        self.spatial_index
            .nearest_neighbor(&[lon, lat])
            .map(|point| self.node_ids[point.data as usize])
    }

    /// CRC-64 over node ids and edges; changes whenever the topology or a weight does
    pub fn fingerprint(&self) -> u64 {
        let mut fingerprint = GraphFingerprint::new();
        for &id in &self.node_ids {
            fingerprint.node(id);
        }
        for &(u, v, w) in &self.edges {
            fingerprint.edge(self.node_ids[u as usize], self.node_ids[v as usize], w);
        }
        fingerprint.finish()
    }
}

/// Collects nodes and edges, validates them and freezes a [`WeightedGraph`]
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<(NodeId, f64, f64)>,
    edges: Vec<(NodeId, NodeId, f64)>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(nodes: usize, edges: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(nodes),
            edges: Vec::with_capacity(edges),
        }
    }

    pub fn add_node(&mut self, id: NodeId, lat: f64, lon: f64) -> &mut Self {
        self.nodes.push((id, lat, lon));
        self
    }

    pub fn add_edge(&mut self, u: NodeId, v: NodeId, weight: f64) -> &mut Self {
        self.edges.push((u, v, weight));
        self
    }

    pub fn build(self) -> Result<WeightedGraph> {
        let n_nodes = self.nodes.len();
        if n_nodes > u32::MAX as usize {
            return Err(Error::MalformedGraph(format!(
                "{n_nodes} nodes exceed the u32 index space"
            )));
        }

        let mut node_ids = Vec::with_capacity(n_nodes);
        let mut coords = Vec::with_capacity(n_nodes);
        let mut node_map = FxHashMap::default();
        node_map.reserve(n_nodes);

        for (id, lat, lon) in self.nodes {
            let idx = node_ids.len() as u32;
            if node_map.insert(id, idx).is_some() {
                return Err(Error::MalformedGraph(format!("duplicate node id {id}")));
            }
            node_ids.push(id);
            coords.push((lat, lon));
        }

        let mut edges = Vec::with_capacity(self.edges.len());
        let mut degree = vec![0u64; n_nodes];
        for (u, v, w) in self.edges {
            if !w.is_finite() || w < 0.0 {
                return Err(Error::MalformedGraph(format!(
                    "edge {u} -> {v} has invalid weight {w}"
                )));
            }
            let (Some(&ui), Some(&vi)) = (node_map.get(&u), node_map.get(&v)) else {
                return Err(Error::MalformedGraph(format!(
                    "edge {u} -> {v} references an undeclared node"
                )));
            };
            degree[ui as usize] += 1;
            degree[vi as usize] += 1;
            edges.push((ui, vi, w));
        }

        let mut offsets = Vec::with_capacity(n_nodes + 1);
        offsets.push(0u64);
        for d in &degree {
            let last = offsets[offsets.len() - 1];
            offsets.push(last + d);
        }

        let total = offsets[n_nodes] as usize;
        let mut heads = vec![0u32; total];
        let mut weights = vec![0f64; total];
        let mut cursor: Vec<u64> = offsets[..n_nodes].to_vec();
        for &(u, v, w) in &edges {
            let slot = cursor[u as usize] as usize;
            heads[slot] = v;
            weights[slot] = w;
            cursor[u as usize] += 1;

            let slot = cursor[v as usize] as usize;
            heads[slot] = u;
            weights[slot] = w;
            cursor[v as usize] += 1;
        }

        let points: Vec<GeomWithData<[f64; 2], u32>> = coords
            .iter()
            .enumerate()
            .map(|(idx, &(lat, lon))| GeomWithData::new([lon, lat], idx as u32))
            .collect();
        let spatial_index = RTree::bulk_load(points);

        tracing::debug!(nodes = n_nodes, edges = edges.len(), "built weighted graph");

        Ok(WeightedGraph {
            node_ids,
            node_map,
            coords,
            offsets,
            heads,
            weights,
            edges,
            spatial_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> WeightedGraph {
        let mut b = GraphBuilder::new();
        b.add_node(1, 0.0, 0.0)
            .add_node(2, 0.0, 1.0)
            .add_node(3, 1.0, 1.0)
            .add_node(4, 1.0, 0.0);
        b.add_edge(1, 2, 1.0)
            .add_edge(2, 3, 2.0)
            .add_edge(3, 4, 3.0)
            .add_edge(4, 1, 4.0);
        b.build().unwrap()
    }

    #[test]
    fn edges_are_traversable_both_ways() {
        let g = square();
        let mut from_1: Vec<(NodeId, f64)> = g.neighbors(1).unwrap().collect();
        from_1.sort_by_key(|(n, _)| *n);
        assert_eq!(from_1, vec![(2, 1.0), (4, 4.0)]);

        let from_3: Vec<(NodeId, f64)> = g.neighbors(3).unwrap().collect();
        assert_eq!(from_3.len(), 2);
        assert!(from_3.contains(&(2, 2.0)));
        assert!(from_3.contains(&(4, 3.0)));
        assert_eq!(g.edge_count(), 4);
        assert_eq!(g.node_count(), 4);
    }

    #[test]
    fn unknown_node_is_an_error() {
        let g = square();
        assert!(!g.contains(99));
        assert!(matches!(g.neighbors(99), Err(Error::UnknownNode(99))));
        assert!(matches!(g.index_of(99), Err(Error::UnknownNode(99))));
    }

    #[test]
    fn rejects_negative_and_non_finite_weights() {
        for w in [-1.0, f64::NAN, f64::INFINITY] {
            let mut b = GraphBuilder::new();
            b.add_node(1, 0.0, 0.0).add_node(2, 0.0, 0.0);
            b.add_edge(1, 2, w);
            assert!(matches!(b.build(), Err(Error::MalformedGraph(_))));
        }
    }

    #[test]
    fn rejects_dangling_edges_and_duplicate_nodes() {
        let mut b = GraphBuilder::new();
        b.add_node(1, 0.0, 0.0);
        b.add_edge(1, 2, 1.0);
        assert!(matches!(b.build(), Err(Error::MalformedGraph(_))));

        let mut b = GraphBuilder::new();
        b.add_node(1, 0.0, 0.0).add_node(1, 1.0, 1.0);
        assert!(matches!(b.build(), Err(Error::MalformedGraph(_))));
    }

    #[test]
    fn snaps_to_nearest_node() {
        let g = square();
        assert_eq!(g.nearest_node(0.9, 0.95), Some(3));
        assert_eq!(g.nearest_node(-5.0, -5.0), Some(1));
        assert_eq!(g.coord(4).unwrap(), (1.0, 0.0));
    }

    #[test]
    fn fingerprint_tracks_weights() {
        let a = square();
        let b = square();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let mut builder = GraphBuilder::new();
        builder
            .add_node(1, 0.0, 0.0)
            .add_node(2, 0.0, 1.0)
            .add_node(3, 1.0, 1.0)
            .add_node(4, 1.0, 0.0);
        builder
            .add_edge(1, 2, 1.5)
            .add_edge(2, 3, 2.0)
            .add_edge(3, 4, 3.0)
            .add_edge(4, 1, 4.0);
        let c = builder.build().unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
