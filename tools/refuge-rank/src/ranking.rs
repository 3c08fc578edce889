//! Per-node facility rankings for one category

use refuge_common::{Error, FacilityId, NodeId, Result};
use rustc_hash::FxHashMap;

use crate::facility::CategorySelector;

/// Node → facility ids ordered by network distance (ties by id)
///
/// Every graph node has an entry; unreachable facilities are simply absent from
/// a node's sequence. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    category: String,
    graph_fingerprint: u64,
    /// Sorted ids of the facilities this ranking was computed or derived over
    active: Vec<FacilityId>,
    nodes: Vec<NodeId>,
    ranks: Vec<Vec<FacilityId>>,
    index: FxHashMap<NodeId, u32>,
}

impl Ranking {
    /// Assemble a ranking; `nodes` and `ranks` are parallel arrays
    pub fn new(
        category: impl Into<String>,
        graph_fingerprint: u64,
        mut active: Vec<FacilityId>,
        nodes: Vec<NodeId>,
        ranks: Vec<Vec<FacilityId>>,
    ) -> Result<Self> {
        if nodes.len() != ranks.len() {
            return Err(Error::InvalidInput(format!(
                "ranking has {} nodes but {} sequences",
                nodes.len(),
                ranks.len()
            )));
        }
        active.sort_unstable();
        active.dedup();

        let mut index = FxHashMap::default();
        index.reserve(nodes.len());
        for (i, &node) in nodes.iter().enumerate() {
            if index.insert(node, i as u32).is_some() {
                return Err(Error::InvalidInput(format!(
                    "node {node} appears twice in ranking"
                )));
            }
        }

        Ok(Self {
            category: category.into(),
            graph_fingerprint,
            active,
            nodes,
            ranks,
            index,
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn graph_fingerprint(&self) -> u64 {
        self.graph_fingerprint
    }

    /// Sorted facility ids the ranking covers
    pub fn active_facilities(&self) -> &[FacilityId] {
        &self.active
    }

    pub fn is_active(&self, id: FacilityId) -> bool {
        self.active.binary_search(&id).is_ok()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.index.contains_key(&node)
    }

    /// Ranked facilities at `node`, or `UnknownNode`
    pub fn at(&self, node: NodeId) -> Result<&[FacilityId]> {
        self.index
            .get(&node)
            .map(|&i| self.ranks[i as usize].as_slice())
            .ok_or(Error::UnknownNode(node))
    }

    /// (node, ranked facilities) in graph order
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &[FacilityId])> + '_ {
        self.nodes
            .iter()
            .zip(&self.ranks)
            .map(|(&n, r)| (n, r.as_slice()))
    }

    /// Keep only ids the selector accepts, preserving order at every node
    ///
    /// Order survives because each sequence is already sorted by a distance that
    /// does not depend on which other facilities are present.
    pub fn filtered(&self, category: impl Into<String>, selector: &CategorySelector) -> Ranking {
        let ranks = self.ranks.iter().map(|r| selector.filter(r)).collect();
        let active = self
            .active
            .iter()
            .copied()
            .filter(|id| selector.contains(*id))
            .collect();

        Ranking {
            category: category.into(),
            graph_fingerprint: self.graph_fingerprint,
            active,
            nodes: self.nodes.clone(),
            ranks,
            index: self.index.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u32]) -> Vec<FacilityId> {
        raw.iter().copied().map(FacilityId).collect()
    }

    #[test]
    fn lookup_and_unknown_node() {
        let r = Ranking::new(
            "flood",
            7,
            ids(&[3, 1]),
            vec![10, 20],
            vec![ids(&[1, 3]), ids(&[3])],
        )
        .unwrap();

        assert_eq!(r.at(10).unwrap(), &ids(&[1, 3])[..]);
        assert_eq!(r.active_facilities(), &ids(&[1, 3])[..]);
        assert!(matches!(r.at(30), Err(Error::UnknownNode(30))));
        assert_eq!(r.iter().count(), 2);
    }

    #[test]
    fn rejects_mismatched_arrays_and_duplicate_nodes() {
        assert!(Ranking::new("x", 0, vec![], vec![1, 2], vec![vec![]]).is_err());
        assert!(Ranking::new("x", 0, vec![], vec![1, 1], vec![vec![], vec![]]).is_err());
    }

    #[test]
    fn filtering_preserves_order() {
        let r = Ranking::new(
            "all",
            0,
            ids(&[1, 2, 3, 4]),
            vec![1, 2],
            vec![ids(&[4, 2, 3, 1]), ids(&[1, 3])],
        )
        .unwrap();
        let selector = CategorySelector::from_ids("even", ids(&[2, 4]));
        let f = r.filtered("even", &selector);

        assert_eq!(f.category(), "even");
        assert_eq!(f.at(1).unwrap(), &ids(&[4, 2])[..]);
        assert!(f.at(2).unwrap().is_empty());
        assert_eq!(f.active_facilities(), &ids(&[2, 4])[..]);
    }
}
