//! Network Voronoi partition of edges by rank-n owner, and per-shelter coverage
//!
//! An edge (u, v) belongs to the rank-n owner of its first endpoint u.

use std::collections::BTreeMap;

use refuge_common::{FacilityId, NodeId, Result};
use serde::Serialize;

use crate::facility::{CategorySelector, FacilitySet};
use crate::graph::WeightedGraph;
use crate::query::RankQuery;
use crate::ranking::Ranking;

/// One edge of the partition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeOwner {
    pub u: NodeId,
    pub v: NodeId,
    pub owner: Option<FacilityId>,
}

/// Rank-`n` owner of every graph edge, optionally after a selector filter
pub fn edge_owners(
    graph: &WeightedGraph,
    ranking: &Ranking,
    n: usize,
    selector: Option<&CategorySelector>,
) -> Result<Vec<EdgeOwner>> {
    let query = RankQuery::new(ranking);
    graph
        .edges()
        .map(|(u, v, _)| {
            let owner = match selector {
                Some(sel) => query.owner_at_filtered(u, n, sel)?,
                None => query.owner_at(u, n)?,
            };
            Ok(EdgeOwner { u, v, owner })
        })
        .collect()
}

/// Edges owned by one facility name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageRow {
    pub name: String,
    pub edges: usize,
}

/// Owned-edge counts grouped by facility name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageSummary {
    /// Sorted by edge count descending, then name ascending
    pub rows: Vec<CoverageRow>,
    pub unowned_edges: usize,
}

impl CoverageSummary {
    /// Distinct facility names considered
    pub fn facilities_total(&self) -> usize {
        self.rows.len()
    }

    /// Names owning at least one edge
    pub fn facilities_covering(&self) -> usize {
        self.rows.iter().filter(|r| r.edges > 0).count()
    }

    /// Names owning no edge at this rank
    pub fn uncovered(&self) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .filter(|r| r.edges == 0)
            .map(|r| r.name.as_str())
    }
}

/// Count owned edges per facility name; every selected name gets a row
///
/// Facilities sharing a name (one site listed under several ids) are merged.
/// Owners missing from `facilities` are reported as `#<id>`.
pub fn coverage_summary(
    facilities: &FacilitySet,
    selector: &CategorySelector,
    owners: &[EdgeOwner],
) -> CoverageSummary {
    let mut counts: BTreeMap<String, usize> = facilities
        .iter()
        .filter(|f| selector.contains(f.id))
        .map(|f| (f.name.clone(), 0))
        .collect();

    let mut unowned_edges = 0;
    for edge in owners {
        match edge.owner {
            Some(id) => {
                let name = facilities
                    .get(id)
                    .map(|f| f.name.clone())
                    .unwrap_or_else(|| format!("#{id}"));
                *counts.entry(name).or_insert(0) += 1;
            }
            None => unowned_edges += 1,
        }
    }

    let mut rows: Vec<CoverageRow> = counts
        .into_iter()
        .map(|(name, edges)| CoverageRow { name, edges })
        .collect();
    rows.sort_by(|a, b| b.edges.cmp(&a.edges).then_with(|| a.name.cmp(&b.name)));

    CoverageSummary {
        rows,
        unowned_edges,
    }
}
