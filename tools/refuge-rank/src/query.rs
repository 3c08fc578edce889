//! Read-only queries over a ranking

use std::collections::BTreeMap;

use refuge_common::{Error, FacilityId, NodeId, Result};

use crate::facility::CategorySelector;
use crate::ranking::Ranking;

/// Accessor answering "who owns node X at rank n"
#[derive(Debug, Clone, Copy)]
pub struct RankQuery<'a> {
    ranking: &'a Ranking,
}

impl<'a> RankQuery<'a> {
    pub fn new(ranking: &'a Ranking) -> Self {
        Self { ranking }
    }

    /// Facility at 1-based rank `n` of `node`, `None` if fewer than `n` are reachable
    pub fn owner_at(&self, node: NodeId, n: usize) -> Result<Option<FacilityId>> {
        let index = rank_index(n)?;
        Ok(self.ranking.at(node)?.get(index).copied())
    }

    /// Ranked facilities at `node` restricted to `selector`, order preserved
    pub fn filtered_ranking(
        &self,
        node: NodeId,
        selector: &CategorySelector,
    ) -> Result<Vec<FacilityId>> {
        Ok(selector.filter(self.ranking.at(node)?))
    }

    /// Owner at rank `n` after restricting to `selector`
    pub fn owner_at_filtered(
        &self,
        node: NodeId,
        n: usize,
        selector: &CategorySelector,
    ) -> Result<Option<FacilityId>> {
        let index = rank_index(n)?;
        Ok(self
            .ranking
            .at(node)?
            .iter()
            .copied()
            .filter(|id| selector.contains(*id))
            .nth(index))
    }

    /// Rank-`n` owner of every node
    pub fn all_owners_at_rank(&self, n: usize) -> Result<BTreeMap<NodeId, Option<FacilityId>>> {
        let index = rank_index(n)?;
        Ok(self
            .ranking
            .iter()
            .map(|(node, ids)| (node, ids.get(index).copied()))
            .collect())
    }
}

fn rank_index(n: usize) -> Result<usize> {
    n.checked_sub(1).ok_or(Error::InvalidRank(n))
}
