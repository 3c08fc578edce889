//! Multi-source network-distance ranking
//!
//! Two phases:
//! 1. Search phase: one Dijkstra per *distinct* facility node, in parallel. Each
//!    search owns a full-graph distance buffer; co-located facilities share it.
//! 2. Aggregate phase: after every search has joined, each node collects
//!    `(distance, facility)` pairs from all buffers, sorts them (distance, then
//!    facility id) and keeps the ids. Parallel over the node index space.
//!
//! Cost is O(S · E log V) for S distinct source nodes. Searching once per
//! (node, facility) pair instead would be quadratic and is never done here.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use refuge_common::{Error, FacilityId, Result};

use crate::facility::Facility;
use crate::graph::WeightedGraph;
use crate::ranking::Ranking;

/// Called with (finished searches, total searches)
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Statistics of one `compute` call
#[derive(Debug, Default, Clone)]
pub struct EngineStats {
    pub facilities: usize,
    pub sources: usize,
    pub settled: usize,
    pub relaxations: usize,
    pub search_time_ms: u64,
    pub aggregate_time_ms: u64,
}

// Min-heap entry: reversed ordering on (dist, node)
#[derive(Debug, Clone, Copy)]
struct QueueEntry {
    dist: f64,
    node: u32,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Distances from one source to every node (`f64::INFINITY` = unreachable)
struct SearchResult {
    dist: Vec<f64>,
    settled: usize,
    relaxations: usize,
}

/// Binary-heap Dijkstra over the whole graph from compact index `origin`
fn single_source(graph: &WeightedGraph, origin: u32) -> SearchResult {
    let mut dist = vec![f64::INFINITY; graph.node_count()];
    let mut settled = 0usize;
    let mut relaxations = 0usize;

    let mut pq = BinaryHeap::new();
    dist[origin as usize] = 0.0;
    pq.push(QueueEntry {
        dist: 0.0,
        node: origin,
    });

    while let Some(QueueEntry { dist: d, node: u }) = pq.pop() {
        // Skip if stale
        if d > dist[u as usize] {
            continue;
        }
        settled += 1;

        let (heads, weights) = graph.adjacency(u);
        for (&v, &w) in heads.iter().zip(weights) {
            let new_dist = d + w;
            relaxations += 1;
            if new_dist < dist[v as usize] {
                dist[v as usize] = new_dist;
                pq.push(QueueEntry {
                    dist: new_dist,
                    node: v,
                });
            }
        }
    }

    SearchResult {
        dist,
        settled,
        relaxations,
    }
}

/// Ranks facilities at every node of a graph
pub struct RankingEngine<'g> {
    graph: &'g WeightedGraph,
    progress: Option<ProgressFn>,
}

impl<'g> RankingEngine<'g> {
    pub fn new(graph: &'g WeightedGraph) -> Self {
        Self {
            graph,
            progress: None,
        }
    }

    /// Report search progress through `progress`
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn graph(&self) -> &'g WeightedGraph {
        self.graph
    }

    /// Rank `facilities` at every node; see [`RankingEngine::compute_with_stats`]
    pub fn compute(&self, category: &str, facilities: &[&Facility]) -> Result<Ranking> {
        self.compute_with_stats(category, facilities)
            .map(|(ranking, _)| ranking)
    }

    /// Rank `facilities` at every node and report search statistics
    ///
    /// Facilities are deduplicated by id; the same id snapped to two different
    /// nodes is rejected. Fails with `EmptyFacilitySet` for an empty input and
    /// `UnknownNode` when a facility node is not in the graph.
    pub fn compute_with_stats(
        &self,
        category: &str,
        facilities: &[&Facility],
    ) -> Result<(Ranking, EngineStats)> {
        if facilities.is_empty() {
            return Err(Error::EmptyFacilitySet(category.to_string()));
        }

        // facility id -> node, then node index -> facilities located there
        let mut by_id = BTreeMap::new();
        for f in facilities {
            if let Some(prev) = by_id.insert(f.id, f.node) {
                if prev != f.node {
                    return Err(Error::InvalidInput(format!(
                        "facility {} is bound to both node {prev} and node {}",
                        f.id, f.node
                    )));
                }
            }
        }

        let mut by_source: BTreeMap<u32, Vec<FacilityId>> = BTreeMap::new();
        for (&id, &node) in &by_id {
            let idx = self.graph.index_of(node)?;
            by_source.entry(idx).or_default().push(id);
        }
        let sources: Vec<(u32, Vec<FacilityId>)> = by_source.into_iter().collect();

        let mut stats = EngineStats {
            facilities: by_id.len(),
            sources: sources.len(),
            ..EngineStats::default()
        };

        tracing::info!(
            category,
            facilities = stats.facilities,
            sources = stats.sources,
            nodes = self.graph.node_count(),
            "ranking facilities"
        );

        // Search phase; collect() is the barrier
        let search_start = Instant::now();
        let total = sources.len() as u64;
        let done = AtomicU64::new(0);
        let searches: Vec<SearchResult> = sources
            .par_iter()
            .map(|(origin, _)| {
                let result = single_source(self.graph, *origin);
                let finished = done.fetch_add(1, AtomicOrdering::Relaxed) + 1;
                if let Some(progress) = &self.progress {
                    progress(finished, total);
                }
                result
            })
            .collect();
        stats.search_time_ms = search_start.elapsed().as_millis() as u64;
        stats.settled = searches.iter().map(|s| s.settled).sum();
        stats.relaxations = searches.iter().map(|s| s.relaxations).sum();

        // Aggregate phase
        let aggregate_start = Instant::now();
        let ranks: Vec<Vec<FacilityId>> = (0..self.graph.node_count())
            .into_par_iter()
            .map(|v| {
                let mut entries: Vec<(f64, FacilityId)> = Vec::new();
                for (search, (_, ids)) in searches.iter().zip(&sources) {
                    let d = search.dist[v];
                    if d.is_finite() {
                        entries.extend(ids.iter().map(|&id| (d, id)));
                    }
                }
                entries.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                entries.into_iter().map(|(_, id)| id).collect()
            })
            .collect();
        stats.aggregate_time_ms = aggregate_start.elapsed().as_millis() as u64;

        tracing::info!(
            category,
            settled = stats.settled,
            relaxations = stats.relaxations,
            search_ms = stats.search_time_ms,
            aggregate_ms = stats.aggregate_time_ms,
            "ranking complete"
        );

        let ranking = Ranking::new(
            category,
            self.graph.fingerprint(),
            by_id.into_keys().collect(),
            self.graph.nodes().to_vec(),
            ranks,
        )?;

        Ok((ranking, stats))
    }
}
