//! refuge-rank: n-th nearest shelter by road-network distance
//!
//! One Dijkstra search per distinct shelter node, aggregated into a per-node
//! ranking of facilities ordered by network distance. Rankings are persisted
//! per hazard category and derived for narrower categories by filtering.

pub mod cli;
pub mod config;
pub mod coverage;
pub mod engine;
pub mod facility;
pub mod formats;
pub mod graph;
pub mod loader;
pub mod palette;
pub mod query;
pub mod ranking;
pub mod store;

pub use config::Config;
pub use coverage::{coverage_summary, edge_owners, CoverageSummary, EdgeOwner};
pub use engine::{EngineStats, RankingEngine};
pub use facility::{CategorySelector, Facility, FacilitySet, ALL_CATEGORY};
pub use graph::{GraphBuilder, WeightedGraph};
pub use query::RankQuery;
pub use ranking::Ranking;
pub use store::{RankingStore, StoreConfig};

pub use refuge_common::{Error, FacilityId, NodeId, Result};
