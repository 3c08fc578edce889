//! CLI commands for refuge-rank

mod progress;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use refuge_common::{Error, FacilityId, NodeId};
use serde::Serialize;

use crate::config::Config;
use crate::coverage::{coverage_summary, edge_owners};
use crate::engine::RankingEngine;
use crate::facility::{CategorySelector, FacilitySet};
use crate::graph::WeightedGraph;
use crate::loader::{load_facilities_csv, load_graph_csv};
use crate::palette::hex_color;
use crate::query::RankQuery;
use crate::ranking::Ranking;
use crate::store::RankingStore;

pub use progress::{create_progress_bar, hidden_progress_bar, progress_callback};

#[derive(Parser)]
#[command(name = "refuge-rank")]
#[command(about = "n-th nearest emergency shelter by road-network distance", long_about = None)]
#[command(version)]
pub struct Cli {
    /// YAML config with data paths, cache directory and categories
    #[arg(short, long, global = true, default_value = "refuge.yaml")]
    pub config: PathBuf,

    /// Override the artifact directory from the config
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Worker threads (overrides the config)
    #[arg(short, long, global = true)]
    pub threads: Option<usize>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compute and persist rankings, then derive the configured derived categories
    Build {
        /// Only these categories (default: every configured one)
        #[arg(long = "category")]
        categories: Vec<String>,

        /// Recompute even when an artifact exists
        #[arg(long)]
        force: bool,
    },

    /// Derive a category by filtering the stored ranking of a broader one
    Derive {
        category: String,

        /// Stored category to filter
        #[arg(long)]
        base: String,
    },

    /// Owner of a node at rank n
    Owner {
        #[arg(long)]
        category: String,

        #[command(flatten)]
        target: Target,

        /// 1-based rank
        #[arg(short, long, default_value = "1")]
        rank: usize,

        /// Count each shelter name once (lowest id wins)
        #[arg(long)]
        dedupe_names: bool,
    },

    /// Full ranked shelter list of a node
    Ranking {
        #[arg(long)]
        category: String,

        #[command(flatten)]
        target: Target,

        #[arg(long)]
        dedupe_names: bool,
    },

    /// Export rank-n owners as JSON (per node, or per edge with colours)
    Export {
        #[arg(long)]
        category: String,

        #[arg(short, long, default_value = "1")]
        rank: usize,

        /// Export the edge partition instead of the node map
        #[arg(long)]
        edges: bool,

        #[arg(long)]
        dedupe_names: bool,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Edges served per shelter name at rank n
    Coverage {
        #[arg(long)]
        category: String,

        #[arg(short, long, default_value = "1")]
        rank: usize,

        #[arg(long)]
        dedupe_names: bool,
    },

    /// Delete a ranking artifact
    Invalidate { category: String },

    /// List stored ranking artifacts
    List,

    /// Nearest graph node to a coordinate
    Snap {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
}

/// A node given by id or by coordinate
#[derive(clap::Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct Target {
    /// Graph node id
    #[arg(long, allow_hyphen_values = true)]
    pub node: Option<NodeId>,

    /// Coordinate "lat,lon", snapped to the nearest node
    #[arg(long, allow_hyphen_values = true)]
    pub at: Option<String>,
}

impl Target {
    fn resolve(&self, graph: &WeightedGraph) -> Result<NodeId> {
        if let Some(node) = self.node {
            return Ok(node);
        }
        let raw = self.at.as_deref().unwrap_or_default();
        let (lat, lon) = parse_coord(raw)?;
        graph
            .nearest_node(lat, lon)
            .context("graph has no nodes to snap to")
    }
}

pub fn parse_coord(s: &str) -> Result<(f64, f64)> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        bail!("Coordinate must be in format 'lat,lon'");
    }
    let lat = parts[0].trim().parse::<f64>()?;
    let lon = parts[1].trim().parse::<f64>()?;
    Ok((lat, lon))
}

/// Loaded inputs shared by the query commands
struct Session {
    config: Config,
    graph: WeightedGraph,
    facilities: FacilitySet,
    store: RankingStore,
}

impl Session {
    fn open(config: Config) -> Result<Self> {
        let graph = load_graph_csv(&config.nodes, &config.edges)
            .with_context(|| format!("loading graph {}", config.nodes.display()))?;
        let columns = config.facility_columns();
        let facilities = load_facilities_csv(&config.facilities, &graph, &columns)
            .with_context(|| format!("loading shelters {}", config.facilities.display()))?;
        let store = RankingStore::open(config.store_config())
            .with_context(|| format!("opening {}", config.cache_dir.display()))?
            .with_graph_fingerprint(graph.fingerprint());
        Ok(Self {
            config,
            graph,
            facilities,
            store,
        })
    }

    fn ranking(&self, category: &str) -> Result<std::sync::Arc<Ranking>> {
        let category = refuge_common::normalize_category(category);
        Ok(self.store.load(&category, &self.facilities)?)
    }

    fn selector(&self, ranking: &Ranking, dedupe_names: bool) -> CategorySelector {
        let selector = CategorySelector::from_ids(
            ranking.category(),
            ranking.active_facilities().iter().copied(),
        );
        if dedupe_names {
            selector.unique_names(&self.facilities)
        } else {
            selector
        }
    }

    fn name_of(&self, id: FacilityId) -> &str {
        self.facilities.get(id).map_or("?", |f| f.name.as_str())
    }
}

#[derive(Serialize)]
struct NodeOwnerRow {
    node: NodeId,
    owner: Option<FacilityId>,
    name: Option<String>,
}

#[derive(Serialize)]
struct EdgeOwnerRow {
    u: NodeId,
    v: NodeId,
    owner: Option<FacilityId>,
    color: String,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let mut config = Config::load(&self.config)
            .with_context(|| format!("reading config {}", self.config.display()))?;
        if let Some(dir) = self.cache_dir {
            config.cache_dir = dir;
        }
        let pool = worker_pool(self.threads.or(config.threads))?;
        let (command, log_json) = (self.command, self.log_json);
        match pool {
            Some(pool) => pool.install(|| dispatch(command, config, log_json)),
            None => dispatch(command, config, log_json),
        }
    }
}

/// Dedicated rayon pool when a thread count is configured
fn worker_pool(threads: Option<usize>) -> Result<Option<rayon::ThreadPool>> {
    let Some(n) = threads else {
        return Ok(None);
    };
    if n == 0 {
        bail!("--threads must be positive");
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(n)
        .thread_name(|i| format!("refuge-worker-{i}"))
        .build()
        .context("configuring worker threads")?;
    Ok(Some(pool))
}

fn dispatch(command: Commands, config: Config, log_json: bool) -> Result<()> {
    match command {
        Commands::Build { categories, force } => build(config, categories, force, log_json),
        Commands::Derive { category, base } => {
            let session = Session::open(config)?;
            let category = refuge_common::normalize_category(&category);
            let base = refuge_common::normalize_category(&base);
            let ranking = session.store.derive(&category, &base, &session.facilities)?;
            println!(
                "✅ derived '{}' from '{}' ({} active shelters)",
                category,
                base,
                ranking.active_facilities().len()
            );
            Ok(())
        }
        Commands::Owner {
            category,
            target,
            rank,
            dedupe_names,
        } => {
            let session = Session::open(config)?;
            let node = target.resolve(&session.graph)?;
            let ranking = session.ranking(&category)?;
            let query = RankQuery::new(&ranking);
            let owner = if dedupe_names {
                query.owner_at_filtered(node, rank, &session.selector(&ranking, true))?
            } else {
                query.owner_at(node, rank)?
            };
            match owner {
                Some(id) => println!(
                    "node {node} rank {rank}: #{id} {} {}",
                    session.name_of(id),
                    hex_color(Some(id))
                ),
                None => println!("node {node} rank {rank}: no shelter reachable"),
            }
            Ok(())
        }
        Commands::Ranking {
            category,
            target,
            dedupe_names,
        } => {
            let session = Session::open(config)?;
            let node = target.resolve(&session.graph)?;
            let ranking = session.ranking(&category)?;
            let ids = RankQuery::new(&ranking)
                .filtered_ranking(node, &session.selector(&ranking, dedupe_names))?;
            println!("node {node}, category '{}':", ranking.category());
            if ids.is_empty() {
                println!("  no shelter reachable");
            }
            for (i, id) in ids.iter().enumerate() {
                println!("  {:>3}. #{id} {}", i + 1, session.name_of(*id));
            }
            Ok(())
        }
        Commands::Export {
            category,
            rank,
            edges,
            dedupe_names,
            output,
        } => {
            let session = Session::open(config)?;
            let ranking = session.ranking(&category)?;
            let mut out: Box<dyn Write> = match &output {
                Some(path) => Box::new(BufWriter::new(
                    File::create(path)
                        .with_context(|| format!("creating {}", path.display()))?,
                )),
                None => Box::new(BufWriter::new(io::stdout().lock())),
            };

            if edges {
                let selector = dedupe_names.then(|| session.selector(&ranking, true));
                let rows: Vec<EdgeOwnerRow> =
                    edge_owners(&session.graph, &ranking, rank, selector.as_ref())?
                        .into_iter()
                        .map(|e| EdgeOwnerRow {
                            u: e.u,
                            v: e.v,
                            owner: e.owner,
                            color: hex_color(e.owner),
                        })
                        .collect();
                serde_json::to_writer_pretty(&mut out, &rows)?;
            } else {
                let query = RankQuery::new(&ranking);
                let owners: Vec<(NodeId, Option<FacilityId>)> = if dedupe_names {
                    let selector = session.selector(&ranking, true);
                    session
                        .graph
                        .nodes()
                        .iter()
                        .map(|&node| Ok((node, query.owner_at_filtered(node, rank, &selector)?)))
                        .collect::<refuge_common::Result<_>>()?
                } else {
                    query.all_owners_at_rank(rank)?.into_iter().collect()
                };
                let rows: Vec<NodeOwnerRow> = owners
                    .into_iter()
                    .map(|(node, owner)| NodeOwnerRow {
                        node,
                        owner,
                        name: owner.map(|id| session.name_of(id).to_string()),
                    })
                    .collect();
                serde_json::to_writer_pretty(&mut out, &rows)?;
            }
            writeln!(out)?;
            out.flush()?;
            if let Some(path) = output {
                eprintln!("✅ wrote {}", path.display());
            }
            Ok(())
        }
        Commands::Coverage {
            category,
            rank,
            dedupe_names,
        } => {
            let session = Session::open(config)?;
            let ranking = session.ranking(&category)?;
            let selector = session.selector(&ranking, dedupe_names);
            let owners = edge_owners(
                &session.graph,
                &ranking,
                rank,
                dedupe_names.then_some(&selector),
            )?;
            let summary = coverage_summary(&session.facilities, &selector, &owners);

            println!("coverage of '{}' at rank {rank}", ranking.category());
            for row in &summary.rows {
                println!("  {:>7}  {}", row.edges, row.name);
            }
            println!(
                "{} of {} shelters own at least one edge, {} edges unowned",
                summary.facilities_covering(),
                summary.facilities_total(),
                summary.unowned_edges
            );
            let uncovered: Vec<&str> = summary.uncovered().collect();
            if !uncovered.is_empty() {
                tracing::warn!(
                    count = uncovered.len(),
                    "shelters own no edge at this rank: {}",
                    uncovered.join(", ")
                );
            }
            Ok(())
        }
        Commands::Invalidate { category } => {
            let store = RankingStore::open(config.store_config())?;
            let category = refuge_common::normalize_category(&category);
            if store.invalidate(&category)? {
                println!("🗑  removed '{category}'");
            } else {
                println!("nothing stored for '{category}'");
            }
            Ok(())
        }
        Commands::List => {
            let store = RankingStore::open(config.store_config())?;
            for category in store.stored_categories()? {
                println!("{category}\t{}", store.artifact_path(&category).display());
            }
            Ok(())
        }
        Commands::Snap { lat, lon } => {
            let graph = load_graph_csv(&config.nodes, &config.edges)?;
            let node = graph
                .nearest_node(lat, lon)
                .context("graph has no nodes to snap to")?;
            let (nlat, nlon) = graph.coord(node)?;
            println!("{node}\t{nlat:.6},{nlon:.6}");
            Ok(())
        }
    }
}

/// Compute every requested category, then derive the derived ones
fn build(config: Config, only: Vec<String>, force: bool, quiet_progress: bool) -> Result<()> {
    let started = Instant::now();
    let session = Session::open(config)?;
    let only: Vec<String> = only
        .iter()
        .map(|c| refuge_common::normalize_category(c))
        .collect();
    let wanted = |c: &str| only.is_empty() || only.iter().any(|o| o == c);

    let mut computed: Vec<String> = Vec::new();
    for category in session
        .config
        .computed_categories()
        .into_iter()
        .chain(session.config.fallback_bases.iter().map(String::as_str))
    {
        if !wanted(category) || computed.iter().any(|c| c == category) {
            continue;
        }
        computed.push(category.to_string());

        if !force && session.store.is_current(category, &session.facilities) {
            println!("⏭  '{category}' already stored");
            continue;
        }
        let active = session.facilities.active(category);
        if active.is_empty() {
            tracing::warn!(category, "no shelters serve this category, skipping");
            continue;
        }

        let pb = if quiet_progress {
            hidden_progress_bar()
        } else {
            create_progress_bar(0, category)
        };
        let engine = RankingEngine::new(&session.graph).with_progress(progress_callback(&pb));
        let (ranking, stats) = engine.compute_with_stats(category, &active)?;
        pb.finish_and_clear();
        session.store.persist(ranking)?;
        println!(
            "✅ '{category}': {} shelters, {} sources, {} ms",
            stats.facilities,
            stats.sources,
            stats.search_time_ms + stats.aggregate_time_ms
        );
    }

    for d in &session.config.derived {
        if !wanted(&d.category) {
            continue;
        }
        match session.store.derive(&d.category, &d.base, &session.facilities) {
            Ok(_) => println!("✅ '{}' derived from '{}'", d.category, d.base),
            Err(Error::EmptyFacilitySet(category)) => {
                tracing::warn!(
                    category = category.as_str(),
                    "no shelters serve this category, skipping"
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    println!("🎉 build finished in {:.1}s", started.elapsed().as_secs_f64());
    Ok(())
}
