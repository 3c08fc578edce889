//! Ranking artifacts keyed by category
//!
//! Lookup order for `load`: in-memory cache, artifact on disk, derivation from
//! the first configured fallback base that is loadable and covers the category.
//! A stored ranking counts as stale when it was computed on another graph or
//! over a different set of active facilities.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use refuge_common::{suggest_category, Error, FacilityId, Result};
use rustc_hash::FxHashMap;

use crate::engine::RankingEngine;
use crate::facility::FacilitySet;
use crate::formats::RankingFile;
use crate::ranking::Ranking;

const ARTIFACT_PREFIX: &str = "full_ranks_";
const ARTIFACT_EXT: &str = "rnk";

/// Where artifacts live and which categories may stand in as derivation bases
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub dir: PathBuf,
    pub fallback_bases: Vec<String>,
}

impl StoreConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            fallback_bases: Vec::new(),
        }
    }
}

/// Persists, caches and derives rankings
pub struct RankingStore {
    dir: PathBuf,
    fallback_bases: Vec<String>,
    graph_fingerprint: Option<u64>,
    cache: RwLock<FxHashMap<String, Arc<Ranking>>>,
}

impl RankingStore {
    /// Open (and create if needed) the artifact directory
    pub fn open(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.dir)?;
        Ok(Self {
            dir: config.dir,
            fallback_bases: config.fallback_bases,
            graph_fingerprint: None,
            cache: RwLock::new(FxHashMap::default()),
        })
    }

    /// Treat artifacts computed on a different graph as absent
    pub fn with_graph_fingerprint(mut self, fingerprint: u64) -> Self {
        self.graph_fingerprint = Some(fingerprint);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifact_path(&self, category: &str) -> PathBuf {
        self.dir.join(format!("{ARTIFACT_PREFIX}{category}.{ARTIFACT_EXT}"))
    }

    /// Compute the ranking of `category` and write it
    pub fn compute_and_persist(
        &self,
        category: &str,
        engine: &RankingEngine<'_>,
        facilities: &FacilitySet,
    ) -> Result<Arc<Ranking>> {
        let active = facilities.active(category);
        let ranking = engine.compute(category, &active)?;
        self.persist(ranking)
    }

    /// Write a ranking under its own category and cache it
    pub fn persist(&self, ranking: Ranking) -> Result<Arc<Ranking>> {
        let path = self.artifact_path(ranking.category());
        RankingFile::write(&path, &ranking)?;
        tracing::info!(
            category = ranking.category(),
            path = %path.display(),
            nodes = ranking.node_count(),
            "ranking persisted"
        );

        let ranking = Arc::new(ranking);
        self.cache
            .write()
            .insert(ranking.category().to_string(), Arc::clone(&ranking));
        Ok(ranking)
    }

    /// Derive `category` by filtering the stored ranking of `base`
    ///
    /// The base must cover every facility active for `category`, otherwise
    /// `InvalidDerivation` lists the missing ids.
    pub fn derive(
        &self,
        category: &str,
        base: &str,
        facilities: &FacilitySet,
    ) -> Result<Arc<Ranking>> {
        let selector = facilities.selector(category);
        if selector.is_empty() {
            return Err(Error::EmptyFacilitySet(category.to_string()));
        }
        let base_ranking = self
            .load_stored(base, facilities)?
            .ok_or_else(|| not_found(base, facilities))?;

        let derived = derive_from(category, &base_ranking, facilities)?;
        self.persist(derived)
    }

    /// Cached or stored ranking, else derived from a fallback base, else `RankingNotFound`
    pub fn load(&self, category: &str, facilities: &FacilitySet) -> Result<Arc<Ranking>> {
        if let Some(ranking) = self.load_stored(category, facilities)? {
            return Ok(ranking);
        }

        for base in self.fallback_bases.iter().filter(|b| b.as_str() != category) {
            let Some(base_ranking) = self.load_stored(base, facilities)? else {
                continue;
            };
            match derive_from(category, &base_ranking, facilities) {
                Ok(derived) => {
                    tracing::info!(
                        category,
                        base = base.as_str(),
                        "derived from fallback base"
                    );
                    return self.persist(derived);
                }
                Err(e @ Error::InvalidDerivation { .. }) => {
                    tracing::warn!(category, base = base.as_str(), error = %e, "base unusable");
                }
                Err(e) => return Err(e),
            }
        }

        Err(not_found(category, facilities))
    }

    /// A stored ranking exists, decodes, and matches the bound graph and `facilities`
    pub fn is_current(&self, category: &str, facilities: &FacilitySet) -> bool {
        matches!(self.load_stored(category, facilities), Ok(Some(_)))
    }

    /// Drop a ranking from memory and disk; true if anything was removed
    pub fn invalidate(&self, category: &str) -> Result<bool> {
        let cached = self.cache.write().remove(category).is_some();
        let on_disk = match fs::remove_file(self.artifact_path(category)) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        if cached || on_disk {
            tracing::info!(category, "ranking invalidated");
        }
        Ok(cached || on_disk)
    }

    /// Categories with an artifact in the store directory, sorted
    pub fn stored_categories(&self) -> Result<Vec<String>> {
        let mut categories = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(category) = name
                .strip_prefix(ARTIFACT_PREFIX)
                .and_then(|rest| rest.strip_suffix(&format!(".{ARTIFACT_EXT}")))
            {
                categories.push(category.to_string());
            }
        }
        categories.sort();
        Ok(categories)
    }

    /// Cache or disk only; `None` when absent or stale
    fn load_stored(
        &self,
        category: &str,
        facilities: &FacilitySet,
    ) -> Result<Option<Arc<Ranking>>> {
        let cached = self.cache.read().get(category).cloned();
        let ranking = match cached {
            Some(ranking) => ranking,
            None => match self.read_artifact(category)? {
                Some(ranking) => ranking,
                None => return Ok(None),
            },
        };

        let expected = facilities.selector(category).sorted_ids();
        if ranking.active_facilities() != expected.as_slice() {
            tracing::warn!(
                category,
                stored = ranking.active_facilities().len(),
                active = expected.len(),
                "ranking was computed over other facilities, ignoring"
            );
            self.cache.write().remove(category);
            return Ok(None);
        }

        self.cache
            .write()
            .insert(category.to_string(), Arc::clone(&ranking));
        Ok(Some(ranking))
    }

    /// Artifact on disk, `None` when missing or computed on another graph
    fn read_artifact(&self, category: &str) -> Result<Option<Arc<Ranking>>> {
        let path = self.artifact_path(category);
        if !path.exists() {
            return Ok(None);
        }
        let ranking = RankingFile::read(&path)?;

        if let Some(expected) = self.graph_fingerprint {
            if ranking.graph_fingerprint() != expected {
                tracing::warn!(
                    category,
                    path = %path.display(),
                    "artifact was computed on a different graph, ignoring"
                );
                return Ok(None);
            }
        }
        if ranking.category() != category {
            return Err(Error::CorruptArtifact(format!(
                "{} holds category '{}'",
                path.display(),
                ranking.category()
            )));
        }

        tracing::debug!(category, path = %path.display(), "ranking loaded");
        Ok(Some(Arc::new(ranking)))
    }
}

/// Filter `base` down to the facilities active for `category`
fn derive_from(category: &str, base: &Ranking, facilities: &FacilitySet) -> Result<Ranking> {
    let selector = facilities.selector(category);
    if selector.is_empty() {
        return Err(Error::EmptyFacilitySet(category.to_string()));
    }

    let missing: Vec<FacilityId> = selector
        .sorted_ids()
        .into_iter()
        .filter(|id| !base.is_active(*id))
        .collect();
    if !missing.is_empty() {
        return Err(Error::InvalidDerivation {
            category: category.to_string(),
            base: base.category().to_string(),
            missing,
        });
    }

    Ok(base.filtered(category, &selector))
}

fn not_found(category: &str, facilities: &FacilitySet) -> Error {
    Error::RankingNotFound {
        category: category.to_string(),
        suggestion: suggest_category(category, facilities.categories()),
    }
}
