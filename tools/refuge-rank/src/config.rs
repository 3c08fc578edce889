//! YAML run configuration
//!
//! ```yaml
//! nodes: data/nodes.csv
//! edges: data/edges.csv
//! facilities: data/shelters.csv
//! cache_dir: cache_results
//! categories: [flood, earthquake, tsunami]
//! derived:
//!   - { category: inlandflooding, base: earthquake }
//! fallback_bases: [all]
//! threads: 8
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use refuge_common::{normalize_category, Error, Result, KNOWN_CATEGORIES};
use serde::{Deserialize, Serialize};

use crate::facility::ALL_CATEGORY;
use crate::store::StoreConfig;

/// A category computed by filtering the ranking of `base`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Derivation {
    pub category: String,
    pub base: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub nodes: PathBuf,
    pub edges: PathBuf,
    pub facilities: PathBuf,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Boolean shelter columns to read and rank
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
    #[serde(default)]
    pub derived: Vec<Derivation>,
    #[serde(default = "default_fallback_bases")]
    pub fallback_bases: Vec<String>,
    /// Worker threads; rayon's default when unset
    #[serde(default)]
    pub threads: Option<usize>,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache_results")
}

fn default_categories() -> Vec<String> {
    KNOWN_CATEGORIES.iter().map(|c| c.to_string()).collect()
}

fn default_fallback_bases() -> Vec<String> {
    vec![ALL_CATEGORY.to_string()]
}

impl Config {
    /// Read a config file; relative data paths resolve against its directory
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(text)
            .map_err(|e| Error::InvalidInput(format!("config: {e}")))?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            dir: self.cache_dir.clone(),
            fallback_bases: self.fallback_bases.clone(),
        }
    }

    /// Categories to rank from scratch, i.e. configured minus derived
    pub fn computed_categories(&self) -> Vec<&str> {
        self.categories
            .iter()
            .map(String::as_str)
            .filter(|c| !self.derived.iter().any(|d| d.category == *c))
            .collect()
    }

    /// Boolean shelter columns to load: configured categories, derived
    /// categories and their bases, and fallback bases other than `all`
    pub fn facility_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        let candidates = self
            .categories
            .iter()
            .chain(self.derived.iter().flat_map(|d| [&d.category, &d.base]))
            .chain(&self.fallback_bases);
        for c in candidates {
            if c != ALL_CATEGORY && !columns.contains(c) {
                columns.push(c.clone());
            }
        }
        columns
    }

    fn normalize(&mut self) {
        for c in &mut self.categories {
            *c = normalize_category(c);
        }
        for d in &mut self.derived {
            d.category = normalize_category(&d.category);
            d.base = normalize_category(&d.base);
        }
        for b in &mut self.fallback_bases {
            *b = normalize_category(b);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.threads == Some(0) {
            return Err(Error::InvalidInput("config: threads must be positive".into()));
        }
        for d in &self.derived {
            if d.category == d.base {
                return Err(Error::InvalidInput(format!(
                    "config: '{}' cannot be derived from itself",
                    d.category
                )));
            }
            if d.category == ALL_CATEGORY {
                return Err(Error::InvalidInput(format!(
                    "config: '{ALL_CATEGORY}' cannot be derived"
                )));
            }
        }
        Ok(())
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        for p in [
            &mut self.nodes,
            &mut self.edges,
            &mut self.facilities,
            &mut self.cache_dir,
        ] {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
    }
}
