//! Facility records and category selectors

use std::collections::{BTreeMap, BTreeSet};

use refuge_common::{normalize_category, Error, FacilityId, NodeId, Result};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::graph::WeightedGraph;

/// Pseudo-category that every facility belongs to
pub const ALL_CATEGORY: &str = "all";

/// A shelter snapped to one graph node
#[derive(Debug, Clone, PartialEq)]
pub struct Facility {
    pub id: FacilityId,
    pub name: String,
    pub node: NodeId,
    pub lat: f64,
    pub lon: f64,
    pub categories: BTreeSet<String>,
}

impl Facility {
    pub fn serves(&self, category: &str) -> bool {
        category == ALL_CATEGORY || self.categories.contains(category)
    }
}

/// Facilities keyed by id, plus the category columns they were tagged from
#[derive(Debug, Clone, Default)]
pub struct FacilitySet {
    facilities: Vec<Facility>,
    by_id: FxHashMap<FacilityId, usize>,
    categories: Vec<String>,
}

impl FacilitySet {
    /// Build a set; ids must be unique. Category names are normalised.
    pub fn new(mut facilities: Vec<Facility>, categories: Vec<String>) -> Result<Self> {
        facilities.sort_by_key(|f| f.id);

        let mut by_id = FxHashMap::default();
        for (i, f) in facilities.iter().enumerate() {
            if by_id.insert(f.id, i).is_some() {
                return Err(Error::InvalidInput(format!("duplicate facility id {}", f.id)));
            }
        }

        let categories = categories.iter().map(|c| normalize_category(c)).collect();

        Ok(Self {
            facilities,
            by_id,
            categories,
        })
    }

    pub fn len(&self) -> usize {
        self.facilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facilities.is_empty()
    }

    pub fn get(&self, id: FacilityId) -> Option<&Facility> {
        self.by_id.get(&id).map(|&i| &self.facilities[i])
    }

    /// Facilities in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = &Facility> {
        self.facilities.iter()
    }

    /// Declared category columns (without the `all` pseudo-category)
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn has_category(&self, category: &str) -> bool {
        category == ALL_CATEGORY || self.categories.iter().any(|c| c == category)
    }

    /// Facilities eligible for `category`, ascending id order
    pub fn active(&self, category: &str) -> Vec<&Facility> {
        self.facilities
            .iter()
            .filter(|f| f.serves(category))
            .collect()
    }

    /// Membership selector for `category`
    pub fn selector(&self, category: &str) -> CategorySelector {
        CategorySelector::from_ids(category, self.active(category).iter().map(|f| f.id))
    }

    /// Fail with `UnknownNode` if any facility is snapped outside `graph`
    pub fn validate_nodes(&self, graph: &WeightedGraph) -> Result<()> {
        match self.facilities.iter().find(|f| !graph.contains(f.node)) {
            Some(f) => Err(Error::UnknownNode(f.node)),
            None => Ok(()),
        }
    }
}

/// Named predicate over facilities, materialised as an id set
#[derive(Debug, Clone, PartialEq)]
pub struct CategorySelector {
    name: String,
    ids: FxHashSet<FacilityId>,
}

impl CategorySelector {
    pub fn from_ids(name: impl Into<String>, ids: impl IntoIterator<Item = FacilityId>) -> Self {
        Self {
            name: name.into(),
            ids: ids.into_iter().collect(),
        }
    }

    /// Selector from an arbitrary predicate evaluated over `facilities`
    pub fn from_predicate<F>(name: impl Into<String>, facilities: &FacilitySet, pred: F) -> Self
    where
        F: Fn(&Facility) -> bool,
    {
        Self::from_ids(name, facilities.iter().filter(|f| pred(f)).map(|f| f.id))
    }

    /// Narrow to one facility per distinct name (the lowest id wins)
    pub fn unique_names(&self, facilities: &FacilitySet) -> Self {
        let mut first_by_name: BTreeMap<&str, FacilityId> = BTreeMap::new();
        for f in facilities.iter().filter(|f| self.contains(f.id)) {
            first_by_name.entry(f.name.as_str()).or_insert(f.id);
        }
        Self::from_ids(
            format!("{}:unique-names", self.name),
            first_by_name.into_values(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contains(&self, id: FacilityId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids in ascending order
    pub fn sorted_ids(&self) -> Vec<FacilityId> {
        let mut ids: Vec<FacilityId> = self.ids.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Order-preserving filter of a ranked sequence
    pub fn filter(&self, ranked: &[FacilityId]) -> Vec<FacilityId> {
        ranked
            .iter()
            .copied()
            .filter(|id| self.ids.contains(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facility(id: u32, name: &str, node: NodeId, cats: &[&str]) -> Facility {
        Facility {
            id: FacilityId(id),
            name: name.to_string(),
            node,
            lat: 0.0,
            lon: 0.0,
            categories: cats.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn sample() -> FacilitySet {
        FacilitySet::new(
            vec![
                facility(2, "School", 20, &["flood", "earthquake"]),
                facility(1, "Hall", 10, &["earthquake"]),
                facility(3, "School", 30, &["earthquake"]),
            ],
            vec!["flood".to_string(), "Earthquake".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn active_sets_follow_categories() {
        let set = sample();
        let quake: Vec<u32> = set.active("earthquake").iter().map(|f| f.id.0).collect();
        assert_eq!(quake, vec![1, 2, 3]);
        let flood: Vec<u32> = set.active("flood").iter().map(|f| f.id.0).collect();
        assert_eq!(flood, vec![2]);
        assert!(set.active("tsunami").is_empty());
        assert_eq!(set.active(ALL_CATEGORY).len(), 3);
        assert!(set.has_category("earthquake"));
        assert!(!set.has_category("tsunami"));
    }

    #[test]
    fn duplicate_ids_rejected() {
        let err = FacilitySet::new(
            vec![facility(1, "A", 1, &[]), facility(1, "B", 2, &[])],
            vec![],
        );
        assert!(matches!(err, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn selector_filter_keeps_order() {
        let sel = CategorySelector::from_ids("s", [FacilityId(5), FacilityId(1)]);
        let ranked = [FacilityId(9), FacilityId(5), FacilityId(2), FacilityId(1)];
        assert_eq!(sel.filter(&ranked), vec![FacilityId(5), FacilityId(1)]);
        assert_eq!(sel.sorted_ids(), vec![FacilityId(1), FacilityId(5)]);
    }

    #[test]
    fn unique_names_keeps_lowest_id_per_name() {
        let set = sample();
        let dedup = set.selector("earthquake").unique_names(&set);
        assert_eq!(dedup.sorted_ids(), vec![FacilityId(1), FacilityId(2)]);
        assert_eq!(dedup.name(), "earthquake:unique-names");
    }

    #[test]
    fn predicate_selector() {
        let set = sample();
        let schools = CategorySelector::from_predicate("schools", &set, |f| f.name == "School");
        assert_eq!(schools.sorted_ids(), vec![FacilityId(2), FacilityId(3)]);
    }
}
