//! Identifier types shared across crates

use serde::{Deserialize, Serialize};
use std::fmt;

/// Graph node identifier (OSM node id in practice)
pub type NodeId = i64;

/// Stable facility identifier, the payload stored in rankings
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacilityId(pub u32);

impl fmt::Display for FacilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for FacilityId {
    fn from(id: u32) -> Self {
        FacilityId(id)
    }
}
