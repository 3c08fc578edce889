//! Common types for the refuge toolkit

pub mod category;
pub mod error;
pub mod ids;

pub use category::{normalize_category, suggest_category, KNOWN_CATEGORIES};
pub use error::{Error, Result};
pub use ids::{FacilityId, NodeId};
