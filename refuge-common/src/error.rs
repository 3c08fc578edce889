//! Error types for the refuge toolkit
//!
//! Construction errors (graph, facility set) abort the operation that hit them.
//! Unreachability is never an error: it shows up as a shorter ranking sequence.

use crate::ids::{FacilityId, NodeId};
use thiserror::Error;

/// Main error type for refuge operations
#[derive(Debug, Error)]
pub enum Error {
    /// A referenced node id is absent from the graph
    #[error("Node {0} is not part of the graph")]
    UnknownNode(NodeId),

    /// A ranking was requested over zero active facilities
    #[error("No active facilities for category '{0}', nothing to rank")]
    EmptyFacilitySet(String),

    /// No artifact and no derivable superset for the category
    #[error("No ranking available for category '{category}'{}", did_you_mean(.suggestion))]
    RankingNotFound {
        category: String,
        suggestion: Option<String>,
    },

    /// The base ranking does not cover every facility active for the derived category
    #[error(
        "Cannot derive '{category}' from '{base}': {} active facilities missing from the base (first: {})",
        .missing.len(),
        first_missing(.missing)
    )]
    InvalidDerivation {
        category: String,
        base: String,
        missing: Vec<FacilityId>,
    },

    /// Negative or non-finite weight, dangling edge, duplicate node
    #[error("Malformed graph: {0}")]
    MalformedGraph(String),

    /// Ranks are 1-based
    #[error("Invalid rank {0}: ranks start at 1")]
    InvalidRank(usize),

    /// Invalid configuration or parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Artifact failed magic, version or checksum validation
    #[error("Corrupt ranking artifact: {0}")]
    CorruptArtifact(String),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean '{s}'?)"),
        None => String::new(),
    }
}

fn first_missing(missing: &[FacilityId]) -> String {
    missing
        .first()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string())
}

impl Error {
    /// Whether the caller can recover by computing the ranking from scratch
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::RankingNotFound { .. })
    }
}

/// Convenience result type for refuge operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranking_not_found_mentions_suggestion() {
        let err = Error::RankingNotFound {
            category: "flod".to_string(),
            suggestion: Some("flood".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("'flod'"));
        assert!(msg.contains("did you mean 'flood'"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn invalid_derivation_reports_first_missing_id() {
        let err = Error::InvalidDerivation {
            category: "tsunami".to_string(),
            base: "earthquake".to_string(),
            missing: vec![FacilityId(7), FacilityId(9)],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 active facilities missing"));
        assert!(msg.contains("first: 7"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
