//! Hazard categories and fuzzy matching for category names
//!
//! Category names are free-form (one per boolean column of the facility table),
//! but the toolkit ships the hazard list used by Japanese municipal shelter data
//! so that typos on the command line can be corrected.

use strsim::{jaro_winkler, normalized_levenshtein};

/// Hazard categories with a designated-shelter column in municipal data
pub const KNOWN_CATEGORIES: &[&str] = &[
    "flood",
    "landslides_debrisflow_mudslides",
    "storm_surge",
    "earthquake",
    "tsunami",
    "largescale_fire",
    "inlandflooding",
    "volcanic_phenomena",
];

/// Best fuzzy match using character similarity plus semantic bonuses
///
/// Jaro-Winkler 70% + Normalized Levenshtein 30%, with a prefix bonus and a
/// bonus for closely matching one `_`-separated component of a compound name
/// (`"landslide"` → `landslides_debrisflow_mudslides`). Threshold 0.65.
fn find_best_fuzzy_match<S: AsRef<str>>(input: &str, candidates: &[S]) -> Option<String> {
    let input_lower = input.to_lowercase();
    let mut best_match = None;
    let mut best_score = 0.0f64;

    let min_threshold = 0.65;

    for candidate in candidates {
        let candidate_lower = candidate.as_ref().to_lowercase();

        let jw_score = jaro_winkler(&input_lower, &candidate_lower);
        let lev_score = normalized_levenshtein(&input_lower, &candidate_lower);
        let combined_score = (jw_score * 0.7) + (lev_score * 0.3);

        let mut semantic_bonus = 0.0;

        let prefix_len = input_lower.chars().count().min(7);
        if prefix_len >= 4 {
            let input_prefix = input_lower.chars().take(prefix_len).collect::<String>();
            let candidate_prefix = candidate_lower.chars().take(prefix_len).collect::<String>();

            let prefix_similarity = normalized_levenshtein(&input_prefix, &candidate_prefix);
            if prefix_similarity > 0.7 {
                semantic_bonus += 0.2 * prefix_similarity;
            }
        }

        if candidate_lower.contains('_') {
            for part in candidate_lower.split('_') {
                if part.len() >= 4 {
                    let part_similarity = jaro_winkler(&input_lower, part);
                    if part_similarity > 0.85 {
                        semantic_bonus += 0.12 * part_similarity;
                    }
                }
            }
        }

        let final_score = combined_score + semantic_bonus;

        if final_score >= min_threshold && final_score > best_score {
            best_score = final_score;
            best_match = Some(candidate.as_ref().to_string());
        }
    }

    best_match
}

/// Suggest a known category for a possibly misspelled name
///
/// Returns `None` for an exact (case-insensitive) match or when nothing is close.
pub fn suggest_category<S: AsRef<str>>(name: &str, candidates: &[S]) -> Option<String> {
    if candidates.iter().any(|c| c.as_ref().eq_ignore_ascii_case(name)) {
        return None;
    }
    find_best_fuzzy_match(name, candidates)
}

/// Normalise a column header into a category key (`"Storm Surge"` → `storm_surge`)
pub fn normalize_category(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_whitespace() || c == '-' {
                '_'
            } else {
                c
            }
        })
        .collect()
}
