//! Progress bar for ranking builds

use std::sync::Arc;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::engine::ProgressFn;

const TEMPLATE: &str =
    "{spinner:.green} {prefix} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} searches ETA: {eta}";

/// Bar counting finished source searches
pub fn create_progress_bar(total: u64, category: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_prefix(category.to_string());
    pb
}

/// Hidden bar, used when output is not a terminal or logs are JSON
pub fn hidden_progress_bar() -> ProgressBar {
    ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden())
}

/// Engine callback that drives `pb`
pub fn progress_callback(pb: &ProgressBar) -> ProgressFn {
    let pb = pb.clone();
    Arc::new(move |done, total| {
        if pb.length() != Some(total) {
            pb.set_length(total);
        }
        pb.set_position(done);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_is_prefixed_with_category() {
        let pb = create_progress_bar(12, "flood");
        assert_eq!(pb.length(), Some(12));
        assert_eq!(pb.prefix(), "flood");
        pb.set_position(5);
        pb.finish();
    }

    #[test]
    fn callback_tracks_engine_counts() {
        let pb = hidden_progress_bar();
        let report = progress_callback(&pb);
        report(3, 8);
        assert_eq!(pb.length(), Some(8));
        assert_eq!(pb.position(), 3);
        report(8, 8);
        assert_eq!(pb.position(), 8);
    }
}
