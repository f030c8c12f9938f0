//! Popularity cross-validation
//!
//! Two platforms rank the same titles. When their ranks disagree by more than
//! `max_diff`, the secondary rank is considered wrong (usually a mismatched
//! title) and dropped.

use tracing::debug;

/// Returns `(primary, secondary)` with `secondary` cleared when it diverges
pub fn cross_validate(primary: Option<f64>, secondary: Option<f64>, max_diff: f64) -> (Option<f64>, Option<f64>) {
    match (primary, secondary) {
        (Some(p), Some(s)) if (p - s).abs() > max_diff => {
            debug!(primary = p, secondary = s, max_diff, "Discarding divergent secondary popularity");
            (primary, None)
        }
        _ => (primary, secondary),
    }
}
