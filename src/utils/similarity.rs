use std::time::Duration;

use similar::{Algorithm, TextDiff};

/// Character-level similarity in `[0.0, 1.0]`: `2 * matched / (len_a + len_b)`.
///
/// Identical inputs (including two empty strings) score 1.0. The diff gives up
/// refining after `timeout`, so very large bodies yield an approximate ratio
/// instead of stalling a fuzzing worker.
pub fn similarity_ratio(a: &str, b: &str, timeout: Duration) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let ratio = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .timeout(timeout)
        .diff_chars(a, b)
        .ratio();
    f64::from(ratio).clamp(0.0, 1.0)
}
