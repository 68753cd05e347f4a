//! Drift severity classification

use crate::models::drift::{DriftResult, Severity};

/// Fragment marking a child-safety field in a difference path
const CHILD_SAFETY_MARKER: &str = "child";

/// Classify severity across the per-detector results of one comparison.
///
/// Counts map to none/low/medium/high (0 / <=2 / <=5 / >5). Any difference
/// on a child-safety field escalates to critical, unless the keyword
/// endpoint is known not to implement writes, in which case the result is
/// medium.
pub fn classify(results: &[&DriftResult], known_limitation: bool) -> Severity {
    let total: usize = results.iter().map(|r| r.differences.len()).sum();

    let by_count = match total {
        0 => Severity::None,
        1..=2 => Severity::Low,
        3..=5 => Severity::Medium,
        _ => Severity::High,
    };

    let touches_child_safety = results
        .iter()
        .flat_map(|r| r.differences.iter())
        .any(|d| d.path.to_lowercase().contains(CHILD_SAFETY_MARKER));

    if !touches_child_safety {
        return by_count;
    }

    if known_limitation {
        Severity::Medium
    } else {
        Severity::Critical
    }
}
