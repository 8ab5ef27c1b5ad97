//! Phase-2 merge: global standard deviation.

use std::collections::BTreeMap;

use tracing::debug;

use crate::local::LocalVarianceBundle;
use crate::types::NodeId;

use super::global::GlobalStatBundle;

/// Merge phase-2 bundles into a population standard deviation per numeric column.
///
/// For a column, only nodes that shared a variance sum *and* defined the mean in phase 1 are
/// used, and the denominator is the sum of exactly those nodes' counts. The std is left out when
/// no node qualifies, when that count is `<= 1`, or, with `require_all`, when any mean
/// contributor did not share its variance sum.
pub fn merge_variance(
    totals: &GlobalStatBundle,
    bundles: impl IntoIterator<Item = (NodeId, LocalVarianceBundle)>,
    require_all: bool,
) -> BTreeMap<String, f64> {
    let bundles: BTreeMap<NodeId, LocalVarianceBundle> = bundles.into_iter().collect();
    let mut out = BTreeMap::new();

    for (column, numeric) in totals.numeric_columns() {
        if numeric.mean().is_none() {
            continue;
        }

        let mut numerator = 0.0f64;
        let mut denominator = 0u64;
        let mut contributors = 0usize;
        for (node, bundle) in &bundles {
            let (Some(sum), Some(count)) = (bundle.variance_sums.get(column), numeric.mean_counts.get(node)) else {
                continue;
            };
            numerator += sum;
            denominator = denominator.saturating_add(*count);
            contributors += 1;
        }

        if contributors == 0 || denominator <= 1 {
            debug!(column, contributors, denominator, "standard deviation unavailable");
            continue;
        }
        if require_all && contributors < numeric.mean_counts.len() {
            debug!(
                column,
                contributors,
                expected = numeric.mean_counts.len(),
                "standard deviation unavailable: not every node shared its variance"
            );
            continue;
        }

        let std = (numerator / denominator as f64).sqrt();
        if std.is_finite() {
            out.insert(column.to_string(), std);
        }
    }

    out
}
