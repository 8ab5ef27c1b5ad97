//! Phase 2: per-node partial variance around the global mean.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{SummaryError, SummaryResult};
use crate::policy::StatisticKind;
use crate::privacy::GuardDecision;
use crate::types::DataSet;

/// Everything a node shares in phase 2.
///
/// `variance_sums[c]` is `Σ (x − mean_c)²` over the node's non-missing values of `c`. A column is
/// absent when the node withheld it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalVarianceBundle {
    pub variance_sums: BTreeMap<String, f64>,
}

/// Compute the phase-2 bundle for the admitted columns among `means`.
///
/// Nothing is shared if either the variance or the standard deviation switch is off.
pub fn compute_local_variance(
    dataset: &DataSet,
    means: &BTreeMap<String, f64>,
    decision: &GuardDecision,
) -> SummaryResult<LocalVarianceBundle> {
    if !decision.allows(StatisticKind::Variance) || !decision.allows(StatisticKind::Std) {
        return Ok(LocalVarianceBundle::default());
    }

    let mut variance_sums = BTreeMap::new();
    for column in &decision.allowed_columns {
        let Some(&mean) = means.get(column) else {
            continue;
        };
        let idx = dataset.column_index(column)?;
        let mut acc = 0.0f64;
        for value in dataset.column_values(idx).filter(|v| !v.is_missing()) {
            let x = value.as_f64().ok_or_else(|| SummaryError::NotNumeric {
                column: column.clone(),
            })?;
            acc += (x - mean) * (x - mean);
        }
        variance_sums.insert(column.clone(), acc);
    }

    Ok(LocalVarianceBundle { variance_sums })
}
