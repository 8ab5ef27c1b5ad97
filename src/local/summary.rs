//! Phase 1: per-node partial statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{SummaryError, SummaryResult};
use crate::policy::StatisticKind;
use crate::privacy::{GuardDecision, PrivacyGuard};
use crate::types::{ColumnKind, DataSet};

/// Partial statistics of a numeric column at one node.
///
/// `None` means "not shared" (suppressed by policy, or undefined such as the minimum of an
/// all-missing column). It never stands for zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericPartial {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// Partial statistics of a categorical column at one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalPartial {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counts_unique_values: Option<BTreeMap<String, u64>>,
}

/// Partial statistics of one column, tagged with the kind the node resolved it to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocalColumnStats {
    Numeric(NumericPartial),
    Categorical(CategoricalPartial),
}

impl LocalColumnStats {
    pub fn kind(&self) -> ColumnKind {
        match self {
            LocalColumnStats::Numeric(_) => ColumnKind::Numeric,
            LocalColumnStats::Categorical(_) => ColumnKind::Categorical,
        }
    }
}

/// Everything a node shares in phase 1. Contains aggregates only, never rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalStatBundle {
    pub columns: BTreeMap<String, LocalColumnStats>,
    /// Rows with no missing value among the admitted columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_complete_rows: Option<u64>,
}

/// Compute the phase-1 bundle for already admitted and resolved `columns`.
///
/// Statistic-level policy is applied last: fields whose switch is off are stripped and
/// unique-value maps go through [`PrivacyGuard::release_unique_counts`].
pub fn compute_local_summary(
    dataset: &DataSet,
    columns: &[(String, ColumnKind)],
    guard: &PrivacyGuard<'_>,
    decision: &GuardDecision,
) -> SummaryResult<LocalStatBundle> {
    let mut idxs = Vec::with_capacity(columns.len());
    let mut out = BTreeMap::new();

    for (column, kind) in columns {
        let idx = dataset.column_index(column)?;
        idxs.push(idx);
        let stats = match kind {
            ColumnKind::Numeric => {
                LocalColumnStats::Numeric(filter_numeric(numeric_partial(dataset, idx, column)?, decision))
            }
            ColumnKind::Categorical => {
                let (partial, counts) = categorical_partial(dataset, idx);
                LocalColumnStats::Categorical(CategoricalPartial {
                    count: gate(decision, StatisticKind::Count, partial.count),
                    missing: gate(decision, StatisticKind::Missing, partial.missing),
                    counts_unique_values: guard.release_unique_counts(column, counts),
                })
            }
        };
        out.insert(column.clone(), stats);
    }

    let complete = dataset
        .rows
        .iter()
        .filter(|row| {
            idxs.iter()
                .all(|&idx| row.get(idx).is_some_and(|v| !v.is_missing()))
        })
        .count() as u64;

    Ok(LocalStatBundle {
        columns: out,
        num_complete_rows: gate(decision, StatisticKind::NumCompleteRows, Some(complete)),
    })
}

fn gate<T>(decision: &GuardDecision, kind: StatisticKind, value: Option<T>) -> Option<T> {
    if decision.allows(kind) { value } else { None }
}

fn filter_numeric(p: NumericPartial, decision: &GuardDecision) -> NumericPartial {
    NumericPartial {
        count: gate(decision, StatisticKind::Count, p.count),
        missing: gate(decision, StatisticKind::Missing, p.missing),
        sum: gate(decision, StatisticKind::Sum, p.sum),
        min: gate(decision, StatisticKind::Min, p.min),
        max: gate(decision, StatisticKind::Max, p.max),
    }
}

fn numeric_partial(dataset: &DataSet, idx: usize, column: &str) -> SummaryResult<NumericPartial> {
    let mut count = 0u64;
    let mut missing = 0u64;
    let mut sum = 0.0f64;
    let mut min: Option<f64> = None;
    let mut max: Option<f64> = None;

    for value in dataset.column_values(idx) {
        if value.is_missing() {
            missing += 1;
            continue;
        }
        let v = value.as_f64().ok_or_else(|| SummaryError::NotNumeric {
            column: column.to_string(),
        })?;
        count += 1;
        sum += v;
        min = Some(min.map_or(v, |m| m.min(v)));
        max = Some(max.map_or(v, |m| m.max(v)));
    }

    Ok(NumericPartial {
        count: Some(count),
        missing: Some(missing),
        sum: Some(sum),
        min,
        max,
    })
}

fn categorical_partial(dataset: &DataSet, idx: usize) -> (CategoricalPartial, BTreeMap<String, u64>) {
    let mut missing = 0u64;
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for value in dataset.column_values(idx) {
        match value.category_key() {
            Some(key) => *counts.entry(key).or_insert(0) += 1,
            None => missing += 1,
        }
    }
    let partial = CategoricalPartial {
        count: Some(counts.values().sum()),
        missing: Some(missing),
        counts_unique_values: None,
    };
    (partial, counts)
}
