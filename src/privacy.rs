//! Privacy guard: decides what a node may disclose for one phase of a run.
//!
//! The guard is a pure function of the node's dataset, the requested columns and its
//! [`PolicyConfig`]. It is evaluated before anything is computed and again for each phase.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::policy::{PolicyConfig, StatCapabilities, StatisticKind};
use crate::types::DataSet;

/// Why a node did not take part in a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    /// The node holds fewer rows than its `minimum_rows` policy.
    BelowMinimumRows { rows: usize, minimum_rows: usize },
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::BelowMinimumRows { rows, minimum_rows } => {
                write!(f, "{rows} rows is below the minimum of {minimum_rows}")
            }
        }
    }
}

/// Outcome of [`PrivacyGuard::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardDecision {
    /// `false` if the node sits out this phase entirely.
    pub participates: bool,
    /// Set when `participates` is `false`.
    pub exclusion: Option<ExclusionReason>,
    /// Requested columns that pass the allow/deny lists, in request order.
    pub allowed_columns: Vec<String>,
    /// Statistics the node may share.
    pub capabilities: StatCapabilities,
}

impl GuardDecision {
    /// Whether `kind` may be shared under this decision.
    pub fn allows(&self, kind: StatisticKind) -> bool {
        self.participates && self.capabilities.allows(kind)
    }
}

/// Evaluates a node's [`PolicyConfig`].
#[derive(Debug, Clone)]
pub struct PrivacyGuard<'a> {
    policy: &'a PolicyConfig,
}

impl<'a> PrivacyGuard<'a> {
    pub fn new(policy: &'a PolicyConfig) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PolicyConfig {
        self.policy
    }

    /// Decide participation, column admission and statistic admission.
    ///
    /// The row-count gate runs first: a node below `minimum_rows` admits no column at all, so not
    /// even aggregate counts of a tiny partition escape. With `enforce_column_minimum_rows`, a
    /// column with fewer than `minimum_rows` non-missing values is withheld on its own.
    pub fn evaluate(&self, dataset: &DataSet, columns: &[String]) -> GuardDecision {
        let rows = dataset.row_count();
        if rows < self.policy.minimum_rows {
            let reason = ExclusionReason::BelowMinimumRows {
                rows,
                minimum_rows: self.policy.minimum_rows,
            };
            debug!(%reason, "node excluded by row-count gate");
            return GuardDecision {
                participates: false,
                exclusion: Some(reason),
                allowed_columns: Vec::new(),
                capabilities: self.policy.capabilities,
            };
        }

        if !self.policy.allowed_columns.is_empty() && !self.policy.disallowed_columns.is_empty() {
            warn!("both allowed and disallowed columns are configured; the allow-list wins");
        }

        let allowed_columns: Vec<String> = columns
            .iter()
            .filter(|c| {
                let admitted = self.policy.admits_column(c);
                if !admitted {
                    debug!(column = %c, "column withheld by node policy");
                }
                admitted
            })
            .filter(|c| {
                if !self.policy.enforce_column_minimum_rows {
                    return true;
                }
                // Unknown columns are left for the computation to reject.
                let Some(idx) = dataset.schema.index_of(c) else {
                    return true;
                };
                let present = dataset.column_values(idx).filter(|v| !v.is_missing()).count();
                if present < self.policy.minimum_rows {
                    debug!(column = %c, present, minimum_rows = self.policy.minimum_rows, "column withheld: too few values");
                    return false;
                }
                true
            })
            .cloned()
            .collect();

        GuardDecision {
            participates: true,
            exclusion: None,
            allowed_columns,
            capabilities: self.policy.capabilities,
        }
    }

    /// Apply the unique-value-count rules to a node's local map for `column`.
    ///
    /// The map is released only if the statistic is allowed and the number of distinct values is
    /// at least `privacy_threshold`. With `mask_low_frequency_values`, a single value observed
    /// fewer than `privacy_threshold` times also withholds the whole map. A withheld map is
    /// dropped, never zero-filled.
    pub fn release_unique_counts(
        &self,
        column: &str,
        counts: BTreeMap<String, u64>,
    ) -> Option<BTreeMap<String, u64>> {
        if !self.policy.capabilities.allows(StatisticKind::CountsUniqueValues) {
            return None;
        }
        let threshold = self.policy.privacy_threshold;
        if counts.len() < threshold {
            debug!(column, distinct = counts.len(), threshold, "unique-value counts withheld");
            return None;
        }
        if self.policy.mask_low_frequency_values && counts.values().any(|&n| (n as usize) < threshold) {
            warn!(column, threshold, "unique-value counts contain low-frequency values; all counts masked");
            return None;
        }
        Some(counts)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use super::{ExclusionReason, PrivacyGuard};
    use crate::policy::{PolicyConfig, StatCapabilities, StatisticKind};
    use crate::types::{DataSet, DataType, Field, Schema, Value};

    fn dataset_of(n: i64) -> DataSet {
        let schema = Schema::new(vec![
            Field::new("age", DataType::Int64),
            Field::new("city", DataType::Utf8),
        ]);
        let rows = (0..n)
            .map(|i| vec![Value::Int64(i), Value::Utf8(format!("c{i}"))])
            .collect();
        DataSet::new(schema, rows)
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn counts(pairs: &[(&str, u64)]) -> BTreeMap<String, u64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn node_below_minimum_rows_does_not_participate() {
        let policy = PolicyConfig::default();
        let decision = PrivacyGuard::new(&policy).evaluate(&dataset_of(4), &cols(&["age", "city"]));
        assert!(!decision.participates);
        assert!(decision.allowed_columns.is_empty());
        assert_eq!(
            decision.exclusion,
            Some(ExclusionReason::BelowMinimumRows {
                rows: 4,
                minimum_rows: 5
            })
        );
        assert!(!decision.allows(StatisticKind::Count));
    }

    #[test]
    fn node_at_minimum_rows_participates() {
        let policy = PolicyConfig::default();
        let decision = PrivacyGuard::new(&policy).evaluate(&dataset_of(5), &cols(&["age", "city"]));
        assert!(decision.participates);
        assert_eq!(decision.allowed_columns, cols(&["age", "city"]));
    }

    #[test]
    fn allow_list_restricts_columns_and_overrides_deny_list() {
        let policy = PolicyConfig {
            allowed_columns: BTreeSet::from(["city".to_string()]),
            disallowed_columns: BTreeSet::from(["city".to_string()]),
            ..PolicyConfig::default()
        };
        let decision = PrivacyGuard::new(&policy).evaluate(&dataset_of(10), &cols(&["age", "city"]));
        assert_eq!(decision.allowed_columns, cols(&["city"]));
    }

    #[test]
    fn deny_list_removes_columns() {
        let policy = PolicyConfig {
            disallowed_columns: BTreeSet::from(["age".to_string()]),
            ..PolicyConfig::default()
        };
        let decision = PrivacyGuard::new(&policy).evaluate(&dataset_of(10), &cols(&["age", "city"]));
        assert_eq!(decision.allowed_columns, cols(&["city"]));
    }

    #[test]
    fn sparse_columns_are_withheld_only_when_enforced() {
        // 6 rows, "age" has 4 values
        let mut ds = dataset_of(6);
        for row in ds.rows.iter_mut().take(2) {
            row[0] = Value::Null;
        }
        let mut policy = PolicyConfig {
            minimum_rows: 5,
            ..PolicyConfig::default()
        };
        let decision = PrivacyGuard::new(&policy).evaluate(&ds, &cols(&["age", "city", "unknown"]));
        assert_eq!(decision.allowed_columns, cols(&["age", "city", "unknown"]));

        policy.enforce_column_minimum_rows = true;
        let decision = PrivacyGuard::new(&policy).evaluate(&ds, &cols(&["age", "city", "unknown"]));
        assert!(decision.participates);
        assert_eq!(decision.allowed_columns, cols(&["city", "unknown"]));
    }

    #[test]
    fn statistic_switches_are_independent_of_columns() {
        let policy = PolicyConfig {
            capabilities: StatCapabilities::all().with(StatisticKind::Min, false),
            ..PolicyConfig::default()
        };
        let decision = PrivacyGuard::new(&policy).evaluate(&dataset_of(10), &cols(&["age"]));
        assert!(!decision.allows(StatisticKind::Min));
        assert!(decision.allows(StatisticKind::Max));
        assert_eq!(decision.allowed_columns, cols(&["age"]));
    }

    #[test]
    fn unique_counts_require_threshold_distinct_values() {
        let policy = PolicyConfig {
            privacy_threshold: 3,
            ..PolicyConfig::default()
        };
        let guard = PrivacyGuard::new(&policy);
        assert_eq!(guard.release_unique_counts("c", counts(&[("a", 10), ("b", 10)])), None);
        let three = counts(&[("a", 1), ("b", 10), ("c", 10)]);
        assert_eq!(guard.release_unique_counts("c", three.clone()), Some(three));
    }

    #[test]
    fn unique_counts_respect_switch() {
        let policy = PolicyConfig {
            privacy_threshold: 1,
            capabilities: StatCapabilities::all().with(StatisticKind::CountsUniqueValues, false),
            ..PolicyConfig::default()
        };
        let guard = PrivacyGuard::new(&policy);
        assert_eq!(guard.release_unique_counts("c", counts(&[("a", 10)])), None);
    }

    #[test]
    fn low_frequency_masking_withholds_whole_map() {
        let policy = PolicyConfig {
            privacy_threshold: 2,
            mask_low_frequency_values: true,
            ..PolicyConfig::default()
        };
        let guard = PrivacyGuard::new(&policy);
        assert_eq!(guard.release_unique_counts("c", counts(&[("a", 1), ("b", 9)])), None);
        assert!(guard.release_unique_counts("c", counts(&[("a", 2), ("b", 9)])).is_some());
    }
}
