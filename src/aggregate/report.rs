//! The final, client-facing report.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SummaryResult;
use crate::privacy::ExclusionReason;
use crate::types::NodeId;

use super::global::{ColumnTotals, GlobalStatBundle};

/// Federated statistics of a numeric column. Every field is absent when it could not be computed
/// or no node shared it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    /// Population standard deviation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum: Option<f64>,
}

/// Federated statistics of a categorical column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counts_unique_values: Option<BTreeMap<String, u64>>,
}

/// How a node took part in one phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NodeStatus {
    /// The phase was never sent to the node.
    #[default]
    NotDispatched,
    /// The node shared its partial result.
    Contributed,
    /// The node's policy kept it out.
    Excluded { reason: ExclusionReason },
    /// The node did not answer.
    Unreachable,
}

/// Per-phase participation of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeParticipation {
    pub summary: NodeStatus,
    pub variance: NodeStatus,
}

/// Result of a federated summary run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub numeric: BTreeMap<String, NumericSummary>,
    pub categorical: BTreeMap<String, CategoricalSummary>,
    /// Complete-row count of each node that shared it.
    pub num_complete_rows_per_node: BTreeMap<NodeId, u64>,
    pub participation: BTreeMap<NodeId, NodeParticipation>,
}

impl SummaryReport {
    /// Build the report from the phase-1 totals and the phase-2 standard deviations.
    pub fn assemble(
        totals: &GlobalStatBundle,
        std: &BTreeMap<String, f64>,
        participation: BTreeMap<NodeId, NodeParticipation>,
    ) -> Self {
        let mut numeric = BTreeMap::new();
        let mut categorical = BTreeMap::new();

        for (name, column) in totals.columns() {
            match column {
                ColumnTotals::Numeric(t) => {
                    numeric.insert(
                        name.to_string(),
                        NumericSummary {
                            count: t.total_count,
                            mean: t.mean(),
                            std: std.get(name).copied(),
                            min: t.global_min.filter(|v| v.is_finite()),
                            max: t.global_max.filter(|v| v.is_finite()),
                            missing: t.total_missing,
                            sum: t.total_sum.filter(|v| v.is_finite()),
                        },
                    );
                }
                ColumnTotals::Categorical(t) => {
                    categorical.insert(
                        name.to_string(),
                        CategoricalSummary {
                            count: t.total_count,
                            missing: t.total_missing,
                            counts_unique_values: t.counts_unique_values.clone(),
                        },
                    );
                }
            }
        }

        Self {
            numeric,
            categorical,
            num_complete_rows_per_node: totals.num_complete_rows().clone(),
            participation,
        }
    }

    /// Encode as pretty-printed JSON; absent statistics are omitted.
    pub fn to_json(&self) -> SummaryResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
