//! Phase-1 merge: global totals and means.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::error::{SummaryError, SummaryResult};
use crate::local::{CategoricalPartial, LocalColumnStats, LocalStatBundle, NumericPartial};
use crate::task::VarianceRequest;
use crate::types::{ColumnKind, NodeId};

/// Federated totals of a numeric column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumericTotals {
    /// Sum of the counts of nodes that shared a count.
    pub total_count: Option<u64>,
    pub total_missing: Option<u64>,
    /// Sum over nodes that shared a sum.
    pub total_sum: Option<f64>,
    pub global_min: Option<f64>,
    pub global_max: Option<f64>,
    /// Non-zero count of every node that shared both count and sum; these nodes define the mean
    /// and, in phase 2, the variance denominator.
    pub mean_counts: BTreeMap<NodeId, u64>,
    mean_sum: f64,
}

impl NumericTotals {
    /// Global mean, or `None` when no node shared both count and sum or the count is zero.
    pub fn mean(&self) -> Option<f64> {
        let n = self.mean_counts.values().fold(0u64, |acc, &c| acc.saturating_add(c));
        if n == 0 {
            return None;
        }
        Some(self.mean_sum / n as f64).filter(|m| m.is_finite())
    }

    fn merge(&mut self, node: NodeId, p: &NumericPartial) {
        self.total_count = combine(self.total_count, p.count, u64::saturating_add);
        self.total_missing = combine(self.total_missing, p.missing, u64::saturating_add);
        self.total_sum = combine(self.total_sum, p.sum, |a, b| a + b);
        self.global_min = combine(self.global_min, p.min, f64::min);
        self.global_max = combine(self.global_max, p.max, f64::max);
        if let (Some(count), Some(sum)) = (p.count, p.sum) {
            if count > 0 {
                self.mean_counts.insert(node, count);
                self.mean_sum += sum;
            }
        }
    }
}

/// Federated totals of a categorical column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoricalTotals {
    pub total_count: Option<u64>,
    pub total_missing: Option<u64>,
    /// Additive union of the maps nodes shared; `None` if no node shared one.
    pub counts_unique_values: Option<BTreeMap<String, u64>>,
}

impl CategoricalTotals {
    fn merge(&mut self, p: &CategoricalPartial) {
        self.total_count = combine(self.total_count, p.count, u64::saturating_add);
        self.total_missing = combine(self.total_missing, p.missing, u64::saturating_add);
        if let Some(counts) = &p.counts_unique_values {
            let merged = self.counts_unique_values.get_or_insert_with(BTreeMap::new);
            for (value, n) in counts {
                let slot = merged.entry(value.clone()).or_insert(0);
                *slot = slot.saturating_add(*n);
            }
        }
    }
}

/// Totals of one column, by resolved kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnTotals {
    Numeric(NumericTotals),
    Categorical(CategoricalTotals),
}

impl ColumnTotals {
    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnTotals::Numeric(_) => ColumnKind::Numeric,
            ColumnTotals::Categorical(_) => ColumnKind::Categorical,
        }
    }

    fn empty(kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::Numeric => ColumnTotals::Numeric(NumericTotals::default()),
            ColumnKind::Categorical => ColumnTotals::Categorical(CategoricalTotals::default()),
        }
    }

    /// Totals of `kind` carrying over only the counts, for a column nobody has observed a value in.
    fn retyped(&self, kind: ColumnKind) -> Self {
        let (total_count, total_missing) = match self {
            ColumnTotals::Numeric(t) => (t.total_count, t.total_missing),
            ColumnTotals::Categorical(t) => (t.total_count, t.total_missing),
        };
        match kind {
            ColumnKind::Numeric => ColumnTotals::Numeric(NumericTotals {
                total_count,
                total_missing,
                ..NumericTotals::default()
            }),
            ColumnKind::Categorical => ColumnTotals::Categorical(CategoricalTotals {
                total_count,
                total_missing,
                counts_unique_values: None,
            }),
        }
    }
}

/// A node that saw no value in a column resolved its kind from nothing, so that kind is not binding.
fn is_unobserved(stats: &LocalColumnStats) -> bool {
    match stats {
        LocalColumnStats::Numeric(p) => p.count == Some(0),
        LocalColumnStats::Categorical(p) => p.count == Some(0),
    }
}

/// An unobserved partial restated as `kind`: zero count and the node's missing count.
fn unobserved_as(kind: ColumnKind, stats: &LocalColumnStats) -> LocalColumnStats {
    let missing = match stats {
        LocalColumnStats::Numeric(p) => p.missing,
        LocalColumnStats::Categorical(p) => p.missing,
    };
    match kind {
        ColumnKind::Numeric => LocalColumnStats::Numeric(NumericPartial {
            count: Some(0),
            missing,
            ..NumericPartial::default()
        }),
        ColumnKind::Categorical => LocalColumnStats::Categorical(CategoricalPartial {
            count: Some(0),
            missing,
            counts_unique_values: None,
        }),
    }
}

#[derive(Debug, Clone)]
struct TrackedColumn {
    /// Node that fixed the kind (or first reported the column, while `observed` is false).
    first_node: NodeId,
    totals: ColumnTotals,
    /// Some node has seen at least one value.
    observed: bool,
}

/// Central phase-1 accumulator.
///
/// Every merge rule is associative and commutative. [`GlobalStatBundle::from_bundles`] also
/// merges in node order so floating point sums do not depend on the order responses arrived in.
#[derive(Debug, Clone, Default)]
pub struct GlobalStatBundle {
    columns: BTreeMap<String, TrackedColumn>,
    num_complete_rows: BTreeMap<NodeId, u64>,
    contributors: BTreeSet<NodeId>,
}

impl GlobalStatBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the bundles of all contributing nodes.
    pub fn from_bundles(bundles: impl IntoIterator<Item = (NodeId, LocalStatBundle)>) -> SummaryResult<Self> {
        let mut bundles: Vec<_> = bundles.into_iter().collect();
        bundles.sort_by_key(|(node, _)| *node);
        let mut out = Self::new();
        for (node, bundle) in &bundles {
            out.merge(*node, bundle)?;
        }
        Ok(out)
    }

    /// Merge one node's bundle.
    ///
    /// Fails with [`SummaryError::ColumnTypeMismatch`] if the node resolved a column to a kind
    /// other than the one already recorded. A column in which a node saw no value (`count` of
    /// zero) never decides the kind: its missing count is folded into whatever kind the other
    /// nodes settle on. A second bundle from the same node is ignored.
    pub fn merge(&mut self, node: NodeId, bundle: &LocalStatBundle) -> SummaryResult<()> {
        if self.contributors.contains(&node) {
            warn!(%node, "ignoring a second summary from the same node");
            return Ok(());
        }

        for (column, stats) in &bundle.columns {
            if let Some(tracked) = self.columns.get(column) {
                if tracked.observed && !is_unobserved(stats) && tracked.totals.kind() != stats.kind() {
                    return Err(SummaryError::ColumnTypeMismatch {
                        column: column.clone(),
                        first_node: tracked.first_node,
                        first: tracked.totals.kind(),
                        node,
                        kind: stats.kind(),
                    });
                }
            }
        }

        for (column, stats) in &bundle.columns {
            let unobserved = is_unobserved(stats);
            let tracked = self.columns.entry(column.clone()).or_insert_with(|| TrackedColumn {
                first_node: node,
                totals: ColumnTotals::empty(stats.kind()),
                observed: false,
            });

            let restated;
            let stats = if tracked.totals.kind() == stats.kind() {
                stats
            } else if unobserved {
                debug!(column = column.as_str(), %node, "no values at node; merged under the column's kind");
                restated = unobserved_as(tracked.totals.kind(), stats);
                &restated
            } else {
                // Only reachable while no node has observed a value; checked above.
                tracked.totals = tracked.totals.retyped(stats.kind());
                stats
            };
            if !unobserved && !tracked.observed {
                tracked.observed = true;
                tracked.first_node = node;
            }

            match (&mut tracked.totals, stats) {
                (ColumnTotals::Numeric(t), LocalColumnStats::Numeric(p)) => t.merge(node, p),
                (ColumnTotals::Categorical(t), LocalColumnStats::Categorical(p)) => t.merge(p),
                _ => unreachable!("column kinds aligned above"),
            }
        }

        if let Some(rows) = bundle.num_complete_rows {
            self.num_complete_rows.insert(node, rows);
        }
        self.contributors.insert(node);
        Ok(())
    }

    /// Totals of `column`, if any node shared it.
    pub fn column(&self, column: &str) -> Option<&ColumnTotals> {
        self.columns.get(column).map(|t| &t.totals)
    }

    /// All columns in name order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &ColumnTotals)> {
        self.columns.iter().map(|(name, t)| (name.as_str(), &t.totals))
    }

    /// Numeric columns in name order.
    pub fn numeric_columns(&self) -> impl Iterator<Item = (&str, &NumericTotals)> {
        self.columns().filter_map(|(name, totals)| match totals {
            ColumnTotals::Numeric(t) => Some((name, t)),
            ColumnTotals::Categorical(_) => None,
        })
    }

    /// Complete-row counts of the nodes that shared them.
    pub fn num_complete_rows(&self) -> &BTreeMap<NodeId, u64> {
        &self.num_complete_rows
    }

    /// Nodes merged so far.
    pub fn contributors(&self) -> &BTreeSet<NodeId> {
        &self.contributors
    }

    /// Freeze the defined global means for phase 2.
    pub fn means(&self) -> GlobalMeans {
        GlobalMeans {
            means: self
                .numeric_columns()
                .filter_map(|(name, t)| t.mean().map(|m| (name.to_string(), m)))
                .collect(),
        }
    }
}

/// Global means handed from phase 1 to phase 2. Columns whose mean is undefined are absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalMeans {
    means: BTreeMap<String, f64>,
}

impl GlobalMeans {
    pub fn get(&self, column: &str) -> Option<f64> {
        self.means.get(column).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.means.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.means.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Phase-2 payload carrying these means.
    pub fn to_request(&self) -> VarianceRequest {
        VarianceRequest {
            means: self.means.clone(),
        }
    }
}

fn combine<T>(acc: Option<T>, value: Option<T>, f: impl Fn(T, T) -> T) -> Option<T> {
    match (acc, value) {
        (Some(a), Some(b)) => Some(f(a, b)),
        (a, None) => a,
        (None, b) => b,
    }
}
