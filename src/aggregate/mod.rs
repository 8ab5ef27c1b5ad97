//! Central aggregation.
//!
//! [`CentralAggregator::run`] drives the protocol as two explicit barriers:
//!
//! 1. dispatch the summary phase, merge the bundles into a [`GlobalStatBundle`], freeze the
//!    [`GlobalMeans`]
//! 2. dispatch the variance phase with those means to the phase-1 contributors, merge the variance
//!    sums into standard deviations ([`merge_variance()`])
//!
//! and then assembles the [`SummaryReport`]. The aggregator never sees a row of data.
//!
//! ## Example
//!
//! ```rust
//! use federated_summary::aggregate::CentralAggregator;
//! use federated_summary::dispatch::{DispatchOptions, InProcessDispatcher};
//! use federated_summary::local::DataStation;
//! use federated_summary::policy::PolicyConfig;
//! use federated_summary::task::SummaryTask;
//! use federated_summary::types::{DataSet, DataType, Field, NodeId, Schema, Value};
//!
//! let station = |id: u64, values: &[i64]| {
//!     let schema = Schema::new(vec![Field::new("x", DataType::Int64)]);
//!     let rows = values.iter().map(|v| vec![Value::Int64(*v)]).collect();
//!     let policy = PolicyConfig { minimum_rows: 2, ..PolicyConfig::default() };
//!     DataStation::new(NodeId(id), DataSet::new(schema, rows), policy)
//! };
//!
//! let dispatcher = InProcessDispatcher::new(
//!     vec![station(1, &[1, 2, 3]), station(2, &[4, 5])],
//!     DispatchOptions::default(),
//! );
//! let report = CentralAggregator::new(dispatcher).run(&SummaryTask::default()).unwrap();
//!
//! let x = &report.numeric["x"];
//! assert_eq!(x.count, Some(5));
//! assert_eq!(x.mean, Some(3.0));
//! assert_eq!(x.std, Some(2.0f64.sqrt()));
//! ```

mod global;
mod report;
mod variance;

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::dispatch::{NodeDispatcher, NodeOutcome, NodeResult, Phase};
use crate::error::{SummaryError, SummaryResult};
use crate::task::SummaryTask;
use crate::types::NodeId;

pub use global::{CategoricalTotals, ColumnTotals, GlobalMeans, GlobalStatBundle, NumericTotals};
pub use report::{CategoricalSummary, NodeParticipation, NodeStatus, NumericSummary, SummaryReport};
pub use variance::merge_variance;

/// Configuration for the [`CentralAggregator`].
#[derive(Debug, Clone, Default)]
pub struct AggregatorOptions {
    /// Report a standard deviation only if every node that defined the mean also shared its
    /// variance sum. By default the std is computed over the nodes that did.
    pub require_all_variance: bool,
}

/// Coordinates a federated summary over the nodes reachable through `D`.
pub struct CentralAggregator<D> {
    dispatcher: D,
    opts: AggregatorOptions,
}

impl<D: NodeDispatcher> CentralAggregator<D> {
    pub fn new(dispatcher: D) -> Self {
        Self {
            dispatcher,
            opts: AggregatorOptions::default(),
        }
    }

    pub fn with_options(mut self, opts: AggregatorOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut D {
        &mut self.dispatcher
    }

    /// Run both phases for `task` and return the report.
    ///
    /// Fails if the task is invalid, if any node reports an error, if nodes disagree on a
    /// column's kind, or if no node contributes to the summary phase. Nodes that are excluded by
    /// their policy or do not answer are left out of every aggregate.
    pub fn run(&self, task: &SummaryTask) -> SummaryResult<SummaryReport> {
        task.validate()?;
        let nodes = self.target_nodes(task);
        let mut participation: BTreeMap<NodeId, NodeParticipation> =
            nodes.iter().map(|n| (*n, NodeParticipation::default())).collect();
        info!(nodes = nodes.len(), "starting federated summary");

        let outcomes = self.dispatcher.dispatch_summary(&nodes, &task.summary_request());
        let summaries = collect_phase(Phase::Summary, &nodes, outcomes, &mut participation)?;
        if summaries.is_empty() {
            return Err(SummaryError::NoParticipatingNodes);
        }
        let totals = GlobalStatBundle::from_bundles(summaries)?;
        let means = totals.means();
        info!(
            contributors = totals.contributors().len(),
            numeric_means = means.iter().count(),
            "summary phase merged"
        );

        let variances = if means.is_empty() {
            Vec::new()
        } else {
            let contributors: Vec<NodeId> = totals.contributors().iter().copied().collect();
            let outcomes = self.dispatcher.dispatch_variance(&contributors, &means.to_request());
            collect_phase(Phase::Variance, &contributors, outcomes, &mut participation)?
        };
        let std = merge_variance(&totals, variances, self.opts.require_all_variance);
        info!(columns_with_std = std.len(), "variance phase merged");

        Ok(SummaryReport::assemble(&totals, &std, participation))
    }

    /// Requested organizations (deduplicated, in id order), or every known node.
    /// Nodes named by the task, or every known node when it names none.
    fn target_nodes(&self, task: &SummaryTask) -> Vec<NodeId> {
        let mut nodes = match &task.organizations_to_include {
            Some(orgs) if !orgs.is_empty() => orgs.clone(),
            _ => self.dispatcher.nodes(),
        };
        nodes.sort();
        nodes.dedup();
        nodes
    }
}

/// Record each node's status for `phase` and keep the shared payloads.
///
/// Nodes with no outcome count as unreachable. The first failure in node order aborts the run.
fn collect_phase<T>(
    phase: Phase,
    nodes: &[NodeId],
    outcomes: Vec<NodeOutcome<T>>,
    participation: &mut BTreeMap<NodeId, NodeParticipation>,
) -> SummaryResult<Vec<(NodeId, T)>> {
    let mut by_node: BTreeMap<NodeId, NodeResult<T>> = BTreeMap::new();
    for outcome in outcomes {
        if nodes.binary_search(&outcome.node).is_err() {
            warn!(%phase, node = %outcome.node, "ignoring an answer from a node that was not dispatched");
            continue;
        }
        if by_node.contains_key(&outcome.node) {
            warn!(%phase, node = %outcome.node, "ignoring a second answer from the same node");
            continue;
        }
        by_node.insert(outcome.node, outcome.result);
    }

    let mut shared = Vec::new();
    for &node in nodes {
        let status = match by_node.remove(&node) {
            Some(NodeResult::Completed(bundle)) => {
                shared.push((node, bundle));
                NodeStatus::Contributed
            }
            Some(NodeResult::Excluded(reason)) => NodeStatus::Excluded { reason },
            Some(NodeResult::Unreachable) | None => NodeStatus::Unreachable,
            Some(NodeResult::Failed(message)) => return Err(SummaryError::NodeFailed { node, message }),
        };
        let entry = participation.entry(node).or_default();
        match phase {
            Phase::Summary => entry.summary = status,
            Phase::Variance => entry.variance = status,
        }
    }
    Ok(shared)
}
