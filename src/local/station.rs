//! A data station: one node's private partition plus its policy.

use tracing::{debug, info};

use crate::error::SummaryResult;
use crate::policy::{PolicyConfig, PolicySource};
use crate::privacy::{ExclusionReason, PrivacyGuard};
use crate::resolver::ColumnTypeResolver;
use crate::task::{SummaryRequest, VarianceRequest};
use crate::types::{DataSet, NodeId};

use super::summary::{compute_local_summary, LocalStatBundle};
use super::variance::{compute_local_variance, LocalVarianceBundle};

/// What a station answers to a phase request.
#[derive(Debug, Clone, PartialEq)]
pub enum StationReply<T> {
    /// The node took part and shares `T`.
    Shared(T),
    /// The node's policy kept it out of this phase.
    Excluded(ExclusionReason),
}

/// One node of the federation.
///
/// The privacy guard runs at the start of every phase; its decision is never cached between
/// phases.
#[derive(Debug, Clone)]
pub struct DataStation {
    id: NodeId,
    dataset: DataSet,
    policy: PolicyConfig,
    resolver: ColumnTypeResolver,
}

impl DataStation {
    pub fn new(id: NodeId, dataset: DataSet, policy: PolicyConfig) -> Self {
        Self {
            id,
            dataset,
            policy,
            resolver: ColumnTypeResolver::default(),
        }
    }

    /// Create a station whose policy is loaded from `source`.
    pub fn from_source(id: NodeId, dataset: DataSet, source: &dyn PolicySource) -> SummaryResult<Self> {
        Ok(Self::new(id, dataset, PolicyConfig::load(source)?))
    }

    /// Replace the default column type resolver.
    pub fn with_resolver(mut self, resolver: ColumnTypeResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    /// Replace the policy; takes effect at the next phase.
    pub fn set_policy(&mut self, policy: PolicyConfig) {
        self.policy = policy;
    }

    /// Phase 1: compute this node's [`LocalStatBundle`].
    pub fn summarize(&self, request: &SummaryRequest) -> SummaryResult<StationReply<LocalStatBundle>> {
        let columns = self.requested_columns(request.columns.as_deref())?;

        let guard = PrivacyGuard::new(&self.policy);
        let decision = guard.evaluate(&self.dataset, &columns);
        if let Some(reason) = decision.exclusion {
            info!(node = %self.id, %reason, "node sits out the summary phase");
            return Ok(StationReply::Excluded(reason));
        }

        let resolved = self.resolver.resolve_all(
            &self.dataset,
            &decision.allowed_columns,
            request.numeric_columns.as_deref(),
        )?;
        debug!(node = %self.id, columns = resolved.len(), "computing local summary");
        let bundle = compute_local_summary(&self.dataset, &resolved, &guard, &decision)?;
        Ok(StationReply::Shared(bundle))
    }

    /// Phase 2: compute this node's [`LocalVarianceBundle`] around the global means.
    pub fn variance(&self, request: &VarianceRequest) -> SummaryResult<StationReply<LocalVarianceBundle>> {
        // Means cover the union of every node's columns; this node only answers for its own.
        let columns: Vec<String> = request
            .means
            .keys()
            .filter(|c| self.dataset.schema.index_of(c).is_some())
            .cloned()
            .collect();

        let decision = PrivacyGuard::new(&self.policy).evaluate(&self.dataset, &columns);
        if let Some(reason) = decision.exclusion {
            info!(node = %self.id, %reason, "node sits out the variance phase");
            return Ok(StationReply::Excluded(reason));
        }

        debug!(node = %self.id, columns = decision.allowed_columns.len(), "computing local variance");
        let bundle = compute_local_variance(&self.dataset, &request.means, &decision)?;
        Ok(StationReply::Shared(bundle))
    }

    /// Requested columns (all columns if none were named), checked to exist.
    fn requested_columns(&self, requested: Option<&[String]>) -> SummaryResult<Vec<String>> {
        match requested {
            Some(columns) => {
                for column in columns {
                    self.dataset.column_index(column)?;
                }
                Ok(columns.to_vec())
            }
            None => Ok(self.dataset.schema.field_names().map(str::to_string).collect()),
        }
    }
}
