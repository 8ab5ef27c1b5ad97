//! Task input and per-phase payloads.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{SummaryError, SummaryResult};
use crate::types::NodeId;

/// What the client asks the aggregator to summarize.
///
/// Every field is optional:
///
/// - no `columns`: every column of each node's dataset
/// - no `numeric_columns`: each node resolves column kinds with
///   [`crate::resolver::ColumnTypeResolver`]
/// - no (or an empty) `organizations_to_include`: every node the dispatcher knows about
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryTask {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizations_to_include: Option<Vec<NodeId>>,
}

impl SummaryTask {
    /// Parse a task from JSON, e.g. `{"columns": ["age"], "organizations_to_include": [1, 2]}`.
    pub fn from_json(input: &str) -> SummaryResult<Self> {
        let task: Self = serde_json::from_str(input)?;
        task.validate()?;
        Ok(task)
    }

    /// Reject duplicate column names and numeric columns that were not requested.
    pub fn validate(&self) -> SummaryResult<()> {
        if let Some(columns) = &self.columns {
            let mut seen = HashSet::new();
            for column in columns {
                if !seen.insert(column.as_str()) {
                    return Err(SummaryError::InvalidTask {
                        message: format!("column '{column}' is requested more than once"),
                    });
                }
            }
            if let Some(numeric) = &self.numeric_columns {
                let missing: Vec<&str> = numeric
                    .iter()
                    .filter(|n| !seen.contains(n.as_str()))
                    .map(String::as_str)
                    .collect();
                if !missing.is_empty() {
                    return Err(SummaryError::InvalidTask {
                        message: format!("numeric columns {missing:?} are not among the requested columns"),
                    });
                }
            }
        }
        Ok(())
    }

    /// Phase-1 payload derived from this task.
    pub fn summary_request(&self) -> SummaryRequest {
        SummaryRequest {
            columns: self.columns.clone(),
            numeric_columns: self.numeric_columns.clone(),
        }
    }
}

/// Phase-1 payload sent to each node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_columns: Option<Vec<String>>,
}

/// Phase-2 payload: the global mean of every numeric column whose mean is defined.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VarianceRequest {
    pub means: BTreeMap<String, f64>,
}
