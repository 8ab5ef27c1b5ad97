use thiserror::Error;

use crate::types::{ColumnKind, NodeId};

/// Convenience result type used across the crate.
pub type SummaryResult<T> = Result<T, SummaryError>;

/// Error type returned by node-side computations, policy loading, and the central aggregator.
///
/// A single enum is shared by every layer so a node failure can be surfaced unchanged by the
/// aggregator.
#[derive(Debug, Error)]
pub enum SummaryError {
    /// Underlying I/O error (e.g. partition file not found).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV partition ingestion error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding/decoding error for tasks, payloads, or reports.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The input does not conform to the provided schema.
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// A value could not be parsed into the required [`crate::types::DataType`].
    #[error("failed to parse value at row {row} column '{column}': {message} (raw='{raw}')")]
    ParseError {
        row: usize,
        column: String,
        raw: String,
        message: String,
    },

    /// A node policy key carries a value that cannot be interpreted.
    #[error("invalid policy value for {key}: {message} (raw='{value}')")]
    InvalidPolicy {
        key: String,
        value: String,
        message: String,
    },

    /// The task input is inconsistent (duplicate columns, numeric columns not requested, ...).
    #[error("invalid task: {message}")]
    InvalidTask { message: String },

    /// A requested column does not exist in the node's dataset.
    #[error("column '{column}' does not exist in the dataset")]
    UnknownColumn { column: String },

    /// A column was declared numeric but holds values that are not real numbers.
    #[error("column '{column}' was declared numeric but holds non-numeric values")]
    NotNumeric { column: String },

    /// Two nodes resolved the same column to different kinds.
    #[error(
        "column '{column}' resolved as {first:?} at node {first_node} but as {kind:?} at node {node}"
    )]
    ColumnTypeMismatch {
        column: String,
        first_node: NodeId,
        first: ColumnKind,
        node: NodeId,
        kind: ColumnKind,
    },

    /// A node reported a failure while computing its partial result.
    #[error("node {node} failed: {message}")]
    NodeFailed { node: NodeId, message: String },

    /// No node contributed to phase 1, so nothing can be reported.
    #[error("no node contributed to the summary")]
    NoParticipatingNodes,
}
