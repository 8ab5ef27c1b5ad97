//! Numeric vs categorical column resolution.
//!
//! Every station applies the same rules to its own partition. The aggregator rejects a run in
//! which two stations disagree (see [`crate::SummaryError::ColumnTypeMismatch`]).

use std::collections::HashSet;

use crate::error::{SummaryError, SummaryResult};
use crate::types::{ColumnKind, DataSet, DataType, Value};

/// Tuning for the type heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverOptions {
    /// A text column whose values all parse as numbers is treated as numeric only if it has more
    /// distinct values than this; fewer are taken to be codes.
    pub categorical_cardinality: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            categorical_cardinality: 10,
        }
    }
}

/// Resolves the [`ColumnKind`] of columns in a node's dataset.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnTypeResolver {
    opts: ResolverOptions,
}

impl ColumnTypeResolver {
    pub fn new(opts: ResolverOptions) -> Self {
        Self { opts }
    }

    /// Resolve `column`, honoring `hint` when given.
    ///
    /// - A [`ColumnKind::Numeric`] hint is checked: every non-missing value must read as a real
    ///   number, otherwise [`SummaryError::NotNumeric`].
    /// - A [`ColumnKind::Categorical`] hint is always accepted.
    /// - Without a hint, `Int64`/`Float64` fields are numeric, `Bool` fields are categorical, and
    ///   `Utf8` fields are numeric only if every non-missing value parses as a number and the
    ///   column has more than `categorical_cardinality` distinct values.
    pub fn resolve(
        &self,
        dataset: &DataSet,
        column: &str,
        hint: Option<ColumnKind>,
    ) -> SummaryResult<ColumnKind> {
        let idx = dataset.column_index(column)?;
        let data_type = dataset.schema.fields[idx].data_type;

        match hint {
            Some(ColumnKind::Categorical) => Ok(ColumnKind::Categorical),
            Some(ColumnKind::Numeric) => {
                if all_numeric(dataset, idx) {
                    Ok(ColumnKind::Numeric)
                } else {
                    Err(SummaryError::NotNumeric {
                        column: column.to_string(),
                    })
                }
            }
            None => Ok(match data_type {
                DataType::Int64 | DataType::Float64 => ColumnKind::Numeric,
                DataType::Bool => ColumnKind::Categorical,
                DataType::Utf8 => {
                    if all_numeric(dataset, idx)
                        && distinct_count(dataset, idx) > self.opts.categorical_cardinality
                    {
                        ColumnKind::Numeric
                    } else {
                        ColumnKind::Categorical
                    }
                }
            }),
        }
    }

    /// Resolve several columns. A column listed in `numeric_hints` is hinted numeric; when
    /// `numeric_hints` is given, every other column is hinted categorical.
    pub fn resolve_all(
        &self,
        dataset: &DataSet,
        columns: &[String],
        numeric_hints: Option<&[String]>,
    ) -> SummaryResult<Vec<(String, ColumnKind)>> {
        columns
            .iter()
            .map(|column| {
                let hint = numeric_hints.map(|numeric| {
                    if numeric.iter().any(|n| n == column) {
                        ColumnKind::Numeric
                    } else {
                        ColumnKind::Categorical
                    }
                });
                Ok((column.clone(), self.resolve(dataset, column, hint)?))
            })
            .collect()
    }
}

fn all_numeric(dataset: &DataSet, idx: usize) -> bool {
    dataset
        .column_values(idx)
        .filter(|v| !v.is_missing())
        .all(|v| v.as_f64().is_some())
}

fn distinct_count(dataset: &DataSet, idx: usize) -> usize {
    dataset
        .column_values(idx)
        .filter_map(Value::category_key)
        .collect::<HashSet<_>>()
        .len()
}
