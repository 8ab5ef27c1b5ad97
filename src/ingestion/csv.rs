//! CSV partition ingestion.

use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use tracing::debug;

use crate::error::{SummaryError, SummaryResult};
use crate::policy::parse_bool;
use crate::types::{DataSet, DataType, Field, Schema, Value};

/// Load a CSV partition into an in-memory [`DataSet`].
///
/// Rules:
///
/// - CSV must have headers.
/// - Headers must contain all schema fields (order can differ).
/// - Each value is parsed according to the schema field type; empty cells become [`Value::Null`].
pub fn ingest_csv_from_path(path: impl AsRef<Path>, schema: &Schema) -> SummaryResult<DataSet> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    ingest_csv_from_reader(&mut rdr, schema)
}

/// Load a CSV partition with a known schema from an existing reader.
pub fn ingest_csv_from_reader<R: Read>(rdr: &mut csv::Reader<R>, schema: &Schema) -> SummaryResult<DataSet> {
    let positions = header_positions(rdr.headers()?, schema)?;
    let rows = rdr
        .records()
        .enumerate()
        .map(|(idx, record)| typed_row(&record?, line_of(idx), schema, &positions))
        .collect::<SummaryResult<Vec<_>>>()?;

    debug!(rows = rows.len(), columns = schema.fields.len(), "csv partition loaded");
    Ok(DataSet::new(schema.clone(), rows))
}

/// Load a CSV partition without a schema, inferring one type per column.
///
/// A column is `Int64` if every non-empty cell parses as an integer, else `Float64` if every one
/// parses as a float, else `Bool` if every one is `true`/`false`, else `Utf8`. A column with no
/// non-empty cell is `Utf8`.
pub fn ingest_csv_inferring_schema<R: Read>(rdr: &mut csv::Reader<R>) -> SummaryResult<DataSet> {
    let headers = rdr.headers()?.clone();
    let records = rdr.records().collect::<Result<Vec<_>, _>>()?;

    let schema = Schema::new(
        headers
            .iter()
            .enumerate()
            .map(|(pos, name)| {
                let cells = records.iter().map(move |r| r.get(pos).unwrap_or("").trim()).filter(|c| !c.is_empty());
                Field::new(name, infer_type(cells))
            })
            .collect(),
    );
    let positions: Vec<usize> = (0..schema.fields.len()).collect();
    let rows = records
        .iter()
        .enumerate()
        .map(|(idx, record)| typed_row(record, line_of(idx), &schema, &positions))
        .collect::<SummaryResult<Vec<_>>>()?;

    debug!(rows = rows.len(), schema = ?schema.fields, "csv partition loaded with inferred schema");
    Ok(DataSet::new(schema, rows))
}

/// CSV position of every schema field; reordered columns are fine, absent ones are not.
fn header_positions(headers: &StringRecord, schema: &Schema) -> SummaryResult<Vec<usize>> {
    schema
        .fields
        .iter()
        .map(|field| {
            headers
                .iter()
                .position(|h| h == field.name)
                .ok_or_else(|| SummaryError::SchemaMismatch {
                    message: format!(
                        "missing required column '{}'. headers={:?}",
                        field.name,
                        headers.iter().collect::<Vec<_>>()
                    ),
                })
        })
        .collect()
}

/// Line number of the `idx`-th record as a user sees it; the header is line 1.
fn line_of(idx: usize) -> usize {
    idx + 2
}

/// Parse the cells of `record` at `positions` into one typed row of `schema`.
fn typed_row(record: &StringRecord, line: usize, schema: &Schema, positions: &[usize]) -> SummaryResult<Vec<Value>> {
    schema
        .fields
        .iter()
        .zip(positions)
        .map(|(field, &pos)| parse_typed_value(line, &field.name, field.data_type, record.get(pos).unwrap_or("")))
        .collect()
}

fn infer_type<'a>(cells: impl Iterator<Item = &'a str> + Clone) -> DataType {
    let mut cells = cells.peekable();
    if cells.peek().is_none() {
        return DataType::Utf8;
    }
    if cells.clone().all(|c| c.parse::<i64>().is_ok()) {
        DataType::Int64
    } else if cells.clone().all(|c| c.parse::<f64>().is_ok()) {
        DataType::Float64
    } else if cells.all(|c| c.eq_ignore_ascii_case("true") || c.eq_ignore_ascii_case("false")) {
        DataType::Bool
    } else {
        DataType::Utf8
    }
}

fn parse_typed_value(row: usize, column: &str, data_type: DataType, raw: &str) -> SummaryResult<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }

    let parse_error = |message: String| SummaryError::ParseError {
        row,
        column: column.to_owned(),
        raw: raw.to_owned(),
        message,
    };

    match data_type {
        DataType::Utf8 => Ok(Value::Utf8(trimmed.to_owned())),
        DataType::Int64 => trimmed
            .parse::<i64>()
            .map(Value::Int64)
            .map_err(|e| parse_error(e.to_string())),
        DataType::Float64 => trimmed
            .parse::<f64>()
            .map(Value::Float64)
            .map_err(|e| parse_error(e.to_string())),
        DataType::Bool => parse_bool(trimmed).map(Value::Bool).map_err(parse_error),
    }
}
