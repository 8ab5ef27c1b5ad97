//! Loading a data station's private partition.
//!
//! Partitions are CSV files with a header row. Either supply a [`crate::types::Schema`]
//! ([`csv::ingest_csv_from_path`], [`csv::ingest_csv_from_reader`]) or let the column types be
//! inferred from the cells ([`csv::ingest_csv_inferring_schema`]).

pub mod csv;

pub use csv::{ingest_csv_from_path, ingest_csv_from_reader, ingest_csv_inferring_schema};
