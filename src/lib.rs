//! `federated-summary` computes descriptive statistics over a dataset that is horizontally split
//! across independent data stations, without moving any row off its station.
//!
//! Each station runs node-side computations on its private [`types::DataSet`] and shares only
//! aggregates (counts, sums, extremes, unique-value counts, sums of squared deviations). A central
//! aggregator merges them in two phases:
//!
//! 1. **summary**: every station returns per-column partials, which merge into global counts,
//!    sums, extremes and the global mean
//! 2. **variance**: stations that contributed receive the global means and return
//!    `sum((x - mean)^2)`, which merges into the population standard deviation
//!
//! Every station applies its own [`policy::PolicyConfig`] (minimum row count, column allow/deny
//! lists, per-statistic switches, unique-value threshold) before anything is shared.
//!
//! ## Quick example
//!
//! ```rust
//! use federated_summary::aggregate::CentralAggregator;
//! use federated_summary::dispatch::{DispatchOptions, InProcessDispatcher};
//! use federated_summary::ingestion::ingest_csv_inferring_schema;
//! use federated_summary::local::DataStation;
//! use federated_summary::policy::PolicyConfig;
//! use federated_summary::task::SummaryTask;
//! use federated_summary::types::NodeId;
//!
//! # fn main() -> Result<(), federated_summary::SummaryError> {
//! let load = |text: &str| {
//!     let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(text.as_bytes());
//!     ingest_csv_inferring_schema(&mut rdr)
//! };
//! let policy = PolicyConfig { minimum_rows: 2, privacy_threshold: 1, ..PolicyConfig::default() };
//!
//! let stations = vec![
//!     DataStation::new(NodeId(1), load("age,site\n1,a\n2,a\n3,b\n")?, policy.clone()),
//!     DataStation::new(NodeId(2), load("age,site\n4,b\n5,c\n")?, policy),
//! ];
//! let aggregator = CentralAggregator::new(InProcessDispatcher::new(stations, DispatchOptions::default()));
//!
//! let task = SummaryTask::from_json(r#"{"columns": ["age", "site"]}"#)?;
//! let report = aggregator.run(&task)?;
//!
//! assert_eq!(report.numeric["age"].mean, Some(3.0));
//! assert_eq!(report.numeric["age"].std, Some(2.0f64.sqrt()));
//! assert_eq!(report.categorical["site"].count, Some(5));
//! println!("{}", report.to_json()?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`types`]: schema, in-memory dataset, node ids and column kinds
//! - [`ingestion`]: loading a station's CSV partition
//! - [`policy`]: node-local privacy configuration (environment keys, defaults)
//! - [`privacy`]: the guard that applies a policy to a dataset
//! - [`resolver`]: numeric vs. categorical column resolution
//! - [`local`]: node-side summary and variance computations, and the [`local::DataStation`]
//! - [`dispatch`]: fan-out of a phase to the stations, with throttling and observability
//! - [`aggregate`]: the two-phase [`aggregate::CentralAggregator`] and the final report
//! - [`task`]: the client task description and the per-phase requests
//! - [`error`]: the error type shared by every layer

pub mod aggregate;
pub mod dispatch;
pub mod error;
pub mod ingestion;
pub mod local;
pub mod policy;
pub mod privacy;
pub mod resolver;
pub mod task;
pub mod types;

pub use aggregate::{CentralAggregator, SummaryReport};
pub use error::{SummaryError, SummaryResult};
pub use policy::PolicyConfig;
pub use task::SummaryTask;
