//! Node-side (partial) computations.
//!
//! Everything here runs inside a data station, on its private [`crate::types::DataSet`]. The
//! outputs are aggregate bundles only:
//!
//! - [`compute_local_summary()`]: phase 1, per-column count/missing/sum/min/max or unique-value
//!   counts, plus the number of complete rows
//! - [`compute_local_variance()`]: phase 2, per-column sum of squared deviations from the global
//!   mean
//! - [`DataStation`]: runs the privacy guard and then the right computer for each phase

pub mod station;
pub mod summary;
pub mod variance;

pub use station::{DataStation, StationReply};
pub use summary::{
    compute_local_summary, CategoricalPartial, LocalColumnStats, LocalStatBundle, NumericPartial,
};
pub use variance::{compute_local_variance, LocalVarianceBundle};
