//! Statistical building blocks for the anomaly pipeline.
//!
//! Submodules:
//! - `stats`: descriptive statistics shared by every stage.
//! - `index`: per-(station, element) date-sorted series with windowed access.
//! - `baseline`: date-window and seasonal baselines built on the index.

pub mod baseline;
pub mod index;
pub mod stats;

pub use baseline::{compute_baseline, compute_seasonal_baseline};
pub use index::ObservationIndex;
