//! Station anomaly analysis for GHCN-Daily observations.
//!
//! Flag decoding, windowed climatological baselines, z-score classification,
//! a six-check QA audit and an unsupervised outlier ensemble, assembled into
//! one report per station by `report::AnalysisSession`.

pub mod alert;
pub mod analysis;
pub mod config;
pub mod ensemble;
pub mod flags;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod qa;
pub mod report;
pub mod stations;

pub use config::AnalysisConfig;
pub use model::AnalysisError;
pub use report::{AnalysisSession, StationReport};
