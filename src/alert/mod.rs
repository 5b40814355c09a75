//! Anomaly classification against a baseline.

pub mod classify;

pub use classify::{classify, frequency_description};
