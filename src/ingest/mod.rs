//! Observation loaders.
//!
//! `ghcn` reads the fixed-width GHCN-Daily `.dly` station files; `table`
//! reads the wide CSV export (one row per date, one column per element plus
//! an `_ATTRIBUTES` column carrying the flag triplet). Both produce
//! `Observation`s in raw GHCN units.

pub mod ghcn;
pub mod table;

pub use table::StationDataset;
