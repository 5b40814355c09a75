//! Analysis configuration bundle.
//!
//! Loaded from a TOML file (every field optional, falling back to the
//! defaults below), then overridden from the environment. A `.env` file in the
//! working directory is read first so local runs can pin overrides without
//! exporting them.
//!
//! ```toml
//! confidence_threshold = 2.0
//! window_days = 30
//! min_samples = 5
//! use_statistical = true
//! use_ml = true
//!
//! [qa]
//! persistence_max_run = 7
//! neighbor_radius_km = 75.0
//!
//! [ensemble]
//! base_contamination = 0.10
//! noisy_contamination = 0.15
//! ```

use crate::logging::{self, Component};
use crate::model::AnalysisError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Longest date window accepted, in days (a century).
pub const MAX_WINDOW_DAYS: i64 = 36_500;

/// Widest seasonal half-window before neighbouring years' windows overlap.
pub const MAX_SEASONAL_HALF_WINDOW_DAYS: i64 = 182;

// ---------------------------------------------------------------------------
// Policy constants
// ---------------------------------------------------------------------------

/// Thresholds used by the six QA audit checks. Raw GHCN units unless noted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QaPolicy {
    /// Format check: temperatures outside `[-bound, bound]` tenths of °C.
    pub temperature_format_bound: f64,
    pub tmax_limits: (f64, f64),
    pub tmin_limits: (f64, f64),
    /// Daily precipitation ceiling in tenths of mm (200 mm).
    pub prcp_ceiling: f64,
    pub climatological_sigma: f64,
    pub climatological_min_samples: usize,
    /// Longest allowed run of identical consecutive values.
    pub persistence_max_run: usize,
    /// Largest plausible same-day TMAX - TMIN in °C.
    pub consistency_max_range_c: f64,
    pub neighbor_radius_km: f64,
    pub neighbor_min_correlation: f64,
    /// Target series must have strictly more values than this.
    pub neighbor_min_station_samples: usize,
    /// Neighbor series and the date overlap must each exceed this.
    pub neighbor_min_overlap: usize,
}

impl Default for QaPolicy {
    fn default() -> Self {
        Self {
            temperature_format_bound: 999.0,
            tmax_limits: (-999.0, 600.0),
            tmin_limits: (-999.0, 500.0),
            prcp_ceiling: 2000.0,
            climatological_sigma: 3.0,
            climatological_min_samples: 30,
            persistence_max_run: 7,
            consistency_max_range_c: 50.0,
            neighbor_radius_km: 75.0,
            neighbor_min_correlation: 0.3,
            neighbor_min_station_samples: 30,
            neighbor_min_overlap: 10,
        }
    }
}

/// Outlier ensemble hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsemblePolicy {
    pub base_contamination: f64,
    pub noisy_contamination: f64,
    /// A dataset with strictly more QA issues than this is "noisy".
    pub noisy_issue_threshold: usize,
    pub n_estimators: usize,
    pub max_samples: usize,
    pub n_neighbors: usize,
    pub seed: u64,
    pub svm_tolerance: f64,
    pub svm_max_iterations: usize,
    pub rolling_window: usize,
}

impl Default for EnsemblePolicy {
    fn default() -> Self {
        Self {
            base_contamination: 0.10,
            noisy_contamination: 0.15,
            noisy_issue_threshold: 5,
            n_estimators: 200,
            max_samples: 256,
            n_neighbors: 20,
            seed: 42,
            svm_tolerance: 1e-3,
            svm_max_iterations: 100_000,
            rolling_window: 7,
        }
    }
}

impl EnsemblePolicy {
    /// Contamination rate for a dataset with `total_qa_issues` audit findings.
    pub fn contamination_for(&self, total_qa_issues: usize) -> f64 {
        if total_qa_issues > self.noisy_issue_threshold {
            self.noisy_contamination
        } else {
            self.base_contamination
        }
    }
}

/// Day-of-year window used by the seasonal baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonalWindow {
    pub half_window_days: i64,
    pub min_samples: usize,
}

impl Default for SeasonalWindow {
    fn default() -> Self {
        Self {
            half_window_days: 15,
            min_samples: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Analysis configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Compared directly against `|z|`.
    pub confidence_threshold: f64,
    pub window_days: i64,
    pub min_samples: usize,
    pub use_statistical: bool,
    pub use_ml: bool,
    pub seasonal: SeasonalWindow,
    pub qa: QaPolicy,
    pub ensemble: EnsemblePolicy,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 2.0,
            window_days: 30,
            min_samples: 5,
            use_statistical: true,
            use_ml: true,
            seasonal: SeasonalWindow::default(),
            qa: QaPolicy::default(),
            ensemble: EnsemblePolicy::default(),
        }
    }
}

impl AnalysisConfig {
    /// Parses a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, AnalysisError> {
        let config: AnalysisConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file, applies environment overrides, and validates.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AnalysisError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut config: AnalysisConfig = toml::from_str(&text)?;
        dotenv::dotenv().ok();
        config.apply_env_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        logging::info(
            Component::Config,
            None,
            &format!(
                "Loaded {} (threshold {}, window ±{} days, min_samples {})",
                path.display(),
                config.confidence_threshold,
                config.window_days,
                config.min_samples
            ),
        );
        Ok(config)
    }

    /// Defaults plus environment overrides, for callers without a file.
    pub fn from_env() -> Result<Self, AnalysisError> {
        dotenv::dotenv().ok();
        let mut config = AnalysisConfig::default();
        config.apply_env_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `ADDIS_*` overrides read through `lookup`.
    ///
    /// Taking the lookup as a closure keeps tests independent of the real
    /// process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), AnalysisError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ADDIS_CONFIDENCE_THRESHOLD") {
            self.confidence_threshold = parse_override("ADDIS_CONFIDENCE_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("ADDIS_WINDOW_DAYS") {
            self.window_days = parse_override("ADDIS_WINDOW_DAYS", &v)?;
        }
        if let Some(v) = lookup("ADDIS_MIN_SAMPLES") {
            self.min_samples = parse_override("ADDIS_MIN_SAMPLES", &v)?;
        }
        if let Some(v) = lookup("ADDIS_USE_STATISTICAL") {
            self.use_statistical = parse_override("ADDIS_USE_STATISTICAL", &v)?;
        }
        if let Some(v) = lookup("ADDIS_USE_ML") {
            self.use_ml = parse_override("ADDIS_USE_ML", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !self.confidence_threshold.is_finite() || self.confidence_threshold < 0.0 {
            return Err(AnalysisError::Configuration(format!(
                "confidence_threshold must be a non-negative number, got {}",
                self.confidence_threshold
            )));
        }
        if self.window_days <= 0 || self.window_days > MAX_WINDOW_DAYS {
            return Err(AnalysisError::Configuration(format!(
                "window_days must lie in 1..={}, got {}",
                MAX_WINDOW_DAYS, self.window_days
            )));
        }
        if !(0..=MAX_SEASONAL_HALF_WINDOW_DAYS).contains(&self.seasonal.half_window_days) {
            return Err(AnalysisError::Configuration(format!(
                "seasonal.half_window_days must lie in 0..={}, got {}",
                MAX_SEASONAL_HALF_WINDOW_DAYS, self.seasonal.half_window_days
            )));
        }
        if self.seasonal.min_samples < 2 {
            return Err(AnalysisError::Configuration(format!(
                "seasonal.min_samples must be at least 2, got {}",
                self.seasonal.min_samples
            )));
        }
        if self.min_samples < 2 {
            return Err(AnalysisError::Configuration(format!(
                "min_samples must be at least 2 for a sample standard deviation, got {}",
                self.min_samples
            )));
        }
        for (name, rate) in [
            ("base_contamination", self.ensemble.base_contamination),
            ("noisy_contamination", self.ensemble.noisy_contamination),
        ] {
            if !(rate > 0.0 && rate <= 0.5) {
                return Err(AnalysisError::Configuration(format!(
                    "{} must lie in (0, 0.5], got {}",
                    name, rate
                )));
            }
        }
        if self.ensemble.n_estimators == 0 || self.ensemble.n_neighbors == 0 {
            return Err(AnalysisError::Configuration(
                "n_estimators and n_neighbors must be positive".to_string(),
            ));
        }
        if self.ensemble.rolling_window == 0 {
            return Err(AnalysisError::Configuration(
                "rolling_window must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, AnalysisError> {
    value.trim().parse::<T>().map_err(|_| {
        AnalysisError::Configuration(format!("{} has an unparsable value: {:?}", key, value))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_match_policy_constants() {
        let config = AnalysisConfig::default();
        assert_eq!(config.window_days, 30);
        assert_eq!(config.min_samples, 5);
        assert_eq!(config.qa.persistence_max_run, 7);
        assert_eq!(config.qa.neighbor_radius_km, 75.0);
        assert_eq!(config.ensemble.base_contamination, 0.10);
        assert_eq!(config.ensemble.noisy_contamination, 0.15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AnalysisConfig::from_toml_str(
            "confidence_threshold = 1.5\nuse_ml = false\n[qa]\npersistence_max_run = 5\n",
        )
        .expect("partial config should parse");
        assert_eq!(config.confidence_threshold, 1.5);
        assert!(!config.use_ml);
        assert!(config.use_statistical, "unspecified keys keep their defaults");
        assert_eq!(config.qa.persistence_max_run, 5);
        assert_eq!(config.qa.neighbor_radius_km, 75.0);
    }

    #[test]
    fn test_env_overrides_take_precedence() {
        let vars: HashMap<&str, &str> = [
            ("ADDIS_CONFIDENCE_THRESHOLD", "3.5"),
            ("ADDIS_WINDOW_DAYS", "45"),
            ("ADDIS_USE_ML", "false"),
        ]
        .into_iter()
        .collect();
        let mut config = AnalysisConfig::default();
        config
            .apply_env_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .expect("overrides should parse");
        assert_eq!(config.confidence_threshold, 3.5);
        assert_eq!(config.window_days, 45);
        assert!(!config.use_ml);
        assert_eq!(config.min_samples, 5);
    }

    #[test]
    fn test_unparsable_override_is_a_configuration_error() {
        let mut config = AnalysisConfig::default();
        let result = config.apply_env_overrides(|k| {
            (k == "ADDIS_MIN_SAMPLES").then(|| "five".to_string())
        });
        assert!(matches!(result, Err(AnalysisError::Configuration(_))));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = AnalysisConfig::default();
        config.window_days = 0;
        assert!(config.validate().is_err(), "zero-day window must be rejected");

        let mut config = AnalysisConfig::default();
        config.ensemble.noisy_contamination = 0.9;
        assert!(config.validate().is_err(), "contamination above 0.5 must be rejected");

        let mut config = AnalysisConfig::default();
        config.confidence_threshold = f64::NAN;
        assert!(config.validate().is_err(), "NaN threshold must be rejected");

        let mut config = AnalysisConfig::default();
        config.window_days = MAX_WINDOW_DAYS;
        assert!(config.validate().is_ok(), "a century-wide window is allowed");
        config.window_days = 1_000_000_000;
        assert!(config.validate().is_err(), "window beyond the calendar must be rejected");
    }

    #[test]
    fn test_seasonal_window_is_validated() {
        let mut config = AnalysisConfig::default();
        config.seasonal.half_window_days = MAX_SEASONAL_HALF_WINDOW_DAYS;
        assert!(config.validate().is_ok());
        config.seasonal.half_window_days = 200;
        assert!(config.validate().is_err(), "overlapping yearly windows must be rejected");

        let mut config = AnalysisConfig::default();
        config.seasonal.half_window_days = -1;
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.seasonal.min_samples = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_contamination_policy_for_noisy_datasets() {
        let policy = EnsemblePolicy::default();
        assert_eq!(policy.contamination_for(0), 0.10);
        assert_eq!(policy.contamination_for(5), 0.10, "exactly 5 issues is not noisy");
        assert_eq!(policy.contamination_for(6), 0.15);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "window_days = 20\nmin_samples = 8").expect("write config");
        let config = AnalysisConfig::load(file.path()).expect("config file should load");
        assert_eq!(config.window_days, 20);
        assert_eq!(config.min_samples, 8);
    }
}
