//! Outlier Ensemble.
//!
//! Three unsupervised detectors over the fixed feature schema in `features`:
//! an isolation forest, a local outlier factor and a one-class SVM. Each
//! model reports its own outlier rows; nothing here merges their verdicts.
//!
//! Lifecycle: `new` → `train` on one station's full history → `detect` on
//! any frame from the same station. The isolation forest and SVM are applied
//! with the fitted parameters; LOF is refitted on the frame being scored.
//! `detect` before `train` is a `ModelNotTrained` error.

pub mod features;
pub mod isolation_forest;
pub mod lof;
pub mod scaler;
pub mod svm;

use crate::config::EnsemblePolicy;
use crate::logging::{self, Component};
use crate::model::AnalysisError;
use crate::qa::QaReport;
use features::{FeatureFrame, FEATURE_COLUMNS, N_FEATURES, REQUIRED_COLUMNS};
use isolation_forest::IsolationForest;
use lof::LocalOutlierFactor;
use scaler::StandardScaler;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use svm::OneClassSvm;

pub use features::build_features;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    IsolationForest,
    LocalOutlierFactor,
    OneClassSvm,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [
        ModelKind::IsolationForest,
        ModelKind::LocalOutlierFactor,
        ModelKind::OneClassSvm,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::IsolationForest => "Isolation Forest",
            ModelKind::LocalOutlierFactor => "Local Outlier Factor",
            ModelKind::OneClassSvm => "One-Class SVM",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Rows of the scored frame one model flagged.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutliers {
    pub model: ModelKind,
    /// Indices into `FeatureFrame::rows`, ascending.
    pub rows: Vec<usize>,
}

/// Everything fitted by `train`. Serialised as-is by `save`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TrainedModels {
    feature_columns: Vec<String>,
    contamination: f64,
    qa_score: f64,
    total_qa_issues: usize,
    training_rows: usize,
    feature_means: Vec<f64>,
    scaler: StandardScaler,
    isolation_forest: IsolationForest,
    local_outlier_factor: LocalOutlierFactor,
    one_class_svm: OneClassSvm,
}

#[derive(Debug, Clone)]
pub struct OutlierEnsemble {
    policy: EnsemblePolicy,
    trained: Option<TrainedModels>,
}

impl OutlierEnsemble {
    pub fn new(policy: EnsemblePolicy) -> Self {
        OutlierEnsemble { policy, trained: None }
    }

    pub fn is_trained(&self) -> bool {
        self.trained.is_some()
    }

    /// Contamination chosen at training time.
    pub fn contamination(&self) -> Option<f64> {
        self.trained.as_ref().map(|t| t.contamination)
    }

    /// Fits all three models on `frame`.
    ///
    /// Fails on an empty frame, on a TMAX_F/TMIN_F column with no observed
    /// values, and on either of those columns being constant.
    pub fn train(&mut self, frame: &FeatureFrame, qa: &QaReport) -> Result<(), AnalysisError> {
        if frame.is_empty() {
            return Err(AnalysisError::EmptyTrainingSet);
        }
        for &column in &REQUIRED_COLUMNS {
            let values = frame.column(column);
            let Some(first) = values.first() else {
                return Err(AnalysisError::MissingFeature(FEATURE_COLUMNS[column].to_string()));
            };
            if values.iter().all(|v| v == first) {
                return Err(AnalysisError::DegenerateFeature(FEATURE_COLUMNS[column].to_string()));
            }
        }

        let feature_means: Vec<f64> = (0..N_FEATURES)
            .map(|c| crate::analysis::stats::mean(&frame.column(c)).unwrap_or(0.0))
            .collect();
        let raw = impute(frame, &feature_means);
        let scaler = StandardScaler::fit(&raw);
        let scaled = scaler.transform(&raw);

        let contamination = self.policy.contamination_for(qa.total_issues);
        let isolation_forest = IsolationForest::fit(
            &scaled,
            self.policy.n_estimators,
            self.policy.max_samples,
            contamination,
            self.policy.seed,
        );
        let one_class_svm = OneClassSvm::fit(
            &scaled,
            contamination,
            self.policy.svm_tolerance,
            self.policy.svm_max_iterations,
        );
        let local_outlier_factor = LocalOutlierFactor::new(self.policy.n_neighbors, contamination);

        logging::info(
            Component::Ensemble,
            Some(&frame.station_id),
            &format!(
                "Trained on {} rows (contamination {:.2}, QA score {:.0}, SVM {} support vectors after {} iterations)",
                frame.len(),
                contamination,
                qa.qa_score,
                one_class_svm.support_vector_count(),
                one_class_svm.iterations
            ),
        );

        self.trained = Some(TrainedModels {
            feature_columns: FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            contamination,
            qa_score: qa.qa_score,
            total_qa_issues: qa.total_issues,
            training_rows: frame.len(),
            feature_means,
            scaler,
            isolation_forest,
            local_outlier_factor,
            one_class_svm,
        });
        Ok(())
    }

    /// Scores `frame` with each model.
    pub fn detect(&self, frame: &FeatureFrame) -> Result<Vec<ModelOutliers>, AnalysisError> {
        let trained = self.trained.as_ref().ok_or(AnalysisError::ModelNotTrained)?;
        let scaled = trained.scaler.transform(&impute(frame, &trained.feature_means));

        let flagged = |flags: Vec<bool>| -> Vec<usize> {
            flags.iter().enumerate().filter(|(_, f)| **f).map(|(i, _)| i).collect()
        };

        let results: Vec<ModelOutliers> = ModelKind::ALL
            .iter()
            .map(|&model| {
                let flags = match model {
                    ModelKind::IsolationForest => {
                        scaled.iter().map(|x| trained.isolation_forest.is_outlier(x)).collect()
                    }
                    ModelKind::LocalOutlierFactor => trained.local_outlier_factor.fit_predict(&scaled),
                    ModelKind::OneClassSvm => scaled.iter().map(|x| trained.one_class_svm.is_outlier(x)).collect(),
                };
                ModelOutliers {
                    model,
                    rows: flagged(flags),
                }
            })
            .collect();

        for result in &results {
            logging::debug(
                Component::Ensemble,
                Some(&frame.station_id),
                &format!("{}: {} of {} rows flagged", result.model, result.rows.len(), frame.len()),
            );
        }
        Ok(results)
    }

    /// Writes the fitted models as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), AnalysisError> {
        let trained = self.trained.as_ref().ok_or(AnalysisError::ModelNotTrained)?;
        let json = serde_json::to_string(trained)?;
        std::fs::write(path.as_ref(), json)?;
        logging::info(
            Component::Ensemble,
            None,
            &format!("Saved ensemble to {}", path.as_ref().display()),
        );
        Ok(())
    }

    /// Restores models written by `save`.
    pub fn load(path: impl AsRef<Path>, policy: EnsemblePolicy) -> Result<Self, AnalysisError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let trained: TrainedModels = serde_json::from_str(&text)?;
        if trained.feature_columns.len() != N_FEATURES
            || trained.feature_columns.iter().zip(FEATURE_COLUMNS).any(|(a, b)| a != b)
        {
            return Err(AnalysisError::Configuration(format!(
                "saved ensemble uses feature columns {:?}",
                trained.feature_columns
            )));
        }
        Ok(OutlierEnsemble {
            policy,
            trained: Some(trained),
        })
    }
}

/// Feature matrix with `NaN`s replaced by the given column means.
fn impute(frame: &FeatureFrame, means: &[f64]) -> Vec<Vec<f64>> {
    frame
        .rows
        .iter()
        .map(|row| {
            row.values
                .iter()
                .zip(means)
                .map(|(v, m)| if v.is_finite() { *v } else { *m })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::StationDataset;
    use crate::model::{Element, FlagTriplet, Observation};
    use chrono::{Duration, NaiveDate};

    fn obs(day: i64, element: Element, raw: f64) -> Observation {
        Observation {
            station_id: "USW00014842".to_string(),
            date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap() + Duration::days(day),
            element,
            raw_value: Some(raw),
            flags: FlagTriplet::default(),
        }
    }

    fn frame(days: i64) -> FeatureFrame {
        let mut data = Vec::new();
        for d in 0..days {
            let wobble = ((d * 7) % 11) as f64;
            data.push(obs(d, Element::Tmax, 200.0 + wobble * 5.0));
            data.push(obs(d, Element::Tmin, 80.0 + wobble * 3.0));
            data.push(obs(d, Element::Prcp, if d % 5 == 0 { 30.0 } else { 0.0 }));
        }
        build_features(&StationDataset::from_observations(data, None), 100.0, 7)
    }

    fn report_with_issues(n: usize) -> QaReport {
        QaReport::from_findings((0..n).map(|i| format!("issue {}", i)).collect(), vec![], vec![], vec![], vec![], vec![])
    }

    #[test]
    fn test_detect_before_train_is_an_error() {
        let ensemble = OutlierEnsemble::new(EnsemblePolicy::default());
        assert!(matches!(ensemble.detect(&frame(30)), Err(AnalysisError::ModelNotTrained)));
    }

    #[test]
    fn test_noisy_dataset_raises_contamination() {
        let mut ensemble = OutlierEnsemble::new(EnsemblePolicy::default());
        ensemble.train(&frame(60), &report_with_issues(6)).expect("training should succeed");
        assert_eq!(ensemble.contamination(), Some(0.15));

        ensemble.train(&frame(60), &report_with_issues(5)).expect("training should succeed");
        assert_eq!(ensemble.contamination(), Some(0.10), "exactly 5 issues keeps the base rate");
    }

    #[test]
    fn test_degenerate_training_sets_are_rejected() {
        let mut ensemble = OutlierEnsemble::new(EnsemblePolicy::default());
        let clean = report_with_issues(0);
        assert!(matches!(ensemble.train(&FeatureFrame::default(), &clean), Err(AnalysisError::EmptyTrainingSet)));

        let prcp_only: Vec<Observation> = (0..20).map(|d| obs(d, Element::Prcp, d as f64)).collect();
        let f = build_features(&StationDataset::from_observations(prcp_only, None), 100.0, 7);
        assert!(matches!(ensemble.train(&f, &clean), Err(AnalysisError::MissingFeature(c)) if c == "TMAX_F"));

        let mut flat = Vec::new();
        for d in 0..20 {
            flat.push(obs(d, Element::Tmax, 250.0));
            flat.push(obs(d, Element::Tmin, 100.0 + d as f64));
        }
        let f = build_features(&StationDataset::from_observations(flat, None), 100.0, 7);
        assert!(matches!(ensemble.train(&f, &clean), Err(AnalysisError::DegenerateFeature(c)) if c == "TMAX_F"));
        assert!(!ensemble.is_trained());
    }

    #[test]
    fn test_each_model_reports_separately() {
        let mut ensemble = OutlierEnsemble::new(EnsemblePolicy::default());
        let f = frame(90);
        ensemble.train(&f, &report_with_issues(0)).unwrap();
        let results = ensemble.detect(&f).unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.model.name()).collect();
        assert_eq!(names, vec!["Isolation Forest", "Local Outlier Factor", "One-Class SVM"]);
        for r in &results {
            assert!(r.rows.len() < f.len() / 2, "{} flagged {} of {}", r.model, r.rows.len(), f.len());
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let mut ensemble = OutlierEnsemble::new(EnsemblePolicy::default());
        let f = frame(40);
        ensemble.train(&f, &report_with_issues(2)).unwrap();
        let file = tempfile::NamedTempFile::new().expect("temp file");
        ensemble.save(file.path()).expect("save");

        let restored = OutlierEnsemble::load(file.path(), EnsemblePolicy::default()).expect("load");
        assert_eq!(restored.contamination(), Some(0.10));
        assert_eq!(restored.detect(&f).unwrap(), ensemble.detect(&f).unwrap());
    }
}
