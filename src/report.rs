//! Report Assembler.
//!
//! `AnalysisSession` is the per-station context object: it owns the
//! configuration, the station's dataset, any neighbor datasets and the
//! observation index built once at construction. `analyze` runs the QA
//! audit, the statistical path and the ML path and folds them into one
//! `StationReport`. Sessions are never shared between stations.

use crate::alert::classify;
use crate::analysis::{self, ObservationIndex, compute_baseline, compute_seasonal_baseline};
use crate::config::AnalysisConfig;
use crate::ensemble::features::{FeatureRow, PRCP_IN, QA_SCORE, TEMP_RANGE_F, TMAX_F, TMIN_F};
use crate::ensemble::{OutlierEnsemble, build_features};
use crate::flags::{self, FlagQualitySummary};
use crate::ingest::StationDataset;
use crate::logging::{self, Component};
use crate::model::{AnalysisError, Anomaly, Direction, Element, Observation, QualityContext, Severity};
use crate::qa::{self, QaReport};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

// ---------------------------------------------------------------------------
// Wire records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyStatistics {
    pub mean: f64,
    pub std: f64,
    /// `confidence_threshold * std`, in the element's display units.
    pub threshold: f64,
    pub baseline_sample_size: usize,
}

/// One statistical anomaly as consumers receive it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AnomalyRecord {
    pub date: NaiveDate,
    pub station: String,
    pub value: f64,
    pub z_score: f64,
    /// Element family label, e.g. "Temperature".
    #[serde(rename = "TYPE")]
    pub family: String,
    /// Display-unit column name, e.g. "TMAX_F".
    pub variable: String,
    pub severity: Severity,
    pub direction: Direction,
    pub explanation: String,
    pub statistics: AnomalyStatistics,
    pub ghcn_quality: Option<QualityContext>,
    /// Dataset QA score, as on the ML rows.
    pub qa_score: Option<f64>,
}

impl AnomalyRecord {
    pub fn from_anomaly(anomaly: &Anomaly, confidence_threshold: f64) -> Self {
        AnomalyRecord {
            date: anomaly.date,
            station: anomaly.station_id.clone(),
            value: anomaly.observed_value,
            z_score: anomaly.z_score,
            family: anomaly.element.family().label().to_string(),
            variable: anomaly.element.variable_name(),
            severity: anomaly.severity,
            direction: anomaly.direction,
            explanation: anomaly.explanation.to_string(),
            statistics: AnomalyStatistics {
                mean: anomaly.baseline.mean,
                std: anomaly.baseline.std,
                threshold: confidence_threshold * anomaly.baseline.std,
                baseline_sample_size: anomaly.baseline.sample_size,
            },
            ghcn_quality: anomaly.quality.clone(),
            qa_score: anomaly.qa_score,
        }
    }
}

/// One row flagged by one ensemble model. Missing features serialise as null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct MlOutlierRecord {
    pub date: NaiveDate,
    pub station: String,
    pub model: String,
    pub tmax_f: Option<f64>,
    pub tmin_f: Option<f64>,
    pub prcp_in: Option<f64>,
    pub temp_range_f: Option<f64>,
    pub qa_score: Option<f64>,
}

impl MlOutlierRecord {
    fn from_row(row: &FeatureRow, station: &str, model: &str) -> Self {
        MlOutlierRecord {
            date: row.date,
            station: station.to_string(),
            model: model.to_string(),
            tmax_f: row.get(TMAX_F),
            tmin_f: row.get(TMIN_F),
            prcp_in: row.get(PRCP_IN),
            temp_range_f: row.get(TEMP_RANGE_F),
            qa_score: row.get(QA_SCORE),
        }
    }
}

/// Descriptive statistics for one element over the analysis window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSummary {
    pub element: String,
    pub variable: String,
    pub total_records: usize,
    pub anomalies_detected: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub station: String,
    /// "YYYY-MM-DD to YYYY-MM-DD".
    pub period: String,
    pub confidence_threshold: f64,
    /// The QA score of the station dataset.
    pub data_quality_score: f64,
    pub total_qa_issues: usize,
    pub statistical_anomalies: usize,
    pub ml_anomalies: usize,
    pub total_anomalies: usize,
    pub elements_analyzed: Vec<String>,
    pub records_analyzed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationReport {
    pub summary: ReportSummary,
    pub qa: QaReport,
    pub statistical: Vec<AnomalyRecord>,
    /// Flagged rows per model name. Models are never merged.
    pub ml: BTreeMap<String, Vec<MlOutlierRecord>>,
    pub element_summaries: Vec<ElementSummary>,
    pub flag_quality: Vec<FlagQualitySummary>,
}

impl StationReport {
    pub fn to_json(&self) -> Result<String, AnalysisError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ---------------------------------------------------------------------------
// Analysis session
// ---------------------------------------------------------------------------

pub struct AnalysisSession {
    config: AnalysisConfig,
    dataset: StationDataset,
    neighbors: Vec<StationDataset>,
    index: ObservationIndex,
}

impl AnalysisSession {
    pub fn new(config: AnalysisConfig, dataset: StationDataset, neighbors: Vec<StationDataset>) -> Self {
        let index = ObservationIndex::build(&dataset.observations);
        logging::debug(
            Component::Report,
            dataset.station_id.as_deref(),
            &format!(
                "Indexed {} values across {} observations ({} neighbor datasets)",
                index.len(),
                dataset.observations.len(),
                neighbors.len()
            ),
        );
        AnalysisSession {
            config,
            dataset,
            neighbors,
            index,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn dataset(&self) -> &StationDataset {
        &self.dataset
    }

    /// QA audit over the full station history.
    pub fn audit(&self) -> QaReport {
        qa::run_audit(&self.dataset, &self.neighbors, &self.config.qa)
    }

    /// Full report for `[start, end]`.
    pub fn analyze(&self, start: NaiveDate, end: NaiveDate) -> Result<StationReport, AnalysisError> {
        self.analyze_inner(start, end).inspect_err(|e| {
            logging::log_analysis_failure(self.dataset.station_label(), "Analysis", e);
        })
    }

    fn analyze_inner(&self, start: NaiveDate, end: NaiveDate) -> Result<StationReport, AnalysisError> {
        self.config.validate()?;
        let station = self.dataset.station_label().to_string();
        let window = self.window_observations(start, end)?;

        let qa = self.audit();

        let anomalies = if self.config.use_statistical {
            self.statistical_anomalies(&window, &qa)
        } else {
            Vec::new()
        };
        let ml = if self.config.use_ml {
            self.ml_outliers(start, end, &qa)?
        } else {
            BTreeMap::new()
        };

        let elements: Vec<Element> = window
            .iter()
            .map(|o| o.element.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let element_summaries = elements
            .iter()
            .map(|element| self.element_summary(element, start, end, &anomalies))
            .collect();
        let window_owned: Vec<Observation> = window.iter().map(|o| (*o).clone()).collect();
        let flag_quality = elements
            .iter()
            .filter_map(|element| flags::quality_summary(&window_owned, element))
            .collect();

        let statistical: Vec<AnomalyRecord> = anomalies
            .iter()
            .map(|a| AnomalyRecord::from_anomaly(a, self.config.confidence_threshold))
            .collect();
        let ml_count: usize = ml.values().map(Vec::len).sum();

        let summary = ReportSummary {
            station: station.clone(),
            period: format!("{} to {}", start, end),
            confidence_threshold: self.config.confidence_threshold,
            data_quality_score: qa.qa_score,
            total_qa_issues: qa.total_issues,
            statistical_anomalies: statistical.len(),
            ml_anomalies: ml_count,
            total_anomalies: statistical.len() + ml_count,
            elements_analyzed: elements.iter().map(|e| e.code().to_string()).collect(),
            records_analyzed: window.len(),
        };
        logging::log_analysis_summary(&station, summary.records_analyzed, summary.total_anomalies, qa.qa_score);

        Ok(StationReport {
            summary,
            qa,
            statistical,
            ml,
            element_summaries,
            flag_quality,
        })
    }

    /// TMAX/TMIN anomalies in `[start, end]` against the day-of-year
    /// baseline across all years of record.
    pub fn analyze_seasonal(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<AnomalyRecord>, AnalysisError> {
        self.analyze_seasonal_inner(start, end).inspect_err(|e| {
            logging::log_analysis_failure(self.dataset.station_label(), "Seasonal analysis", e);
        })
    }

    fn analyze_seasonal_inner(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<AnomalyRecord>, AnalysisError> {
        self.config.validate()?;
        let window = self.window_observations(start, end)?;
        let qa = self.audit();

        let mut anomalies = Vec::new();
        for obs in unique_by_element_date(&window) {
            if !matches!(obs.element, Element::Tmax | Element::Tmin) {
                continue;
            }
            let baseline =
                compute_seasonal_baseline(&self.index, &obs.station_id, &obs.element, obs.date, &self.config.seasonal);
            if let Some(anomaly) = classify(obs.display_value(), baseline.as_ref(), self.config.confidence_threshold) {
                anomalies.push(with_quality(anomaly, obs, &qa));
            }
        }
        sort_anomalies(&mut anomalies);
        logging::log_analysis_summary(self.dataset.station_label(), window.len(), anomalies.len(), qa.qa_score);

        Ok(anomalies
            .iter()
            .map(|a| AnomalyRecord::from_anomaly(a, self.config.confidence_threshold))
            .collect())
    }

    fn window_observations(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<&Observation>, AnalysisError> {
        let window = self.dataset.observations_between(start, end);
        if window.is_empty() {
            let history = match self.dataset.date_range() {
                Some((first, last)) => format!("history covers {} to {}", first, last),
                None => "dataset is empty".to_string(),
            };
            return Err(AnalysisError::DataUnavailable {
                station: self.dataset.station_label().to_string(),
                detail: format!("no observations between {} and {} ({})", start, end, history),
            });
        }
        Ok(window)
    }

    fn statistical_anomalies(&self, window: &[&Observation], qa: &QaReport) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();
        let mut undetermined = 0usize;
        for obs in unique_by_element_date(window) {
            let Some(value) = obs.display_value() else {
                continue;
            };
            let baseline = compute_baseline(
                &self.index,
                &obs.station_id,
                &obs.element,
                obs.date,
                self.config.window_days,
                self.config.min_samples,
            );
            if baseline.is_none() {
                undetermined += 1;
            }
            if let Some(anomaly) = classify(Some(value), baseline.as_ref(), self.config.confidence_threshold) {
                anomalies.push(with_quality(anomaly, obs, qa));
            }
        }
        sort_anomalies(&mut anomalies);
        logging::info(
            Component::Baseline,
            self.dataset.station_id.as_deref(),
            &format!(
                "{} statistical anomalies at |z| > {} ({} values without a baseline, QA score {:.0})",
                anomalies.len(),
                self.config.confidence_threshold,
                undetermined,
                qa.qa_score
            ),
        );
        anomalies
    }

    fn ml_outliers(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        qa: &QaReport,
    ) -> Result<BTreeMap<String, Vec<MlOutlierRecord>>, AnalysisError> {
        let frame = build_features(&self.dataset, qa.qa_score, self.config.ensemble.rolling_window);
        let mut ensemble = OutlierEnsemble::new(self.config.ensemble.clone());
        ensemble.train(&frame, qa)?;

        let window = frame.between(start, end);
        let mut outliers = BTreeMap::new();
        for result in ensemble.detect(&window)? {
            let name = result.model.name();
            let records = result
                .rows
                .iter()
                .filter_map(|&i| window.rows.get(i))
                .map(|row| MlOutlierRecord::from_row(row, &window.station_id, name))
                .collect();
            outliers.insert(name.to_string(), records);
        }
        Ok(outliers)
    }

    fn element_summary(&self, element: &Element, start: NaiveDate, end: NaiveDate, anomalies: &[Anomaly]) -> ElementSummary {
        let values: Vec<f64> = self
            .index
            .window(self.dataset.station_label(), element, start, end)
            .iter()
            .map(|(_, v)| *v)
            .collect();
        let stats = analysis::stats::summarize(&values);
        ElementSummary {
            element: element.code().to_string(),
            variable: element.variable_name(),
            total_records: values.len(),
            anomalies_detected: anomalies.iter().filter(|a| &a.element == element).count(),
            mean: analysis::stats::mean(&values),
            std: stats.map(|s| s.std),
            min: values.iter().copied().reduce(f64::min),
            max: values.iter().copied().reduce(f64::max),
        }
    }
}

/// First observation per (element, date), in input order.
fn unique_by_element_date<'a>(window: &[&'a Observation]) -> Vec<&'a Observation> {
    let mut seen = HashSet::new();
    window
        .iter()
        .copied()
        .filter(|o| seen.insert((o.element.clone(), o.date)))
        .collect()
}

fn with_quality(mut anomaly: Anomaly, obs: &Observation, qa: &QaReport) -> Anomaly {
    anomaly.quality = Some(flags::quality_context(&obs.flags));
    anomaly.qa_score = Some(qa.qa_score);
    anomaly
}

fn sort_anomalies(anomalies: &mut [Anomaly]) {
    anomalies.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.element.cmp(&b.element)));
}
