//! End-to-end analysis scenarios
//!
//! Each test builds a synthetic station history, runs it through an
//! `AnalysisSession` and checks the assembled report.
//!
//! Run with: cargo test --test anomaly_pipeline

use addis_service::config::AnalysisConfig;
use addis_service::ingest::StationDataset;
use addis_service::model::{AnalysisError, Direction, Element, FlagTriplet, Observation, Severity};
use addis_service::report::AnalysisSession;
use addis_service::stations::StationMetadata;
use chrono::{Duration, NaiveDate};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const STATION: &str = "USW00014842";

/// Five-day cycle of offsets in units of 5 °F.
const PATTERN: [f64; 5] = [-1.0, -0.5, 0.0, 0.5, 1.0];

fn fahrenheit_to_raw(f: f64) -> f64 {
    (f - 32.0) * 50.0 / 9.0
}

fn observation(date: NaiveDate, element: Element, raw: f64) -> Observation {
    Observation {
        station_id: STATION.to_string(),
        date,
        element,
        raw_value: Some(raw),
        flags: FlagTriplet {
            measurement: None,
            quality: None,
            source: Some('W'),
        },
    }
}

fn metadata() -> StationMetadata {
    StationMetadata {
        station_id: STATION.to_string(),
        latitude: 40.6667,
        longitude: -89.6833,
        elevation_m: Some(199.0),
        state: Some("IL".to_string()),
        name: "PEORIA GREATER PEORIA AP".to_string(),
    }
}

/// Daily TMAX around 70 °F, with `outlier` replacing one day's value.
fn tmax_history(start: NaiveDate, days: i64, outlier: Option<(i64, f64)>) -> Vec<Observation> {
    (0..days)
        .map(|d| {
            let f = match outlier {
                Some((day, value)) if day == d => value,
                _ => 70.0 + 5.0 * PATTERN[(d % 5) as usize],
            };
            observation(start + Duration::days(d), Element::Tmax, fahrenheit_to_raw(f))
        })
        .collect()
}

fn stats_only() -> AnalysisConfig {
    AnalysisConfig {
        use_ml: false,
        ..AnalysisConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Statistical path
// ---------------------------------------------------------------------------

#[test]
fn test_injected_heat_spike_is_the_only_anomaly() {
    let start = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
    let data = tmax_history(start, 90, Some((45, 110.0)));
    let dataset = StationDataset::from_observations(data, Some(&metadata()));
    let session = AnalysisSession::new(stats_only(), dataset, vec![]);

    let report = session
        .analyze(start, start + Duration::days(89))
        .expect("analysis should succeed");

    assert_eq!(report.statistical.len(), 1, "only the spike is anomalous: {:?}", report.statistical);
    let spike = &report.statistical[0];
    assert_eq!(spike.date, start + Duration::days(45));
    assert_eq!(spike.direction, Direction::High);
    assert_eq!(spike.severity, Severity::Extreme);
    assert_eq!(spike.variable, "TMAX_F");
    assert!((spike.value - 110.0).abs() < 1e-9, "value reported in °F, got {}", spike.value);
    assert!(spike.z_score > 3.0);
    assert_eq!(spike.statistics.baseline_sample_size, 60, "±30 days minus the target date");

    let quality = spike.ghcn_quality.as_ref().expect("flags decoded");
    assert_eq!(quality.quality_score.value(), 100.0, "source W is high quality");
    assert!(!quality.has_quality_issue);
    assert_eq!(spike.qa_score, Some(report.qa.qa_score), "dataset QA score is attached to the anomaly");

    assert_eq!(report.summary.statistical_anomalies, 1);
    assert_eq!(report.summary.total_anomalies, 1);
    assert_eq!(report.summary.records_analyzed, 90);
    assert_eq!(report.summary.elements_analyzed, vec!["TMAX"]);
}

#[test]
fn test_threshold_is_compared_to_the_z_score() {
    let start = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
    let data = tmax_history(start, 90, Some((45, 110.0)));
    let config = AnalysisConfig {
        confidence_threshold: 50.0,
        ..stats_only()
    };
    let session = AnalysisSession::new(config, StationDataset::from_observations(data, Some(&metadata())), vec![]);
    let report = session.analyze(start, start + Duration::days(89)).unwrap();
    assert!(report.statistical.is_empty(), "no z-score exceeds 50");
}

#[test]
fn test_seasonal_path_uses_every_year() {
    let start = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
    let days = (end - start).num_days() + 1;
    let spike_day = (NaiveDate::from_ymd_opt(2023, 7, 10).unwrap() - start).num_days();
    let data = tmax_history(start, days, Some((spike_day, 115.0)));
    let session = AnalysisSession::new(stats_only(), StationDataset::from_observations(data, Some(&metadata())), vec![]);

    let july_start = NaiveDate::from_ymd_opt(2023, 7, 1).unwrap();
    let july_end = NaiveDate::from_ymd_opt(2023, 7, 31).unwrap();
    let records = session.analyze_seasonal(july_start, july_end).expect("seasonal analysis");

    assert_eq!(records.len(), 1, "{:?}", records);
    assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2023, 7, 10).unwrap());
    assert_eq!(records[0].severity, Severity::Extreme);
    assert!(records[0].statistics.baseline_sample_size > 60, "windows from all three years");
    assert!(records[0].qa_score.is_some());
}

#[test]
fn test_window_outside_history_is_data_unavailable() {
    let start = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
    let session = AnalysisSession::new(
        stats_only(),
        StationDataset::from_observations(tmax_history(start, 30, None), Some(&metadata())),
        vec![],
    );
    let later = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    match session.analyze(later, later + Duration::days(10)) {
        Err(AnalysisError::DataUnavailable { station, .. }) => assert_eq!(station, STATION),
        other => panic!("expected DataUnavailable, got {:?}", other.map(|r| r.summary)),
    }
}

#[test]
fn test_invalid_configuration_fails_loudly() {
    let start = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
    let config = AnalysisConfig {
        min_samples: 1,
        ..stats_only()
    };
    let session = AnalysisSession::new(
        config,
        StationDataset::from_observations(tmax_history(start, 30, None), None),
        vec![],
    );
    let result = session.analyze(start, start + Duration::days(29));
    assert!(matches!(result, Err(AnalysisError::Configuration(_))));

    let mut config = stats_only();
    config
        .apply_env_overrides(|key| (key == "ADDIS_WINDOW_DAYS").then(|| "1000000000".to_string()))
        .expect("override parses");
    let session = AnalysisSession::new(
        config,
        StationDataset::from_observations(tmax_history(start, 30, None), None),
        vec![],
    );
    let result = session.analyze(start, start + Duration::days(29));
    assert!(
        matches!(result, Err(AnalysisError::Configuration(_))),
        "an out-of-range window is reported, not a panic"
    );
}

// ---------------------------------------------------------------------------
// ML path
// ---------------------------------------------------------------------------

fn full_history(start: NaiveDate, days: i64) -> Vec<Observation> {
    let mut data = Vec::new();
    for d in 0..days {
        let date = start + Duration::days(d);
        let wobble = ((d * 7) % 13) as f64;
        data.push(observation(date, Element::Tmax, 250.0 + wobble * 4.0));
        data.push(observation(date, Element::Tmin, 120.0 + wobble * 3.0 - (d % 3) as f64 * 5.0));
        data.push(observation(date, Element::Prcp, if d % 6 == 0 { 40.0 + wobble } else { 0.0 }));
    }
    data
}

#[test]
fn test_ml_models_report_separately() {
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    let dataset = StationDataset::from_observations(full_history(start, 150), Some(&metadata()));
    let session = AnalysisSession::new(AnalysisConfig::default(), dataset, vec![]);

    let window_start = start + Duration::days(100);
    let window_end = start + Duration::days(149);
    let report = session.analyze(window_start, window_end).expect("analysis should succeed");

    let models: Vec<&str> = report.ml.keys().map(String::as_str).collect();
    assert_eq!(models, vec!["Isolation Forest", "Local Outlier Factor", "One-Class SVM"]);

    for (model, rows) in &report.ml {
        assert!(rows.len() < 50, "{} flagged every row", model);
        for row in rows {
            assert_eq!(&row.model, model);
            assert_eq!(row.station, STATION);
            assert!(row.date >= window_start && row.date <= window_end, "rows come from the window");
            assert!(row.tmax_f.is_some() && row.tmin_f.is_some());
        }
    }

    let ml_total: usize = report.ml.values().map(Vec::len).sum();
    assert_eq!(report.summary.ml_anomalies, ml_total);
    assert_eq!(
        report.summary.total_anomalies,
        report.summary.statistical_anomalies + ml_total
    );
}

#[test]
fn test_ml_path_requires_temperature_features() {
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    let data: Vec<Observation> = (0..60)
        .map(|d| observation(start + Duration::days(d), Element::Prcp, (d % 4) as f64 * 10.0))
        .collect();
    let session = AnalysisSession::new(
        AnalysisConfig::default(),
        StationDataset::from_observations(data, Some(&metadata())),
        vec![],
    );
    let result = session.analyze(start, start + Duration::days(59));
    assert!(
        matches!(result, Err(AnalysisError::MissingFeature(ref column)) if column == "TMAX_F"),
        "precipitation-only station cannot train the ensemble"
    );
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[test]
fn test_report_json_uses_consumer_field_names() {
    let start = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
    let data = tmax_history(start, 90, Some((45, 110.0)));
    let session = AnalysisSession::new(stats_only(), StationDataset::from_observations(data, Some(&metadata())), vec![]);
    let report = session.analyze(start, start + Duration::days(89)).unwrap();

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    let record = &json["statistical"][0];
    assert_eq!(record["DATE"], "2023-07-16");
    assert_eq!(record["STATION"], STATION);
    assert_eq!(record["TYPE"], "Temperature");
    assert_eq!(record["VARIABLE"], "TMAX_F");
    assert_eq!(record["SEVERITY"], "extreme");
    assert_eq!(record["DIRECTION"], "High");
    assert!(record["EXPLANATION"].as_str().unwrap().contains("110.0"));
    assert!(record["STATISTICS"]["threshold"].as_f64().unwrap() > 0.0);
    assert_eq!(record["QA_SCORE"], json["qa"]["qa_score"]);
    assert_eq!(json["summary"]["station"], STATION);
    assert_eq!(json["summary"]["confidence_threshold"], 2.0);
}
