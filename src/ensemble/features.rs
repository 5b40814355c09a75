//! Feature schema for the outlier ensemble.
//!
//! The column set is fixed. Every row is one date on which at least one of
//! TMAX, TMIN or PRCP was observed. Missing temperatures stay `NaN` here and
//! are imputed with training-set column means by the ensemble; missing
//! precipitation is zero.

use crate::ingest::StationDataset;
use crate::model::Element;
use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};

pub const FEATURE_COLUMNS: [&str; 13] = [
    "TMAX_F",
    "TMIN_F",
    "PRCP_IN",
    "TEMP_RANGE_F",
    "TMAX_7DAY_AVG_F",
    "TMIN_7DAY_AVG_F",
    "PRCP_7DAY_SUM_IN",
    "TMAX_SEASONAL_DEV_F",
    "TMIN_SEASONAL_DEV_F",
    "PRCP_SEASONAL_DEV_IN",
    "MONTH",
    "DAY_OF_YEAR",
    "QA_SCORE",
];

pub const N_FEATURES: usize = FEATURE_COLUMNS.len();

pub const TMAX_F: usize = 0;
pub const TMIN_F: usize = 1;
pub const PRCP_IN: usize = 2;
pub const TEMP_RANGE_F: usize = 3;
pub const QA_SCORE: usize = 12;

/// Columns that must carry real signal for training to proceed.
pub const REQUIRED_COLUMNS: [usize; 2] = [TMAX_F, TMIN_F];

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub date: NaiveDate,
    /// Indexed by the `FEATURE_COLUMNS` positions. `NaN` marks a missing value.
    pub values: [f64; N_FEATURES],
}

impl FeatureRow {
    pub fn get(&self, column: usize) -> Option<f64> {
        self.values.get(column).copied().filter(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureFrame {
    pub station_id: String,
    pub rows: Vec<FeatureRow>,
}

impl FeatureFrame {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows dated within `[start, end]`. Rolling and seasonal features keep
    /// the values computed over the full history.
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> FeatureFrame {
        FeatureFrame {
            station_id: self.station_id.clone(),
            rows: self
                .rows
                .iter()
                .filter(|r| r.date >= start && r.date <= end)
                .cloned()
                .collect(),
        }
    }

    /// Observed (non-`NaN`) values of one column.
    pub fn column(&self, column: usize) -> Vec<f64> {
        self.rows.iter().filter_map(|r| r.get(column)).collect()
    }
}

/// Trailing-window mean over the last `window` entries, skipping `NaN`.
fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            let lo = (i + 1).saturating_sub(window);
            let seen: Vec<f64> = values[lo..=i].iter().copied().filter(|v| v.is_finite()).collect();
            if seen.is_empty() {
                f64::NAN
            } else {
                seen.iter().sum::<f64>() / seen.len() as f64
            }
        })
        .collect()
}

fn rolling_sum(values: &[f64], window: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            let lo = (i + 1).saturating_sub(window);
            values[lo..=i].iter().copied().filter(|v| v.is_finite()).sum::<f64>()
        })
        .collect()
}

/// Deviation of each value from the mean of its calendar month.
fn seasonal_deviation(dates: &[NaiveDate], values: &[f64]) -> Vec<f64> {
    let mut sums: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
    for (date, v) in dates.iter().zip(values) {
        if v.is_finite() {
            let entry = sums.entry(date.month()).or_insert((0.0, 0));
            entry.0 += v;
            entry.1 += 1;
        }
    }
    dates
        .iter()
        .zip(values)
        .map(|(date, v)| match sums.get(&date.month()) {
            Some((sum, n)) if v.is_finite() => v - sum / *n as f64,
            _ => f64::NAN,
        })
        .collect()
}

/// Builds the feature frame for a station's full history.
pub fn build_features(dataset: &StationDataset, qa_score: f64, rolling_window: usize) -> FeatureFrame {
    let tmax: BTreeMap<NaiveDate, f64> = dataset.display_series(&Element::Tmax).into_iter().collect();
    let tmin: BTreeMap<NaiveDate, f64> = dataset.display_series(&Element::Tmin).into_iter().collect();
    let prcp: BTreeMap<NaiveDate, f64> = dataset.display_series(&Element::Prcp).into_iter().collect();

    let dates: Vec<NaiveDate> = tmax
        .keys()
        .chain(tmin.keys())
        .chain(prcp.keys())
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let tmax_f: Vec<f64> = dates.iter().map(|d| tmax.get(d).copied().unwrap_or(f64::NAN)).collect();
    let tmin_f: Vec<f64> = dates.iter().map(|d| tmin.get(d).copied().unwrap_or(f64::NAN)).collect();
    let prcp_in: Vec<f64> = dates.iter().map(|d| prcp.get(d).copied().unwrap_or(0.0)).collect();

    let tmax_avg = rolling_mean(&tmax_f, rolling_window);
    let tmin_avg = rolling_mean(&tmin_f, rolling_window);
    let prcp_sum = rolling_sum(&prcp_in, rolling_window);
    let tmax_dev = seasonal_deviation(&dates, &tmax_f);
    let tmin_dev = seasonal_deviation(&dates, &tmin_f);
    let prcp_dev = seasonal_deviation(&dates, &prcp_in);

    let rows = dates
        .iter()
        .enumerate()
        .map(|(i, date)| FeatureRow {
            date: *date,
            values: [
                tmax_f[i],
                tmin_f[i],
                prcp_in[i],
                tmax_f[i] - tmin_f[i],
                tmax_avg[i],
                tmin_avg[i],
                prcp_sum[i],
                tmax_dev[i],
                tmin_dev[i],
                prcp_dev[i],
                date.month() as f64,
                date.ordinal() as f64,
                qa_score,
            ],
        })
        .collect();

    FeatureFrame {
        station_id: dataset.station_label().to_string(),
        rows,
    }
}
