//! The six GHCN-Daily style audit checks.
//!
//! Each check is independent and returns human-readable findings; an empty
//! vector means the check passed. Values are raw GHCN units unless a check
//! says otherwise.

use crate::analysis::stats;
use crate::config::QaPolicy;
use crate::ingest::StationDataset;
use crate::model::Element;
use crate::stations::haversine_km;
use chrono::NaiveDate;
use std::collections::BTreeMap;

const TEMPERATURE_ELEMENTS: [Element; 2] = [Element::Tmax, Element::Tmin];

fn all_raw_values<'a>(dataset: &'a StationDataset, element: &'a Element) -> impl Iterator<Item = f64> + 'a {
    dataset
        .observations
        .iter()
        .filter(move |o| &o.element == element)
        .filter_map(|o| o.raw_value)
        .filter(|v| v.is_finite())
}

// ---------------------------------------------------------------------------
// 1. Format
// ---------------------------------------------------------------------------

/// Unparsable dates, out-of-range temperature codes, negative precipitation
/// and missing station metadata.
pub fn format_check(dataset: &StationDataset, policy: &QaPolicy) -> Vec<String> {
    let mut findings = Vec::new();

    if dataset.unparsed_dates > 0 {
        findings.push("Invalid date format".to_string());
    }

    let bound = policy.temperature_format_bound;
    for element in &TEMPERATURE_ELEMENTS {
        if all_raw_values(dataset, element).any(|v| v < -bound || v > bound) {
            findings.push(format!("Invalid temperature values in {}", element));
        }
    }

    if all_raw_values(dataset, &Element::Prcp).any(|v| v < 0.0) {
        findings.push("Negative precipitation values".to_string());
    }

    let metadata = [
        ("STATION", dataset.station_id.is_some()),
        ("LATITUDE", dataset.latitude.is_some()),
        ("LONGITUDE", dataset.longitude.is_some()),
        ("NAME", dataset.name.is_some()),
    ];
    for (column, present) in metadata {
        if !present {
            findings.push(format!("Missing {} metadata", column));
        }
    }

    findings
}

// ---------------------------------------------------------------------------
// 2. Physical limits
// ---------------------------------------------------------------------------

pub fn physical_limits_check(dataset: &StationDataset, policy: &QaPolicy) -> Vec<String> {
    let mut findings = Vec::new();

    for (element, (lo, hi)) in [(Element::Tmax, policy.tmax_limits), (Element::Tmin, policy.tmin_limits)] {
        let violations = all_raw_values(dataset, &element).filter(|v| *v < lo || *v > hi).count();
        if violations > 0 {
            findings.push(format!(
                "{} values outside physical limits: {} violations",
                element, violations
            ));
        }
    }

    let violations = all_raw_values(dataset, &Element::Prcp)
        .filter(|v| *v > policy.prcp_ceiling)
        .count();
    if violations > 0 {
        findings.push(format!(
            "Precipitation values exceed reasonable limits: {} violations",
            violations
        ));
    }

    findings
}

// ---------------------------------------------------------------------------
// 3. Climatological limits
// ---------------------------------------------------------------------------

/// Dataset-wide `|x - mean| > sigma * std` on the °F series.
pub fn climatological_check(dataset: &StationDataset, policy: &QaPolicy) -> Vec<String> {
    let mut findings = Vec::new();

    for element in &TEMPERATURE_ELEMENTS {
        let values: Vec<f64> = all_raw_values(dataset, element)
            .map(|v| element.to_display_units(v))
            .collect();
        if values.len() < policy.climatological_min_samples {
            continue;
        }
        let (Some(mean), Some(std)) = (stats::mean(&values), stats::sample_std(&values)) else {
            continue;
        };
        let extremes = values
            .iter()
            .filter(|v| (*v - mean).abs() > policy.climatological_sigma * std)
            .count();
        if extremes > 0 {
            findings.push(format!(
                "{} climatological extremes: {} values",
                element.variable_name(),
                extremes
            ));
        }
    }

    findings
}

// ---------------------------------------------------------------------------
// 4. Temporal persistence
// ---------------------------------------------------------------------------

/// Length of the longest run of exactly equal consecutive values.
pub fn longest_identical_run(values: &[f64]) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous: Option<f64> = None;
    for &v in values {
        current = if previous == Some(v) { current + 1 } else { 1 };
        longest = longest.max(current);
        previous = Some(v);
    }
    longest
}

/// Stuck-sensor check on the date-ordered temperature series.
pub fn persistence_check(dataset: &StationDataset, policy: &QaPolicy) -> Vec<String> {
    let mut findings = Vec::new();
    for element in &TEMPERATURE_ELEMENTS {
        let values: Vec<f64> = dataset.raw_series(element).into_iter().map(|(_, v)| v).collect();
        let run = longest_identical_run(&values);
        if run > policy.persistence_max_run {
            findings.push(format!(
                "{} excessive persistence: {} consecutive identical values",
                element, run
            ));
        }
    }
    findings
}

// ---------------------------------------------------------------------------
// 5. Internal consistency
// ---------------------------------------------------------------------------

pub fn consistency_check(dataset: &StationDataset, policy: &QaPolicy) -> Vec<String> {
    let tmin: BTreeMap<NaiveDate, f64> = dataset.raw_series(&Element::Tmin).into_iter().collect();
    let pairs: Vec<(f64, f64)> = dataset
        .raw_series(&Element::Tmax)
        .into_iter()
        .filter_map(|(date, tmax)| tmin.get(&date).map(|tmin| (tmax / 10.0, tmin / 10.0)))
        .collect();

    let mut findings = Vec::new();

    let inverted = pairs.iter().filter(|(tmax, tmin)| tmax < tmin).count();
    if inverted > 0 {
        findings.push(format!("TMAX < TMIN inconsistency: {} cases", inverted));
    }

    let wide = pairs
        .iter()
        .filter(|(tmax, tmin)| tmax - tmin > policy.consistency_max_range_c)
        .count();
    if wide > 0 {
        findings.push(format!("Extreme temperature ranges: {} cases", wide));
    }

    findings
}

// ---------------------------------------------------------------------------
// 6. Neighbor comparison
// ---------------------------------------------------------------------------

/// Average Pearson correlation of the °F temperature series against every
/// neighbor within the radius. No neighbors (or no coordinates) means no
/// finding.
pub fn neighbor_check(dataset: &StationDataset, neighbors: &[StationDataset], policy: &QaPolicy) -> Vec<String> {
    let mut findings = Vec::new();
    let Some((lat, lon)) = dataset.coordinates() else {
        return findings;
    };

    let nearby: Vec<&StationDataset> = neighbors
        .iter()
        .filter(|n| n.station_id.is_none() || n.station_id != dataset.station_id)
        .filter(|n| {
            n.coordinates()
                .is_some_and(|(nlat, nlon)| haversine_km(lat, lon, nlat, nlon) < policy.neighbor_radius_km)
        })
        .collect();
    if nearby.is_empty() {
        return findings;
    }

    for element in &TEMPERATURE_ELEMENTS {
        let target: BTreeMap<NaiveDate, f64> = dataset.display_series(element).into_iter().collect();
        if target.len() <= policy.neighbor_min_station_samples {
            continue;
        }

        let mut correlations = Vec::new();
        for neighbor in &nearby {
            let series = neighbor.display_series(element);
            if series.len() <= policy.neighbor_min_overlap {
                continue;
            }
            let (xs, ys): (Vec<f64>, Vec<f64>) = series
                .iter()
                .filter_map(|(date, v)| target.get(date).map(|t| (*t, *v)))
                .unzip();
            if xs.len() <= policy.neighbor_min_overlap {
                continue;
            }
            if let Some(r) = stats::pearson(&xs, &ys) {
                correlations.push(r);
            }
        }

        if let Some(average) = stats::mean(&correlations) {
            if average < policy.neighbor_min_correlation {
                findings.push(format!(
                    "{} low correlation with neighbors: {:.3}",
                    element.variable_name(),
                    average
                ));
            }
        }
    }

    findings
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
