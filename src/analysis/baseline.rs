//! Baseline Engine.
//!
//! Two windowing strategies:
//! - date window: every value within `±window_days` of the target date;
//! - seasonal window: values within `±half_window_days` of the same calendar
//!   day in every year of record.
//!
//! Both exclude the target date itself and return `None` rather than a
//! degenerate baseline when too few values remain or the spread is zero.

use crate::analysis::index::ObservationIndex;
use crate::analysis::stats;
use crate::config::SeasonalWindow;
use crate::logging::{self, Component};
use crate::model::{Baseline, Element};
use chrono::{Datelike, Duration, NaiveDate};
use std::collections::BTreeMap;

/// Date-window baseline around `target_date`.
pub fn compute_baseline(
    index: &ObservationIndex,
    station_id: &str,
    element: &Element,
    target_date: NaiveDate,
    window_days: i64,
    min_samples: usize,
) -> Option<Baseline> {
    let (start, end) = span(target_date, window_days);
    let values: Vec<f64> = index
        .window(station_id, element, start, end)
        .iter()
        .filter(|(date, _)| *date != target_date)
        .map(|(_, v)| *v)
        .collect();
    build(station_id, element, target_date, &values, min_samples)
}

/// Day-of-year baseline across every year of record.
///
/// February 29 is centred on February 28 in non-leap years.
pub fn compute_seasonal_baseline(
    index: &ObservationIndex,
    station_id: &str,
    element: &Element,
    target_date: NaiveDate,
    window: &SeasonalWindow,
) -> Option<Baseline> {
    let series = index.series(station_id, element);
    let (first, last) = (series.first()?.0, series.last()?.0);

    // Keyed by date: wide windows from adjacent years may overlap.
    let mut values: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    // One year either side so windows straddling New Year are complete.
    for year in (first.year() - 1)..=(last.year() + 1) {
        let Some(center) = same_day_in(year, target_date) else {
            continue;
        };
        let (start, end) = span(center, window.half_window_days);
        values.extend(
            index
                .window(station_id, element, start, end)
                .iter()
                .filter(|(date, _)| *date != target_date)
                .map(|(date, v)| (*date, *v)),
        );
    }
    let values: Vec<f64> = values.into_values().collect();
    build(station_id, element, target_date, &values, window.min_samples)
}

/// `[center - days, center + days]`, saturating at the calendar limits.
fn span(center: NaiveDate, days: i64) -> (NaiveDate, NaiveDate) {
    let delta = Duration::try_days(days);
    let start = delta.and_then(|d| center.checked_sub_signed(d)).unwrap_or(NaiveDate::MIN);
    let end = delta.and_then(|d| center.checked_add_signed(d)).unwrap_or(NaiveDate::MAX);
    (start, end)
}

fn same_day_in(year: i32, date: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, date.month(), date.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, date.month(), date.day() - 1))
}

fn build(
    station_id: &str,
    element: &Element,
    target_date: NaiveDate,
    values: &[f64],
    min_samples: usize,
) -> Option<Baseline> {
    if values.len() < min_samples {
        return None;
    }
    let summary = stats::summarize(values)?;
    if summary.count < min_samples || !(summary.std > 0.0) {
        logging::debug(
            Component::Baseline,
            Some(station_id),
            &format!("No baseline for {} on {}: zero spread", element, target_date),
        );
        return None;
    }
    Some(Baseline {
        station_id: station_id.to_string(),
        element: element.clone(),
        target_date,
        mean: summary.mean,
        std: summary.std,
        sample_size: summary.count,
        min: summary.min,
        max: summary.max,
        p25: summary.p25,
        p75: summary.p75,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FlagTriplet, Observation};

    const STATION: &str = "USC00116610";

    fn snow(date: NaiveDate, raw: f64) -> Observation {
        Observation {
            station_id: STATION.to_string(),
            date,
            element: Element::Snow,
            raw_value: Some(raw),
            flags: FlagTriplet::default(),
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_target_date_is_excluded() {
        let target = day(2024, 1, 10);
        let data = vec![
            snow(day(2024, 1, 8), 1.0),
            snow(day(2024, 1, 9), 2.0),
            snow(target, 1000.0),
            snow(day(2024, 1, 11), 3.0),
            snow(day(2024, 1, 12), 4.0),
            snow(day(2024, 1, 13), 5.0),
        ];
        let index = ObservationIndex::build(&data);
        let b = compute_baseline(&index, STATION, &Element::Snow, target, 30, 5).expect("five values");
        assert_eq!(b.sample_size, 5);
        assert_eq!(b.mean, 3.0, "the 1000 on the target date must not leak in");
        assert_eq!(b.max, 5.0);
        assert_eq!(b.p25, 2.0);
        assert_eq!(b.p75, 4.0);
    }

    #[test]
    fn test_too_few_samples_is_none() {
        let data: Vec<Observation> = (1..=4).map(|d| snow(day(2024, 1, d), d as f64)).collect();
        let index = ObservationIndex::build(&data);
        assert!(compute_baseline(&index, STATION, &Element::Snow, day(2024, 1, 20), 30, 5).is_none());
    }

    #[test]
    fn test_zero_spread_is_none() {
        let data: Vec<Observation> = (1..=10).map(|d| snow(day(2024, 1, d), 7.0)).collect();
        let index = ObservationIndex::build(&data);
        assert!(
            compute_baseline(&index, STATION, &Element::Snow, day(2024, 1, 5), 30, 5).is_none(),
            "std == 0 must not produce a baseline"
        );
    }

    #[test]
    fn test_window_bounds_are_respected() {
        let data: Vec<Observation> = (0..100)
            .map(|i| snow(day(2024, 1, 1) + Duration::days(i), i as f64))
            .collect();
        let index = ObservationIndex::build(&data);
        let target = day(2024, 1, 1) + Duration::days(50);
        let b = compute_baseline(&index, STATION, &Element::Snow, target, 10, 5).unwrap();
        assert_eq!(b.sample_size, 20);
        assert_eq!(b.min, 40.0);
        assert_eq!(b.max, 60.0);
    }

    #[test]
    fn test_seasonal_baseline_spans_years() {
        // Five winters, values around each 15 January, with the year as the value.
        let mut data = Vec::new();
        for year in 2019..=2023 {
            for offset in -3..=3 {
                data.push(snow(day(year, 1, 15) + Duration::days(offset), year as f64));
            }
            // Outside the ±15 day window.
            data.push(snow(day(year, 3, 1), 9999.0));
        }
        let index = ObservationIndex::build(&data);
        let window = SeasonalWindow::default();
        let b = compute_seasonal_baseline(&index, STATION, &Element::Snow, day(2023, 1, 15), &window)
            .expect("34 samples across five years");
        assert_eq!(b.sample_size, 34, "35 in-window values minus the target date");
        assert!(b.max < 9999.0, "values outside the seasonal window are excluded");
        assert!(b.min == 2019.0 && b.max == 2023.0);
    }

    #[test]
    fn test_seasonal_baseline_handles_new_year_and_leap_day() {
        let mut data = Vec::new();
        for year in 2019..=2023 {
            data.push(snow(day(year, 12, 25), year as f64));
            data.push(snow(day(year, 2, 28), year as f64 * 2.0));
        }
        let index = ObservationIndex::build(&data);
        let window = SeasonalWindow { half_window_days: 15, min_samples: 3 };

        // 2 January collects the previous Christmases, including 2023's.
        let b = compute_seasonal_baseline(&index, STATION, &Element::Snow, day(2024, 1, 2), &window)
            .expect("christmas values fall within 15 days of 2 January");
        assert_eq!(b.sample_size, 5);

        let leap = compute_seasonal_baseline(&index, STATION, &Element::Snow, day(2024, 2, 29), &window)
            .expect("29 February centres on 28 February in other years");
        assert_eq!(leap.sample_size, 5);
    }

    #[test]
    fn test_oversized_window_saturates_instead_of_overflowing() {
        let data: Vec<Observation> = (0..10)
            .map(|i| snow(day(2024, 1, 1) + Duration::days(i), i as f64))
            .collect();
        let index = ObservationIndex::build(&data);
        let b = compute_baseline(&index, STATION, &Element::Snow, day(2024, 1, 5), 1_000_000_000, 5)
            .expect("the window covers the whole history");
        assert_eq!(b.sample_size, 9);

        let wide = SeasonalWindow { half_window_days: i64::MAX, min_samples: 5 };
        let b = compute_seasonal_baseline(&index, STATION, &Element::Snow, day(2024, 1, 5), &wide)
            .expect("saturated seasonal window");
        assert_eq!(b.sample_size, 9);
    }

    #[test]
    fn test_overlapping_seasonal_windows_count_each_value_once() {
        let start = day(2021, 1, 1);
        let data: Vec<Observation> = (0..1095)
            .map(|i| snow(start + Duration::days(i), (i % 17) as f64))
            .collect();
        let index = ObservationIndex::build(&data);
        let wide = SeasonalWindow { half_window_days: 200, min_samples: 10 };
        let b = compute_seasonal_baseline(&index, STATION, &Element::Snow, day(2022, 7, 1), &wide)
            .expect("three years of data");
        assert_eq!(b.sample_size, 1094, "every value once, minus the target date");
    }
}
