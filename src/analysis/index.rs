//! Windowed access to observation series.
//!
//! The index is built once per dataset load. Each (station, element) key maps
//! to a date-sorted array of display-unit values, so a baseline window is two
//! binary searches instead of a scan over the whole table.

use crate::model::{Element, Observation};
use chrono::NaiveDate;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct ObservationIndex {
    series: HashMap<(String, Element), Vec<(NaiveDate, f64)>>,
}

impl ObservationIndex {
    /// Indexes every observation with a finite value.
    ///
    /// Duplicate dates keep the first value encountered.
    pub fn build<'a, I>(observations: I) -> Self
    where
        I: IntoIterator<Item = &'a Observation>,
    {
        let mut series: HashMap<(String, Element), Vec<(NaiveDate, f64)>> = HashMap::new();
        for obs in observations {
            if let Some(value) = obs.display_value() {
                series
                    .entry((obs.station_id.clone(), obs.element.clone()))
                    .or_default()
                    .push((obs.date, value));
            }
        }
        for values in series.values_mut() {
            values.sort_by_key(|(date, _)| *date);
            values.dedup_by_key(|(date, _)| *date);
        }
        ObservationIndex { series }
    }

    /// The full date-sorted series, empty when the key is unknown.
    pub fn series(&self, station_id: &str, element: &Element) -> &[(NaiveDate, f64)] {
        self.series
            .get(&(station_id.to_string(), element.clone()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Values dated within `[start, end]`.
    pub fn window(
        &self,
        station_id: &str,
        element: &Element,
        start: NaiveDate,
        end: NaiveDate,
    ) -> &[(NaiveDate, f64)] {
        let series = self.series(station_id, element);
        let lo = series.partition_point(|(d, _)| *d < start);
        let hi = series.partition_point(|(d, _)| *d <= end);
        if lo >= hi { &[] } else { &series[lo..hi] }
    }

    pub fn value_on(&self, station_id: &str, element: &Element, date: NaiveDate) -> Option<f64> {
        let series = self.series(station_id, element);
        series
            .binary_search_by_key(&date, |(d, _)| *d)
            .ok()
            .map(|i| series[i].1)
    }

    /// Elements indexed for a station, in catalogue order.
    pub fn elements(&self, station_id: &str) -> Vec<Element> {
        let mut elements: Vec<Element> = self
            .series
            .keys()
            .filter(|(s, _)| s == station_id)
            .map(|(_, e)| e.clone())
            .collect();
        elements.sort();
        elements
    }

    /// Total number of indexed values.
    pub fn len(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}
