//! Wide observation table loader.
//!
//! The CSV export carries one row per station and date:
//!
//! ```text
//! STATION,DATE,LATITUDE,LONGITUDE,ELEVATION,NAME,PRCP,PRCP_ATTRIBUTES,TMAX,TMAX_ATTRIBUTES,...
//! USW00014842,2024-07-01,40.6675,-89.6839,199.0,"PEORIA, IL US",0,",,W",311,",,W"
//! ```
//!
//! Every column that is not station metadata or an `_ATTRIBUTES` companion is
//! an element column in raw GHCN units.

use crate::flags;
use crate::logging::{self, Component};
use crate::model::{AnalysisError, Element, Observation};
use crate::stations::StationMetadata;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

const METADATA_COLUMNS: &[&str] = &["STATION", "DATE", "LATITUDE", "LONGITUDE", "ELEVATION", "NAME"];
const ATTRIBUTES_SUFFIX: &str = "_ATTRIBUTES";
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m-%d-%Y", "%Y%m%d"];

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// All observations for one station, plus the metadata the QA format check
/// inspects. Metadata fields are `None` when the column was absent or blank on
/// every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationDataset {
    pub station_id: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub name: Option<String>,
    pub observations: Vec<Observation>,
    /// Rows dropped because their DATE did not parse.
    pub unparsed_dates: usize,
}

impl StationDataset {
    /// Wraps already-parsed observations (e.g. from a `.dly` file).
    pub fn from_observations(observations: Vec<Observation>, metadata: Option<&StationMetadata>) -> Self {
        let station_id = metadata
            .map(|m| m.station_id.clone())
            .or_else(|| observations.first().map(|o| o.station_id.clone()))
            .filter(|id| !id.is_empty());
        StationDataset {
            station_id,
            latitude: metadata.map(|m| m.latitude),
            longitude: metadata.map(|m| m.longitude),
            name: metadata.map(|m| m.name.clone()).filter(|n| !n.is_empty()),
            observations,
            unparsed_dates: 0,
        }
    }

    /// Station identifier, or an empty string when unknown.
    pub fn station_label(&self) -> &str {
        self.station_id.as_deref().unwrap_or("")
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Distinct elements present, in catalogue order.
    pub fn elements(&self) -> Vec<Element> {
        let mut elements: Vec<Element> = self.observations.iter().map(|o| o.element.clone()).collect();
        elements.sort();
        elements.dedup();
        elements
    }

    /// Raw values for `element`, date-sorted. The first value seen for a
    /// date wins.
    pub fn raw_series(&self, element: &Element) -> Vec<(NaiveDate, f64)> {
        let mut series: Vec<(NaiveDate, f64)> = self
            .observations
            .iter()
            .filter(|o| &o.element == element)
            .filter_map(|o| o.raw_value.filter(|v| v.is_finite()).map(|v| (o.date, v)))
            .collect();
        series.sort_by_key(|(date, _)| *date);
        series.dedup_by_key(|(date, _)| *date);
        series
    }

    /// Like `raw_series`, converted to display units.
    pub fn display_series(&self, element: &Element) -> Vec<(NaiveDate, f64)> {
        self.raw_series(element)
            .into_iter()
            .map(|(date, v)| (date, element.to_display_units(v)))
            .collect()
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.observations.iter().map(|o| o.date).min()?;
        let last = self.observations.iter().map(|o| o.date).max()?;
        Some((first, last))
    }

    /// Observations dated within `[start, end]`.
    pub fn observations_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<&Observation> {
        self.observations
            .iter()
            .filter(|o| o.date >= start && o.date <= end)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// CSV parsing
// ---------------------------------------------------------------------------

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

fn non_empty(field: Option<&str>) -> Option<&str> {
    field.map(str::trim).filter(|s| !s.is_empty())
}

/// Reads a wide observation table, one `StationDataset` per distinct
/// STATION value in first-seen order.
pub fn read_table<R: Read>(reader: R) -> Result<Vec<StationDataset>, AnalysisError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let position = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));

    let station_col = position("STATION");
    let date_col = position("DATE");
    let lat_col = position("LATITUDE");
    let lon_col = position("LONGITUDE");
    let name_col = position("NAME");

    // (column index, element, attributes column index)
    let element_columns: Vec<(usize, Element, Option<usize>)> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| {
            let upper = h.to_ascii_uppercase();
            !upper.is_empty()
                && !upper.ends_with(ATTRIBUTES_SUFFIX)
                && !METADATA_COLUMNS.contains(&upper.as_str())
        })
        .map(|(i, h)| (i, Element::from_code(h), position(&format!("{}{}", h, ATTRIBUTES_SUFFIX))))
        .collect();

    let mut datasets: Vec<StationDataset> = Vec::new();
    let mut by_station: HashMap<Option<String>, usize> = HashMap::new();

    for record in csv_reader.records() {
        let record = record?;
        let station = non_empty(station_col.and_then(|i| record.get(i))).map(str::to_string);
        let slot = *by_station.entry(station.clone()).or_insert_with(|| {
            datasets.push(StationDataset {
                station_id: station.clone(),
                ..StationDataset::default()
            });
            datasets.len() - 1
        });
        let dataset = &mut datasets[slot];

        if dataset.latitude.is_none() {
            dataset.latitude = non_empty(lat_col.and_then(|i| record.get(i))).and_then(|s| s.parse().ok());
        }
        if dataset.longitude.is_none() {
            dataset.longitude = non_empty(lon_col.and_then(|i| record.get(i))).and_then(|s| s.parse().ok());
        }
        if dataset.name.is_none() {
            dataset.name = non_empty(name_col.and_then(|i| record.get(i))).map(str::to_string);
        }

        let Some(date) = date_col.and_then(|i| record.get(i)).and_then(parse_date) else {
            dataset.unparsed_dates += 1;
            continue;
        };

        for (col, element, attr_col) in &element_columns {
            let raw_value = non_empty(record.get(*col)).and_then(|s| s.parse::<f64>().ok());
            let attributes = non_empty(attr_col.and_then(|i| record.get(i)));
            if raw_value.is_none() && attributes.is_none() {
                continue;
            }
            dataset.observations.push(Observation {
                station_id: station.clone().unwrap_or_default(),
                date,
                element: element.clone(),
                raw_value,
                flags: attributes.map(flags::parse).unwrap_or_default(),
            });
        }
    }

    for dataset in &datasets {
        if dataset.unparsed_dates > 0 {
            logging::warn(
                Component::Ingest,
                dataset.station_id.as_deref(),
                &format!("{} rows with unparsable dates", dataset.unparsed_dates),
            );
        }
    }
    Ok(datasets)
}

/// Reads a table file from disk.
pub fn read_table_file(path: impl AsRef<Path>) -> Result<Vec<StationDataset>, AnalysisError> {
    let file = std::fs::File::open(path.as_ref())?;
    let datasets = read_table(file)?;
    logging::info(
        Component::Ingest,
        None,
        &format!("Read {} station(s) from {}", datasets.len(), path.as_ref().display()),
    );
    Ok(datasets)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FlagTriplet;

    const TABLE: &str = "\
STATION,DATE,LATITUDE,LONGITUDE,NAME,PRCP,PRCP_ATTRIBUTES,TMAX,TMAX_ATTRIBUTES
USW00014842,2024-07-01,40.6675,-89.6839,\"PEORIA, IL US\",0,\",,W\",311,\",,W\"
USW00014842,2024-07-02,40.6675,-89.6839,\"PEORIA, IL US\",,\"T,,W\",289,\",O,W\"
USW00014842,07/03/2024,40.6675,-89.6839,\"PEORIA, IL US\",5,\",,W\",300,\",,W\"
USC00116610,07-01-2024,40.70,-89.60,PEORIA NWS,12,\",,7\",,
";

    #[test]
    fn test_read_table_groups_by_station() {
        let datasets = read_table(TABLE.as_bytes()).expect("table should parse");
        assert_eq!(datasets.len(), 2);

        let peoria = &datasets[0];
        assert_eq!(peoria.station_label(), "USW00014842");
        assert_eq!(peoria.name.as_deref(), Some("PEORIA, IL US"));
        assert_eq!(peoria.coordinates(), Some((40.6675, -89.6839)));
        assert_eq!(peoria.unparsed_dates, 1, "07/03/2024 is not an accepted format");
        assert_eq!(peoria.elements(), vec![Element::Tmax, Element::Prcp]);

        let other = &datasets[1];
        assert_eq!(other.observations.len(), 1, "empty TMAX with no attributes is not an observation");
        assert_eq!(other.observations[0].date, NaiveDate::from_ymd_opt(2024, 7, 1).unwrap());
    }

    #[test]
    fn test_flags_and_missing_values_are_kept() {
        let datasets = read_table(TABLE.as_bytes()).expect("table should parse");
        let trace = datasets[0]
            .observations
            .iter()
            .find(|o| o.element == Element::Prcp && o.raw_value.is_none())
            .expect("flag-only PRCP row should be kept");
        assert_eq!(trace.flags.measurement, Some('T'));

        let tmax = datasets[0].raw_series(&Element::Tmax);
        assert_eq!(tmax.len(), 2);
        assert_eq!(tmax[1].1, 289.0);
        let flagged = datasets[0]
            .observations
            .iter()
            .find(|o| o.element == Element::Tmax && o.raw_value == Some(289.0))
            .unwrap();
        assert_eq!(flagged.flags, FlagTriplet { measurement: None, quality: Some('O'), source: Some('W') });
    }

    #[test]
    fn test_missing_metadata_columns_are_none() {
        let datasets = read_table("DATE,TMAX\n2024-01-01,10\n".as_bytes()).expect("table should parse");
        assert_eq!(datasets.len(), 1);
        assert_eq!(datasets[0].station_id, None);
        assert_eq!(datasets[0].name, None);
        assert_eq!(datasets[0].coordinates(), None);
    }

    #[test]
    fn test_display_series_converts_units() {
        let datasets = read_table(TABLE.as_bytes()).expect("table should parse");
        let series = datasets[0].display_series(&Element::Tmax);
        assert!((series[0].1 - 87.98).abs() < 1e-9, "31.1 °C is 87.98 °F, got {}", series[0].1);
    }
}
