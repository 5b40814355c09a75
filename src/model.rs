//! Core data types for the station anomaly analysis service.
//!
//! This module defines the shared domain model imported by all other modules:
//! weather elements and their unit conventions, raw observations with their
//! decoded flag triplets, baselines, anomalies, and the error taxonomy.
//! It contains no analysis logic and performs no I/O.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Elements
// ---------------------------------------------------------------------------

/// A GHCN-Daily weather element code.
///
/// Raw values arrive in the fixed GHCN encodings (tenths of °C, tenths of mm,
/// tenths of m/s, ...). `to_display_units` converts a raw value into the units
/// the classifier and the ensemble work in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Element {
    Tmax,
    Tmin,
    Tavg,
    Adpt,
    Prcp,
    Snow,
    Snwd,
    Wesd,
    Wesf,
    Dapr,
    Mdpr,
    Evap,
    Awnd,
    Wsfg,
    Wsf1,
    Wsf2,
    Wsf5,
    Wsfi,
    Wsfm,
    Aslp,
    Astp,
    Rhav,
    Rhmn,
    Rhmx,
    Psun,
    Tsun,
    /// Any element code not in the catalogue, kept verbatim.
    Other(String),
}

/// Element groupings used to tailor explanations and report labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementFamily {
    Temperature,
    Precipitation,
    Wind,
    Pressure,
    Humidity,
    Sunshine,
    Other,
}

impl ElementFamily {
    /// Label used in the `TYPE` field of anomaly records.
    pub fn label(&self) -> &'static str {
        match self {
            ElementFamily::Temperature => "Temperature",
            ElementFamily::Precipitation => "Precipitation",
            ElementFamily::Wind => "Wind",
            ElementFamily::Pressure => "Pressure",
            ElementFamily::Humidity => "Humidity",
            ElementFamily::Sunshine => "Sunshine",
            ElementFamily::Other => "Other",
        }
    }
}

impl Element {
    /// Parses a four-character element code. Unknown codes become `Other`.
    pub fn from_code(code: &str) -> Element {
        match code.trim().to_ascii_uppercase().as_str() {
            "TMAX" => Element::Tmax,
            "TMIN" => Element::Tmin,
            "TAVG" => Element::Tavg,
            "ADPT" => Element::Adpt,
            "PRCP" => Element::Prcp,
            "SNOW" => Element::Snow,
            "SNWD" => Element::Snwd,
            "WESD" => Element::Wesd,
            "WESF" => Element::Wesf,
            "DAPR" => Element::Dapr,
            "MDPR" => Element::Mdpr,
            "EVAP" => Element::Evap,
            "AWND" => Element::Awnd,
            "WSFG" => Element::Wsfg,
            "WSF1" => Element::Wsf1,
            "WSF2" => Element::Wsf2,
            "WSF5" => Element::Wsf5,
            "WSFI" => Element::Wsfi,
            "WSFM" => Element::Wsfm,
            "ASLP" => Element::Aslp,
            "ASTP" => Element::Astp,
            "RHAV" => Element::Rhav,
            "RHMN" => Element::Rhmn,
            "RHMX" => Element::Rhmx,
            "PSUN" => Element::Psun,
            "TSUN" => Element::Tsun,
            other => Element::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Element::Tmax => "TMAX",
            Element::Tmin => "TMIN",
            Element::Tavg => "TAVG",
            Element::Adpt => "ADPT",
            Element::Prcp => "PRCP",
            Element::Snow => "SNOW",
            Element::Snwd => "SNWD",
            Element::Wesd => "WESD",
            Element::Wesf => "WESF",
            Element::Dapr => "DAPR",
            Element::Mdpr => "MDPR",
            Element::Evap => "EVAP",
            Element::Awnd => "AWND",
            Element::Wsfg => "WSFG",
            Element::Wsf1 => "WSF1",
            Element::Wsf2 => "WSF2",
            Element::Wsf5 => "WSF5",
            Element::Wsfi => "WSFI",
            Element::Wsfm => "WSFM",
            Element::Aslp => "ASLP",
            Element::Astp => "ASTP",
            Element::Rhav => "RHAV",
            Element::Rhmn => "RHMN",
            Element::Rhmx => "RHMX",
            Element::Psun => "PSUN",
            Element::Tsun => "TSUN",
            Element::Other(code) => code.as_str(),
        }
    }

    /// Human-readable element name.
    pub fn name(&self) -> &str {
        match self {
            Element::Tmax => "Maximum Temperature",
            Element::Tmin => "Minimum Temperature",
            Element::Tavg => "Average Temperature",
            Element::Adpt => "Average Dew Point Temperature",
            Element::Prcp => "Precipitation",
            Element::Snow => "Snowfall",
            Element::Snwd => "Snow Depth",
            Element::Wesd => "Water Equivalent of Snow on Ground",
            Element::Wesf => "Water Equivalent of Snowfall",
            Element::Dapr => "Days of Precipitation",
            Element::Mdpr => "Multiday Precipitation Total",
            Element::Evap => "Evaporation",
            Element::Awnd => "Average Wind Speed",
            Element::Wsfg => "Peak Wind Gust",
            Element::Wsf1 => "Fastest 1-minute Wind Speed",
            Element::Wsf2 => "Fastest 2-minute Wind Speed",
            Element::Wsf5 => "Fastest 5-second Wind Speed",
            Element::Wsfi => "Highest Instantaneous Wind Speed",
            Element::Wsfm => "Fastest Mile Wind Speed",
            Element::Aslp => "Average Sea Level Pressure",
            Element::Astp => "Average Station Level Pressure",
            Element::Rhav => "Average Relative Humidity",
            Element::Rhmn => "Minimum Relative Humidity",
            Element::Rhmx => "Maximum Relative Humidity",
            Element::Psun => "Percent of Possible Sunshine",
            Element::Tsun => "Total Sunshine",
            Element::Other(code) => code.as_str(),
        }
    }

    /// Unit label of the value returned by `to_display_units`.
    pub fn unit(&self) -> &'static str {
        match self.family() {
            ElementFamily::Temperature => "°F",
            ElementFamily::Wind => " m/s",
            ElementFamily::Pressure => " hPa",
            ElementFamily::Humidity => "%",
            _ => match self {
                Element::Prcp => " inches",
                Element::Dapr => " days",
                Element::Psun => "%",
                Element::Tsun => " minutes",
                Element::Other(_) => " units",
                _ => " mm",
            },
        }
    }

    pub fn family(&self) -> ElementFamily {
        match self {
            Element::Tmax | Element::Tmin | Element::Tavg | Element::Adpt => {
                ElementFamily::Temperature
            }
            Element::Prcp
            | Element::Snow
            | Element::Snwd
            | Element::Wesd
            | Element::Wesf
            | Element::Dapr
            | Element::Mdpr
            | Element::Evap => ElementFamily::Precipitation,
            Element::Awnd
            | Element::Wsfg
            | Element::Wsf1
            | Element::Wsf2
            | Element::Wsf5
            | Element::Wsfi
            | Element::Wsfm => ElementFamily::Wind,
            Element::Aslp | Element::Astp => ElementFamily::Pressure,
            Element::Rhav | Element::Rhmn | Element::Rhmx => ElementFamily::Humidity,
            Element::Psun | Element::Tsun => ElementFamily::Sunshine,
            Element::Other(_) => ElementFamily::Other,
        }
    }

    /// Converts a raw GHCN value into display units.
    ///
    /// Temperatures: tenths of °C → °F. PRCP: tenths of mm → inches.
    /// Tenths-encoded water equivalents, evaporation, wind and pressure are
    /// divided by ten. Everything else is returned unchanged.
    pub fn to_display_units(&self, raw: f64) -> f64 {
        match self {
            Element::Tmax | Element::Tmin | Element::Tavg | Element::Adpt => {
                tenths_celsius_to_fahrenheit(raw)
            }
            Element::Prcp => tenths_mm_to_inches(raw),
            Element::Wesd | Element::Wesf | Element::Mdpr | Element::Evap => raw / 10.0,
            Element::Awnd
            | Element::Wsfg
            | Element::Wsf1
            | Element::Wsf2
            | Element::Wsf5
            | Element::Wsfi
            | Element::Wsfm => raw / 10.0,
            Element::Aslp | Element::Astp => raw / 10.0,
            _ => raw,
        }
    }

    /// Column name of the converted series, e.g. `TMAX_F` or `PRCP_IN`.
    pub fn variable_name(&self) -> String {
        match self.family() {
            ElementFamily::Temperature => format!("{}_F", self.code()),
            _ if *self == Element::Prcp => "PRCP_IN".to_string(),
            _ => self.code().to_string(),
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl From<String> for Element {
    fn from(code: String) -> Self {
        Element::from_code(&code)
    }
}

impl From<Element> for String {
    fn from(element: Element) -> Self {
        element.code().to_string()
    }
}

pub fn tenths_celsius_to_fahrenheit(raw: f64) -> f64 {
    raw / 10.0 * 9.0 / 5.0 + 32.0
}

pub fn tenths_mm_to_inches(raw: f64) -> f64 {
    raw / 10.0 / 25.4
}

// ---------------------------------------------------------------------------
// Observations and flags
// ---------------------------------------------------------------------------

/// The measurement / quality / source flags attached to one GHCN value.
///
/// `None` always means "no information", never a failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlagTriplet {
    pub measurement: Option<char>,
    pub quality: Option<char>,
    pub source: Option<char>,
}

/// A single daily value for one element at one station.
///
/// `raw_value` is in the GHCN encoding for the element. It is `None` when the
/// source marked the value missing but still carried flags for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub station_id: String,
    pub date: NaiveDate,
    pub element: Element,
    pub raw_value: Option<f64>,
    pub flags: FlagTriplet,
}

impl Observation {
    /// Raw value converted with `Element::to_display_units`.
    pub fn display_value(&self) -> Option<f64> {
        self.raw_value
            .filter(|v| v.is_finite())
            .map(|v| self.element.to_display_units(v))
    }
}

/// Flag-derived trust score in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualityScore(f64);

impl QualityScore {
    pub const MAX: QualityScore = QualityScore(100.0);

    /// Clamps into `[0, 100]`.
    pub fn new(value: f64) -> Self {
        QualityScore(value.clamp(0.0, 100.0))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Baselines and anomalies
// ---------------------------------------------------------------------------

/// Local descriptive statistics for one element around one date.
///
/// All values are in display units. Only constructed when enough valid
/// samples were found and the standard deviation is strictly positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub station_id: String,
    pub element: Element,
    pub target_date: NaiveDate,
    pub mean: f64,
    /// Sample standard deviation (n - 1 denominator).
    pub std: f64,
    pub sample_size: usize,
    pub min: f64,
    pub max: f64,
    pub p25: f64,
    pub p75: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    High,
    Low,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::High => write!(f, "High"),
            Direction::Low => write!(f, "Low"),
        }
    }
}

/// Severity tiers, in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Mild,
    Moderate,
    Extreme,
}

impl Severity {
    /// `|z| >= 3` is extreme, `|z| > 2` moderate, anything else mild.
    pub fn from_z_score(z: f64) -> Severity {
        let magnitude = z.abs();
        if magnitude >= 3.0 {
            Severity::Extreme
        } else if magnitude > 2.0 {
            Severity::Moderate
        } else {
            Severity::Mild
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Mild => write!(f, "mild"),
            Severity::Moderate => write!(f, "moderate"),
            Severity::Extreme => write!(f, "extreme"),
        }
    }
}

/// Trust information for the observation behind an anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityContext {
    pub quality_score: QualityScore,
    pub quality_flag: Option<char>,
    pub source_flag: Option<char>,
    pub has_quality_issue: bool,
    pub is_high_quality_source: bool,
}

/// Structured rationale for an anomaly. `Display` renders it as prose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    /// e.g. "This represents a moderate high temperature for maximum temperature."
    pub headline: String,
    /// Observed value against `mean ± std`.
    pub comparison: String,
    /// Standard-deviation band and how often such values occur.
    pub rarity: String,
    /// Bucketed normal-tail frequency, e.g. "about 2.3% of the time".
    pub frequency: String,
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.headline, self.comparison, self.rarity)
    }
}

/// An observation whose z-score exceeded the caller's confidence threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub station_id: String,
    pub element: Element,
    pub date: NaiveDate,
    pub observed_value: f64,
    pub z_score: f64,
    pub direction: Direction,
    pub severity: Severity,
    pub explanation: Explanation,
    pub baseline: Baseline,
    pub quality: Option<QualityContext>,
    /// QA audit score of the dataset the observation came from.
    pub qa_score: Option<f64>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Per-dataset failures that propagate to the caller.
///
/// Per-observation problems (no baseline, missing value, malformed flags)
/// never surface here; they only exclude the observation.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// No observations for the requested station / date range.
    #[error("No data available for station {station}: {detail}")]
    DataUnavailable { station: String, detail: String },
    /// Caller misuse or invalid configuration bundle.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The ensemble was applied before `train`.
    #[error("Models must be trained before detecting anomalies")]
    ModelNotTrained,
    /// A required feature column has no observed values at all.
    #[error("Required feature column {0} is entirely absent")]
    MissingFeature(String),
    /// A required feature column is constant across the training set.
    #[error("Feature column {0} is constant and cannot be standardized")]
    DegenerateFeature(String),
    #[error("Cannot train on an empty feature matrix")]
    EmptyTrainingSet,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_codes_round_trip() {
        for code in ["TMAX", "TMIN", "PRCP", "SNOW", "AWND", "TSUN"] {
            assert_eq!(Element::from_code(code).code(), code);
        }
        let unknown = Element::from_code("wt01");
        assert_eq!(unknown, Element::Other("WT01".to_string()));
        assert_eq!(unknown.family(), ElementFamily::Other);
    }

    #[test]
    fn test_temperature_conversion_to_fahrenheit() {
        // 21.1 °C == 69.98 °F
        let f = Element::Tmax.to_display_units(211.0);
        assert!((f - 69.98).abs() < 1e-9, "got {}", f);
        assert_eq!(Element::Tmin.to_display_units(0.0), 32.0);
    }

    #[test]
    fn test_precipitation_conversion_to_inches() {
        let inches = Element::Prcp.to_display_units(254.0);
        assert!((inches - 1.0).abs() < 1e-12, "25.4 mm should be 1 inch, got {}", inches);
        assert_eq!(Element::Prcp.variable_name(), "PRCP_IN");
        assert_eq!(Element::Tmax.variable_name(), "TMAX_F");
        assert_eq!(Element::Snow.variable_name(), "SNOW");
    }

    #[test]
    fn test_severity_tiers() {
        assert_eq!(Severity::from_z_score(1.5), Severity::Mild);
        assert_eq!(Severity::from_z_score(2.0), Severity::Mild);
        assert_eq!(Severity::from_z_score(2.5), Severity::Moderate);
        assert_eq!(Severity::from_z_score(-2.5), Severity::Moderate);
        assert_eq!(Severity::from_z_score(3.0), Severity::Extreme);
        assert_eq!(Severity::from_z_score(-4.2), Severity::Extreme);
        assert!(Severity::Mild < Severity::Moderate && Severity::Moderate < Severity::Extreme);
    }

    #[test]
    fn test_quality_score_is_clamped() {
        assert_eq!(QualityScore::new(-20.0).value(), 0.0);
        assert_eq!(QualityScore::new(140.0).value(), 100.0);
        assert_eq!(QualityScore::new(85.0).value(), 85.0);
    }

    #[test]
    fn test_element_serializes_as_code() {
        let json = serde_json::to_string(&Element::Prcp).unwrap();
        assert_eq!(json, "\"PRCP\"");
        let back: Element = serde_json::from_str("\"TMIN\"").unwrap();
        assert_eq!(back, Element::Tmin);
    }
}
