//! GHCN-Daily flag decoding.
//!
//! Each daily value carries three one-character flags:
//! - measurement flag (MFLAG): how the value was obtained,
//! - quality flag (QFLAG): which quality assurance check it failed, if any,
//! - source flag (SFLAG): which collection the value came from.
//!
//! The decoder turns a raw attribute string (`"T,,S"`) into a `FlagTriplet`
//! and derives a deterministic 0-100 trust score from it. Decoding never
//! fails: anything unparsable degrades to an empty triplet.

use crate::logging::{self, Component};
use crate::model::{Element, FlagTriplet, Observation, QualityContext, QualityScore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_DELIMITER: char = ',';

// ---------------------------------------------------------------------------
// Flag tables
// ---------------------------------------------------------------------------

const MEASUREMENT_FLAGS: &[(char, &str)] = &[
    ('B', "Precipitation total formed from two 12-hour totals"),
    ('D', "Precipitation total formed from four six-hour totals"),
    (
        'H',
        "Represents highest or lowest hourly temperature (TMAX or TMIN) or the average of hourly values (TAVG)",
    ),
    ('K', "Converted from knots"),
    ('L', "Temperature appears to be lagged with respect to reported hour of observation"),
    ('O', "Converted from oktas"),
    ('P', "Identified as \"missing presumed zero\" in DSI 3200 and 3206"),
    ('T', "Trace of precipitation, snowfall, or snow depth"),
    ('W', "Converted from 16-point WBAN code (for wind direction)"),
];

const QUALITY_FLAGS: &[(char, &str)] = &[
    ('D', "Failed duplicate check"),
    ('G', "Failed gap check"),
    ('I', "Failed internal consistency check"),
    ('K', "Failed streak/frequent-value check"),
    ('L', "Failed check on length of multiday period"),
    ('M', "Failed megaconsistency check"),
    ('N', "Failed naught check"),
    ('O', "Failed climatological outlier check"),
    ('R', "Failed lagged range check"),
    ('S', "Failed spatial consistency check"),
    ('T', "Failed temporal consistency check"),
    ('W', "Temperature too warm for snow"),
    ('X', "Failed bounds check"),
    ('Z', "Flagged as a result of an official Datzilla investigation"),
];

const SOURCE_FLAGS: &[(char, &str)] = &[
    ('0', "U.S. Cooperative Summary of the Day (NCDC DSI-3200)"),
    ('6', "CDMP Cooperative Summary of the Day (NCDC DSI-3206)"),
    ('7', "U.S. Cooperative Summary of the Day -- Transmitted via WxCoder3 (NCDC DSI-3207)"),
    ('A', "U.S. Automated Surface Observing System (ASOS) real-time data (since January 1, 2006)"),
    ('a', "Australian data from the Australian Bureau of Meteorology"),
    ('B', "U.S. ASOS data for October 2000-December 2005 (NCDC DSI-3211)"),
    ('b', "Belarus update"),
    ('C', "Environment Canada"),
    (
        'D',
        "Short time delay US National Weather Service CF6 daily summaries provided by the High Plains Regional Climate Center",
    ),
    (
        'd',
        "Short time delay US National Weather Service Daily Summary Message (DSMs) provided by the High Plains Regional Climate Center",
    ),
    ('E', "European Climate Assessment and Dataset (Klein Tank et al., 2002)"),
    ('F', "U.S. Fort data"),
    ('G', "Official Global Climate Observing System (GCOS) or other government-supplied data"),
    ('H', "High Plains Regional Climate Center real-time data"),
    ('I', "International collection (non U.S. data received through personal contacts)"),
    (
        'K',
        "U.S. Cooperative Summary of the Day data digitized from paper observer forms (from 2011 to present)",
    ),
    ('M', "Monthly METAR Extract (additional ASOS data)"),
    ('f', "Data provided courtesy of the Fiji Met Service"),
    ('m', "Data from the Mexican National Water Commission (Comision National del Agua -- CONAGUA)"),
    ('N', "Community Collaborative Rain, Hail, and Snow (CoCoRaHS)"),
    ('Q', "Data from several African countries that had been \"quarantined\""),
    (
        'R',
        "NCEI Reference Network Database (Climate Reference Network and Regional Climate Reference Network)",
    ),
    ('r', "All-Russian Research Institute of Hydrometeorological Information-World Data Center"),
    ('S', "Global Summary of the Day (NCDC DSI-9618); use with caution for precipitation"),
    ('s', "China Meteorological Administration/National Meteorological Information Center/Climatic Data Center"),
    ('T', "SNOwpack TELemtry (SNOTEL) data obtained from the USDA Natural Resources Conservation Service"),
    ('U', "Remote Automatic Weather Station (RAWS) data obtained from the Western Regional Climate Center"),
    ('u', "Ukraine update"),
    ('W', "WBAN/ASOS Summary of the Day from NCDC's Integrated Surface Data (ISD)"),
    ('X', "U.S. First-Order Summary of the Day (NCDC DSI-3210)"),
    ('Z', "Datzilla official additions or replacements"),
    ('z', "Uzbekistan update"),
];

/// Source flags ordered from most to least authoritative.
const SOURCE_PRIORITY: &[char] = &[
    'Z', 'R', 'D', '0', '6', 'C', 'X', 'W', 'K', '7', 'F', 'B', 'M', 'f', 'm', 'r', 'E', 'z', 'u',
    'b', 's', 'a', 'G', 'Q', 'I', 'A', 'N', 'T', 'U', 'H', 'S',
];

const HIGH_QUALITY_SOURCES: &[char] = &['R', 'D', '0', '6', 'C', 'X', 'W', 'K', '7', 'F', 'B', 'M'];

const MINOR_QUALITY_FLAGS: &[char] = &['D', 'G', 'I', 'K', 'L'];
const MODERATE_QUALITY_FLAGS: &[char] = &['M', 'N', 'O', 'R', 'S', 'T'];
const MAJOR_QUALITY_FLAGS: &[char] = &['W', 'X', 'Z'];

const MINOR_DEDUCTION: f64 = 10.0;
const MODERATE_DEDUCTION: f64 = 25.0;
const MAJOR_DEDUCTION: f64 = 50.0;
const NON_PRIORITY_SOURCE_DEDUCTION: f64 = 15.0;
const TRACE_DEDUCTION: f64 = 5.0;
const PRESUMED_ZERO_DEDUCTION: f64 = 20.0;

/// Which of the three flag tables to consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlagKind {
    Measurement,
    Quality,
    Source,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parses a comma-delimited attribute string.
pub fn parse(raw: &str) -> FlagTriplet {
    parse_with_delimiter(raw, DEFAULT_DELIMITER)
}

/// Parses `m<d>q<d>s`. Input without the delimiter is taken as a bare source
/// flag; a numeric string such as `"6"` or `"6.0"` is normalised to its
/// integer form first. Fields longer than one character are dropped.
pub fn parse_with_delimiter(raw: &str, delimiter: char) -> FlagTriplet {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return FlagTriplet::default();
    }

    if !trimmed.contains(delimiter) {
        return FlagTriplet {
            measurement: None,
            quality: None,
            source: bare_source_flag(trimmed),
        };
    }

    let mut parts = trimmed.split(delimiter);
    let measurement = parts.next().and_then(single_char);
    let quality = parts.next().and_then(single_char);
    let source = parts.next().and_then(single_char);
    FlagTriplet {
        measurement,
        quality,
        source,
    }
}

fn bare_source_flag(text: &str) -> Option<char> {
    if let Ok(number) = text.parse::<f64>() {
        if number.is_finite() && number.fract() == 0.0 {
            return single_char(&format!("{}", number as i64));
        }
    }
    single_char(text)
}

fn single_char(field: &str) -> Option<char> {
    let field = field.trim();
    let mut chars = field.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        (None, _) => None,
        (Some(_), Some(_)) => {
            logging::debug(
                Component::Flags,
                None,
                &format!("Ignoring malformed flag field {:?}", field),
            );
            None
        }
    }
}

/// Rebuilds the delimiter-joined attribute string for a triplet.
pub fn to_attribute_string(flags: &FlagTriplet, delimiter: char) -> String {
    let field = |c: Option<char>| c.map(String::from).unwrap_or_default();
    format!(
        "{}{d}{}{d}{}",
        field(flags.measurement),
        field(flags.quality),
        field(flags.source),
        d = delimiter
    )
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

fn lookup(table: &'static [(char, &'static str)], flag: char) -> Option<&'static str> {
    table.iter().find(|(c, _)| *c == flag).map(|(_, d)| *d)
}

/// Describes a flag. Unknown values get a generic message, never an error.
pub fn describe(kind: FlagKind, flag: Option<char>) -> String {
    match (kind, flag) {
        (FlagKind::Measurement, None) => "No measurement information applicable".to_string(),
        (FlagKind::Quality, None) => "Did not fail any quality assurance check".to_string(),
        (FlagKind::Source, None) => "No source (i.e., data value missing)".to_string(),
        (FlagKind::Measurement, Some(c)) => lookup(MEASUREMENT_FLAGS, c)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Unknown measurement flag: {}", c)),
        (FlagKind::Quality, Some(c)) => lookup(QUALITY_FLAGS, c)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Unknown quality flag: {}", c)),
        (FlagKind::Source, Some(c)) => lookup(SOURCE_FLAGS, c)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Unknown source flag: {}", c)),
    }
}

/// True iff the quality flag is present and listed in the QFLAG table.
pub fn is_quality_issue(quality_flag: Option<char>) -> bool {
    quality_flag.is_some_and(|c| lookup(QUALITY_FLAGS, c).is_some())
}

pub fn is_high_quality_source(source_flag: Option<char>) -> bool {
    source_flag.is_some_and(|c| HIGH_QUALITY_SOURCES.contains(&c))
}

/// Position in the source priority ordering (0 = most authoritative).
/// Unknown or empty sources rank last.
pub fn source_priority_rank(source_flag: Option<char>) -> usize {
    source_flag
        .and_then(|c| SOURCE_PRIORITY.iter().position(|p| *p == c))
        .unwrap_or(SOURCE_PRIORITY.len())
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Deterministic 0-100 trust score.
///
/// Starts at 100 and deducts by quality-flag tier (minor 10, moderate 25,
/// major 50), 15 for a source outside the high-quality list, and 5 / 20 for
/// trace / presumed-zero measurement flags.
pub fn quality_score(flags: &FlagTriplet) -> QualityScore {
    let mut score = QualityScore::MAX.value();

    if let Some(q) = flags.quality.filter(|q| is_quality_issue(Some(*q))) {
        if MINOR_QUALITY_FLAGS.contains(&q) {
            score -= MINOR_DEDUCTION;
        } else if MODERATE_QUALITY_FLAGS.contains(&q) {
            score -= MODERATE_DEDUCTION;
        } else if MAJOR_QUALITY_FLAGS.contains(&q) {
            score -= MAJOR_DEDUCTION;
        }
    }

    if !is_high_quality_source(flags.source) {
        score -= NON_PRIORITY_SOURCE_DEDUCTION;
    }

    match flags.measurement {
        Some('T') => score -= TRACE_DEDUCTION,
        Some('P') => score -= PRESUMED_ZERO_DEDUCTION,
        _ => {}
    }

    QualityScore::new(score)
}

/// Score plus trust flags, as attached to anomalies.
pub fn quality_context(flags: &FlagTriplet) -> QualityContext {
    QualityContext {
        quality_score: quality_score(flags),
        quality_flag: flags.quality,
        source_flag: flags.source,
        has_quality_issue: is_quality_issue(flags.quality),
        is_high_quality_source: is_high_quality_source(flags.source),
    }
}

// ---------------------------------------------------------------------------
// Dataset summaries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssueCount {
    pub count: usize,
    pub description: String,
}

/// Flag quality overview for one element across a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagQualitySummary {
    pub element: Element,
    pub total_records: usize,
    pub quality_issues: usize,
    pub quality_issue_rate: f64,
    pub average_quality_score: f64,
    pub quality_issue_breakdown: BTreeMap<char, QualityIssueCount>,
}

/// Returns `None` when the dataset holds no observations of `element`.
pub fn quality_summary(observations: &[Observation], element: &Element) -> Option<FlagQualitySummary> {
    let matching: Vec<&Observation> = observations
        .iter()
        .filter(|o| &o.element == element)
        .collect();
    if matching.is_empty() {
        return None;
    }

    let mut breakdown: BTreeMap<char, QualityIssueCount> = BTreeMap::new();
    let mut score_total = 0.0;
    let mut issues = 0;
    for obs in &matching {
        score_total += quality_score(&obs.flags).value();
        if let Some(q) = obs.flags.quality.filter(|q| is_quality_issue(Some(*q))) {
            issues += 1;
            breakdown
                .entry(q)
                .or_insert_with(|| QualityIssueCount {
                    count: 0,
                    description: describe(FlagKind::Quality, Some(q)),
                })
                .count += 1;
        }
    }

    let total = matching.len();
    Some(FlagQualitySummary {
        element: element.clone(),
        total_records: total,
        quality_issues: issues,
        quality_issue_rate: issues as f64 / total as f64,
        average_quality_score: score_total / total as f64,
        quality_issue_breakdown: breakdown,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
