//! GHCN-Daily `.dly` station file parser
//!
//! Each line holds one station / year / month / element with 31 day slots:
//!
//! ```text
//! ID          1-11   Character
//! YEAR       12-15   Integer
//! MONTH      16-17   Integer
//! ELEMENT    18-21   Character
//! VALUE1     22-26   Integer   (-9999 = missing)
//! MFLAG1     27-27   Character
//! QFLAG1     28-28   Character
//! SFLAG1     29-29   Character
//! VALUE2     30-34   ...
//! ```
//!
//! Reference: https://www.ncei.noaa.gov/pub/data/ghcn/daily/readme.txt

use crate::flags;
use crate::logging::{self, Component};
use crate::model::{Element, Observation};
use chrono::NaiveDate;
use std::path::Path;

const MISSING_VALUE: i64 = -9999;
const DAY_SLOTS: usize = 31;
const HEADER_WIDTH: usize = 21;
const SLOT_WIDTH: usize = 8;

// ============================================================================
// Line Parsing
// ============================================================================

/// Parse one `.dly` line into its observations.
///
/// Missing values and calendar-invalid day slots (e.g. February 30) are
/// skipped. Returns `None` when the header is unreadable.
pub fn parse_dly_line(line: &str) -> Option<Vec<Observation>> {
    if line.len() < HEADER_WIDTH || !line.is_ascii() {
        return None;
    }
    let station_id = line[0..11].trim();
    let year: i32 = line[11..15].trim().parse().ok()?;
    let month: u32 = line[15..17].trim().parse().ok()?;
    let element = Element::from_code(&line[17..21]);
    if station_id.is_empty() || !(1..=12).contains(&month) {
        return None;
    }

    let mut observations = Vec::new();
    for day in 0..DAY_SLOTS {
        let start = HEADER_WIDTH + day * SLOT_WIDTH;
        let Some(slot) = line.get(start..start + SLOT_WIDTH) else {
            break;
        };
        let Some(date) = NaiveDate::from_ymd_opt(year, month, day as u32 + 1) else {
            continue;
        };
        let Ok(value) = slot[0..5].trim().parse::<i64>() else {
            continue;
        };
        if value == MISSING_VALUE {
            continue;
        }

        let flag = |c: &str| if c.trim().is_empty() { String::new() } else { c.to_string() };
        let attributes = format!("{},{},{}", flag(&slot[5..6]), flag(&slot[6..7]), flag(&slot[7..8]));

        observations.push(Observation {
            station_id: station_id.to_string(),
            date,
            element: element.clone(),
            raw_value: Some(value as f64),
            flags: flags::parse(&attributes),
        });
    }
    Some(observations)
}

/// Parse a whole `.dly` file body. Unreadable lines are skipped and counted.
pub fn parse_dly(text: &str) -> Vec<Observation> {
    let mut observations = Vec::new();
    let mut skipped = 0;

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_dly_line(line) {
            Some(parsed) => observations.extend(parsed),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        logging::warn(
            Component::Ingest,
            observations.first().map(|o| o.station_id.as_str()),
            &format!("Skipped {} unreadable .dly lines", skipped),
        );
    }
    observations
}

/// Read a `.dly` file from disk.
pub fn read_dly_file(path: impl AsRef<Path>) -> Result<Vec<Observation>, crate::model::AnalysisError> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let observations = parse_dly(&text);
    logging::info(
        Component::Ingest,
        observations.first().map(|o| o.station_id.as_str()),
        &format!("Read {} observations from {}", observations.len(), path.as_ref().display()),
    );
    Ok(observations)
}

// ============================================================================
// Tests
// ============================================================================
