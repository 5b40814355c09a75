//! Station metadata and neighbor selection.
//!
//! Stations come from the GHCN-Daily `ghcnd-stations.txt` inventory, a
//! fixed-width text file with one station per line. The QA neighbor check
//! needs the stations within a fixed great-circle radius of the target, which
//! `neighbors_within` provides.

use crate::logging::{self, Component};
use serde::{Deserialize, Serialize};

/// Mean Earth radius used for great-circle distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Elevation sentinel for "unknown" in the station inventory.
const MISSING_ELEVATION: f64 = -999.9;

// ---------------------------------------------------------------------------
// Station metadata
// ---------------------------------------------------------------------------

/// Metadata for a single GHCN-Daily station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationMetadata {
    /// 11-character GHCN identifier, e.g. `USW00014842`.
    pub station_id: String,
    /// WGS84 latitude.
    pub latitude: f64,
    /// WGS84 longitude.
    pub longitude: f64,
    /// Metres above sea level. `None` when the inventory reports -999.9.
    pub elevation_m: Option<f64>,
    /// U.S. postal code or Canadian province; blank elsewhere.
    pub state: Option<String>,
    pub name: String,
}

impl StationMetadata {
    /// Two-letter FIPS country prefix of the identifier.
    pub fn country_code(&self) -> &str {
        self.station_id.get(0..2).unwrap_or("")
    }

    pub fn distance_km(&self, other: &StationMetadata) -> f64 {
        haversine_km(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

// ---------------------------------------------------------------------------
// Inventory parsing
// ---------------------------------------------------------------------------

fn column(line: &str, start: usize, end: usize) -> &str {
    let end = end.min(line.len());
    if start >= end {
        return "";
    }
    line.get(start..end).unwrap_or("").trim()
}

/// Parses one `ghcnd-stations.txt` line.
///
/// Columns (1-based): ID 1-11, LATITUDE 13-20, LONGITUDE 22-30,
/// ELEVATION 32-37, STATE 39-40, NAME 42-71. Returns `None` when the id or
/// coordinates are missing or unparsable.
pub fn parse_station_line(line: &str) -> Option<StationMetadata> {
    let station_id = column(line, 0, 11);
    if station_id.is_empty() {
        return None;
    }
    let latitude: f64 = column(line, 12, 20).parse().ok()?;
    let longitude: f64 = column(line, 21, 30).parse().ok()?;
    let elevation_m = column(line, 31, 37)
        .parse::<f64>()
        .ok()
        .filter(|e| (*e - MISSING_ELEVATION).abs() > 1e-6);
    let state = Some(column(line, 38, 40))
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let name = column(line, 41, 71).to_string();

    Some(StationMetadata {
        station_id: station_id.to_string(),
        latitude,
        longitude,
        elevation_m,
        state,
        name,
    })
}

/// Parses a whole inventory, skipping blank and malformed lines.
pub fn parse_station_list(text: &str) -> Vec<StationMetadata> {
    let mut stations = Vec::new();
    let mut skipped = 0;
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_station_line(line) {
            Some(station) => stations.push(station),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        logging::warn(
            Component::Ingest,
            None,
            &format!("Skipped {} malformed station inventory lines", skipped),
        );
    }
    stations
}

// ---------------------------------------------------------------------------
// Lookup and distance
// ---------------------------------------------------------------------------

/// Looks up a station by identifier. Returns `None` if not found.
pub fn find_station<'a>(stations: &'a [StationMetadata], station_id: &str) -> Option<&'a StationMetadata> {
    stations.iter().find(|s| s.station_id == station_id)
}

/// Great-circle distance in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
}

/// Candidates within `radius_km` of `target`, nearest first.
///
/// The target itself (same identifier) is never its own neighbor.
pub fn neighbors_within<'a>(
    target: &StationMetadata,
    candidates: &'a [StationMetadata],
    radius_km: f64,
) -> Vec<(&'a StationMetadata, f64)> {
    let mut nearby: Vec<(&StationMetadata, f64)> = candidates
        .iter()
        .filter(|c| c.station_id != target.station_id)
        .map(|c| (c, target.distance_km(c)))
        .filter(|(_, d)| *d < radius_km)
        .collect();
    nearby.sort_by(|a, b| a.1.total_cmp(&b.1));
    nearby
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn inventory_line(id: &str, lat: f64, lon: f64, elev: f64, state: &str, name: &str) -> String {
        format!(
            "{:<11} {:>8.4} {:>9.4} {:>6.1} {:<2} {:<30}",
            id, lat, lon, elev, state, name
        )
    }

    fn station(id: &str, lat: f64, lon: f64) -> StationMetadata {
        StationMetadata {
            station_id: id.to_string(),
            latitude: lat,
            longitude: lon,
            elevation_m: None,
            state: None,
            name: id.to_string(),
        }
    }

    #[test]
    fn test_parse_inventory_line() {
        let line = inventory_line("USW00014842", 40.6675, -89.6839, 199.0, "IL", "PEORIA GTR PEORIA AP");
        let parsed = parse_station_line(&line).expect("well-formed line should parse");
        assert_eq!(parsed.station_id, "USW00014842");
        assert!((parsed.latitude - 40.6675).abs() < 1e-9);
        assert!((parsed.longitude + 89.6839).abs() < 1e-9);
        assert_eq!(parsed.elevation_m, Some(199.0));
        assert_eq!(parsed.state.as_deref(), Some("IL"));
        assert_eq!(parsed.name, "PEORIA GTR PEORIA AP");
        assert_eq!(parsed.country_code(), "US");
    }

    #[test]
    fn test_missing_elevation_and_state() {
        let line = inventory_line("ASN00008051", -28.7953, 114.6975, -999.9, "", "GERALDTON AIRPORT");
        let parsed = parse_station_line(&line).expect("line should parse");
        assert_eq!(parsed.elevation_m, None, "-999.9 means unknown elevation");
        assert_eq!(parsed.state, None);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let good = inventory_line("USC00116610", 40.7, -89.6, 150.0, "IL", "PEORIA");
        let text = format!("{}\nnot a station line\n\n", good);
        let stations = parse_station_list(&text);
        assert_eq!(stations.len(), 1);
        assert!(find_station(&stations, "USC00116610").is_some());
        assert!(find_station(&stations, "USC00000000").is_none());
    }

    #[test]
    fn test_haversine_known_distance() {
        // One degree of latitude is about 111.2 km.
        let d = haversine_km(40.0, -89.0, 41.0, -89.0);
        assert!((d - 111.19).abs() < 0.1, "got {}", d);
        assert_eq!(haversine_km(40.0, -89.0, 40.0, -89.0), 0.0);
    }

    #[test]
    fn test_neighbors_within_radius_sorted_by_distance() {
        let target = station("TARGET", 40.0, -89.0);
        let candidates = vec![
            station("FAR", 41.0, -89.0),
            station("NEAR", 40.1, -89.0),
            station("MID", 40.5, -89.0),
            station("TARGET", 40.0, -89.0),
        ];
        let nearby = neighbors_within(&target, &candidates, 75.0);
        let ids: Vec<&str> = nearby.iter().map(|(s, _)| s.station_id.as_str()).collect();
        assert_eq!(ids, vec!["NEAR", "MID"], "FAR is ~111 km away and the target is excluded");
    }
}
