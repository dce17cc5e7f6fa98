//! Combined candidate list adapter.
//!
//! Reads the reconciled candidate CSV (`wwtp_name`, `lat`, `lon`, `state`,
//! optional `id`) that drives tile acquisition.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use wwtp_point_models::{GeoPoint, PointSource, regions};

use crate::parsing::parse_lat_lon_f64;
use crate::{AdapterReport, SourceError};

#[derive(Debug, Deserialize)]
struct CandidateRow {
    #[serde(default)]
    id: Option<String>,
    wwtp_name: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    state: Option<String>,
}

/// Reads a candidate CSV from disk.
///
/// # Errors
///
/// Returns [`SourceError`] if the file cannot be opened.
pub fn adapt_path(path: &Path) -> Result<(Vec<GeoPoint>, AdapterReport), SourceError> {
    let file = std::fs::File::open(path)?;
    adapt(file)
}

/// Normalizes candidate rows into `CANDIDATE` points.
///
/// The `state` column may hold a full state name or a two-letter code.
///
/// # Errors
///
/// Returns [`SourceError`] if the header row cannot be read.
pub fn adapt<R: Read>(reader: R) -> Result<(Vec<GeoPoint>, AdapterReport), SourceError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    csv_reader.headers()?;

    let mut report = AdapterReport::new(PointSource::Candidate);
    let mut seen_ids = BTreeSet::new();
    let mut points = Vec::new();

    for (row_idx, row) in csv_reader.deserialize::<CandidateRow>().enumerate() {
        report.read += 1;
        let Ok(row) = row else {
            report.malformed += 1;
            continue;
        };

        let Some((lat, lon)) = parse_lat_lon_f64(row.lat, row.lon) else {
            report.malformed += 1;
            continue;
        };

        let Some(region) = row.state.as_deref().and_then(regions::normalize) else {
            report.ambiguous += 1;
            continue;
        };

        let id = row
            .id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| format!("candidate-{}", row_idx + 1));
        if !seen_ids.insert(id.clone()) {
            report.duplicates += 1;
            continue;
        }

        let name = row.wwtp_name.unwrap_or_default();
        match GeoPoint::new(id, name, lat, lon, PointSource::Candidate, region) {
            Ok(point) => points.push(point),
            Err(e) => {
                log::debug!("Candidate row {}: {e}", row_idx + 1);
                report.malformed += 1;
            }
        }
    }

    report.kept = points.len() as u64;
    report.log();
    Ok((points, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_names_and_codes() {
        let csv = "wwtp_name,lat,lon,state\n\
                   Plant A,36.7,-119.9,California\n\
                   Plant B,30.2,-97.7,TX\n\
                   Plant C,,-97.7,TX\n\
                   Plant D,30.2,-97.7,Ontario\n";
        let (points, report) = adapt(csv.as_bytes()).unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].region(), "CA");
        assert_eq!(points[0].id(), "candidate-1");
        assert_eq!(points[1].region(), "TX");
        assert_eq!(report.malformed, 1);
        assert_eq!(report.ambiguous, 1);
    }

    #[test]
    fn keeps_explicit_ids_and_drops_repeats() {
        let csv = "id,wwtp_name,lat,lon,state\n\
                   x1,A,36.7,-119.9,CA\n\
                   x1,B,36.8,-119.8,CA\n";
        let (points, report) = adapt(csv.as_bytes()).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].id(), "x1");
        assert_eq!(report.duplicates, 1);
    }
}
