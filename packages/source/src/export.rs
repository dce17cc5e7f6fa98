//! Tabular CSV exports.
//!
//! Points, match records, region summaries and the candidate list are the
//! pipeline's working files. Every writer creates parent directories as
//! needed and flushes before returning.

use std::io::{Read, Write};
use std::path::Path;

use serde::Serialize;
use wwtp_point_models::{GeoPoint, MatchRecord, MatchRow, RegionSummary};

use crate::SourceError;

/// Row layout of the candidate CSV read by [`crate::candidate::adapt`].
#[derive(Debug, Serialize)]
struct CandidateExportRow<'a> {
    id: &'a str,
    wwtp_name: &'a str,
    lat: f64,
    lon: f64,
    state: &'a str,
}

fn create_writer(path: &Path) -> Result<csv::Writer<std::fs::File>, SourceError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(csv::Writer::from_path(path)?)
}

/// Writes points as `id,name,lat,lon,region,source`.
///
/// # Errors
///
/// Returns [`SourceError`] if the file cannot be created or written.
pub fn write_points(path: &Path, points: &[GeoPoint]) -> Result<(), SourceError> {
    let mut writer = create_writer(path)?;
    write_points_to(&mut writer, points)?;
    writer.flush()?;
    log::info!("Wrote {} points to {}", points.len(), path.display());
    Ok(())
}

fn write_points_to<W: Write>(
    writer: &mut csv::Writer<W>,
    points: &[GeoPoint],
) -> Result<(), SourceError> {
    for point in points {
        writer.serialize(point)?;
    }
    Ok(())
}

/// Reads a points CSV written by [`write_points`].
///
/// Rows are validated like freshly adapted points; an invalid row is an
/// error here because the file is pipeline output, not raw input.
///
/// # Errors
///
/// Returns [`SourceError`] if the file cannot be read or a row is invalid.
pub fn read_points(path: &Path) -> Result<Vec<GeoPoint>, SourceError> {
    let file = std::fs::File::open(path)?;
    read_points_from(file)
}

fn read_points_from<R: Read>(reader: R) -> Result<Vec<GeoPoint>, SourceError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    csv_reader
        .deserialize::<GeoPoint>()
        .map(|row| row.map_err(SourceError::from))
        .collect()
}

/// Writes match records in their flat [`MatchRow`] form.
///
/// # Errors
///
/// Returns [`SourceError`] if the file cannot be created or written.
pub fn write_matches(path: &Path, records: &[MatchRecord]) -> Result<(), SourceError> {
    let mut writer = create_writer(path)?;
    for record in records {
        writer.serialize(MatchRow::from(record))?;
    }
    writer.flush()?;
    log::info!("Wrote {} match records to {}", records.len(), path.display());
    Ok(())
}

/// Writes region summaries as
/// `region,count_hydro,count_reference,count_within_threshold`.
///
/// # Errors
///
/// Returns [`SourceError`] if the file cannot be created or written.
pub fn write_summaries(path: &Path, summaries: &[RegionSummary]) -> Result<(), SourceError> {
    let mut writer = create_writer(path)?;
    for summary in summaries {
        writer.serialize(summary)?;
    }
    writer.flush()?;
    log::info!("Wrote {} region summaries to {}", summaries.len(), path.display());
    Ok(())
}

/// Writes the candidate list as `id,wwtp_name,lat,lon,state`, the layout
/// the candidate adapter reads back.
///
/// # Errors
///
/// Returns [`SourceError`] if the file cannot be created or written.
pub fn write_candidates(path: &Path, points: &[GeoPoint]) -> Result<(), SourceError> {
    let mut writer = create_writer(path)?;
    for point in points {
        writer.serialize(CandidateExportRow {
            id: point.id(),
            wwtp_name: point.name(),
            lat: point.lat(),
            lon: point.lon(),
            state: point.region(),
        })?;
    }
    writer.flush()?;
    log::info!("Wrote {} candidates to {}", points.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wwtp_point_models::PointSource;

    fn point(id: &str, name: &str, lat: f64, lon: f64, source: PointSource) -> GeoPoint {
        GeoPoint::new(id, name, lat, lon, source, "CA").unwrap()
    }

    #[test]
    fn points_survive_a_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("points.csv");
        let points = vec![
            point("1", "Hyperion, LA", 33.92, -118.43, PointSource::Hydro),
            point("2", "", 37.43, -121.95, PointSource::Hydro),
        ];

        write_points(&path, &points).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("id,name,lat,lon,region,source\n"));
        assert!(text.contains("\"Hyperion, LA\""));

        assert_eq!(read_points(&path).unwrap(), points);
    }

    #[test]
    fn reading_invalid_points_fails() {
        let csv = "id,name,lat,lon,region,source\n1,x,95.0,0.0,CA,HYDRO\n";
        assert!(read_points_from(csv.as_bytes()).is_err());
    }

    #[test]
    fn matches_are_flattened() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matches.csv");
        let record = MatchRecord {
            source_point: point("h1", "A", 36.0, -120.0, PointSource::Hydro),
            reference_point: point("e1", "A WWTP", 36.001, -120.0, PointSource::Regulatory),
            distance_km: 0.111,
        };

        write_matches(&path, &[record]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "source_id,source_name,source_lat,source_lon,source_region,source_source,\
             reference_id,reference_name,reference_lat,reference_lon,reference_region,\
             reference_source,distance_km"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("h1,A,36.0,-120.0,CA,HYDRO,e1,A WWTP,"));
        assert!(row.ends_with(",0.111"));
    }

    #[test]
    fn summaries_have_fixed_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");
        let summaries = vec![RegionSummary {
            region: "CA".to_string(),
            count_hydro: 3,
            count_reference: 2,
            count_within_threshold: 1,
        }];

        write_summaries(&path, &summaries).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "region,count_hydro,count_reference,count_within_threshold\nCA,3,2,1\n"
        );
    }

    #[test]
    fn candidates_are_readable_by_the_candidate_adapter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candidates.csv");
        let points = vec![
            point("hydro:1", "A", 36.0, -120.0, PointSource::Candidate),
            point("epa:9", "B WWTP", 35.0, -119.0, PointSource::Candidate),
        ];

        write_candidates(&path, &points).unwrap();
        let (read_back, report) = crate::candidate::adapt_path(&path).unwrap();

        assert_eq!(read_back, points);
        assert_eq!(report.dropped(), 0);
    }
}
