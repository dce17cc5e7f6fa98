//! Hydrology inventory adapter (HydroWASTE).
//!
//! Reads the HydroWASTE CSV (Latin-1 encoded), keeps plants in the target
//! country, and assigns each one a region by strict containment in the
//! administrative boundary polygons.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use wwtp_point_models::{GeoPoint, PointSource};
use wwtp_spatial::{RegionIndex, RegionLookup};

use crate::parsing::{decode_latin1, parse_lat_lon_str};
use crate::{AdapterReport, SourceError};

/// Country filter applied by default.
pub const DEFAULT_COUNTRY: &str = "United States";

const COL_ID: &str = "WASTE_ID";
const COL_COUNTRY: &str = "COUNTRY";
const COL_NAME: &str = "WWTP_NAME";
const COL_LAT: &str = "LAT_WWTP";
const COL_LON: &str = "LON_WWTP";

/// Column positions resolved from the header row.
struct Columns {
    id: Option<usize>,
    country: usize,
    name: Option<usize>,
    lat: usize,
    lon: usize,
}

impl Columns {
    fn resolve(headers: &[String]) -> Result<Self, SourceError> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| SourceError::Normalization {
                message: format!("HydroWASTE CSV is missing the {name} column"),
            })
        };

        Ok(Self {
            id: find(COL_ID),
            country: require(COL_COUNTRY)?,
            name: find(COL_NAME),
            lat: require(COL_LAT)?,
            lon: require(COL_LON)?,
        })
    }
}

/// Reads a HydroWASTE CSV file from disk.
///
/// # Errors
///
/// Returns [`SourceError`] if the file cannot be opened or its header
/// lacks the required columns.
pub fn adapt_path(
    path: &Path,
    index: &RegionIndex,
    country: &str,
) -> Result<(Vec<GeoPoint>, AdapterReport), SourceError> {
    let file = std::fs::File::open(path)?;
    adapt(file, index, country)
}

/// Normalizes HydroWASTE rows into hydrology points.
///
/// Rows from other countries are filtered; rows without a valid
/// coordinate are malformed; plants in zero or several region polygons
/// are ambiguous. All three are counted and dropped.
///
/// # Errors
///
/// Returns [`SourceError`] if the header row cannot be read or lacks the
/// required columns.
pub fn adapt<R: Read>(
    reader: R,
    index: &RegionIndex,
    country: &str,
) -> Result<(Vec<GeoPoint>, AdapterReport), SourceError> {
    let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers: Vec<String> = csv_reader
        .byte_headers()?
        .iter()
        .map(decode_latin1)
        .collect();
    let cols = Columns::resolve(&headers)?;

    let mut report = AdapterReport::new(PointSource::Hydro);
    let mut seen_ids = BTreeSet::new();
    let mut points = Vec::new();

    for (row_idx, record) in csv_reader.byte_records().enumerate() {
        report.read += 1;

        let Ok(record) = record else {
            report.malformed += 1;
            continue;
        };
        let field = |i: usize| record.get(i).map(decode_latin1);

        if field(cols.country).as_deref().map(str::trim) != Some(country) {
            report.filtered += 1;
            continue;
        }

        let lat = field(cols.lat);
        let lon = field(cols.lon);
        let Some((lat, lon)) = parse_lat_lon_str(lat.as_deref(), lon.as_deref()) else {
            log::debug!("HydroWASTE row {}: unparseable coordinates", row_idx + 1);
            report.malformed += 1;
            continue;
        };

        let region = match index.lookup_region(lon, lat) {
            RegionLookup::Unique(region) => region,
            RegionLookup::Outside | RegionLookup::Ambiguous(_) => {
                log::debug!(
                    "HydroWASTE row {}: ({lat}, {lon}) not within exactly one region",
                    row_idx + 1
                );
                report.ambiguous += 1;
                continue;
            }
        };

        let id = cols
            .id
            .and_then(field)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| (row_idx + 1).to_string());

        if !seen_ids.insert(id.clone()) {
            report.duplicates += 1;
            continue;
        }

        let name = cols.name.and_then(field).unwrap_or_default();

        match GeoPoint::new(id, name, lat, lon, PointSource::Hydro, region) {
            Ok(point) => points.push(point),
            Err(e) => {
                log::debug!("HydroWASTE row {}: {e}", row_idx + 1);
                report.malformed += 1;
            }
        }
    }

    report.kept = points.len() as u64;
    report.log();
    Ok((points, report))
}
