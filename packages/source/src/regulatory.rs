//! Regulatory facility adapter (EPA permit dataset).
//!
//! Reads a `GeoJSON` `FeatureCollection` of permitted facilities (WGS84
//! point geometries), keeps those whose permit name marks them as a
//! wastewater treatment plant, and drops exact duplicates.

use std::collections::BTreeSet;
use std::path::Path;

use geojson::{Feature, GeoJson, Value};
use wwtp_point_models::{GeoPoint, PointSource, regions};

use crate::parsing::parse_lat_lon_f64;
use crate::{AdapterReport, SourceError};

/// Acronyms that identify a treatment plant in the permit name.
/// Matching is case-sensitive; any one acronym is enough.
pub const WWTP_ACRONYMS: &[&str] = &["WWTP", "WWTF", "STP", "WQCF", "WRP", "WWRF"];

const PROP_NAME: &str = "CWP_NAME";
const PROP_STATE: &str = "CWP_STATE";
const ID_PROPS: &[&str] = &["SOURCE_ID", "REGISTRY_ID", "NPDES_ID"];

/// Returns `true` if the permit name contains one of [`WWTP_ACRONYMS`].
#[must_use]
pub fn is_treatment_plant(name: &str) -> bool {
    WWTP_ACRONYMS.iter().any(|acronym| name.contains(acronym))
}

/// Reads the regulatory `GeoJSON` file from disk.
///
/// # Errors
///
/// Returns [`SourceError`] if the file cannot be read or is not a
/// `FeatureCollection`.
pub fn adapt_path(path: &Path) -> Result<(Vec<GeoPoint>, AdapterReport), SourceError> {
    let text = std::fs::read_to_string(path)?;
    adapt_str(&text)
}

/// Normalizes a regulatory `FeatureCollection` into regulatory points.
///
/// # Errors
///
/// Returns [`SourceError`] if the text is not valid `GeoJSON` or not a
/// `FeatureCollection`.
pub fn adapt_str(text: &str) -> Result<(Vec<GeoPoint>, AdapterReport), SourceError> {
    let geojson: GeoJson = text.parse().map_err(Box::new)?;
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(SourceError::Normalization {
            message: "regulatory data must be a FeatureCollection".to_string(),
        });
    };
    Ok(adapt(&collection.features))
}

/// Normalizes regulatory features.
///
/// Features whose name lacks a treatment-plant acronym, or whose state is
/// not a known region, are filtered. Features without a point geometry are
/// malformed. Repeated `(name, state, coordinates)` tuples are duplicates.
#[must_use]
pub fn adapt(features: &[Feature]) -> (Vec<GeoPoint>, AdapterReport) {
    let mut report = AdapterReport::new(PointSource::Regulatory);
    let mut seen_rows: BTreeSet<(String, String, u64, u64)> = BTreeSet::new();
    let mut seen_ids: BTreeSet<String> = BTreeSet::new();
    let mut points = Vec::new();

    for (idx, feature) in features.iter().enumerate() {
        report.read += 1;

        let name = string_prop(feature, PROP_NAME).unwrap_or_default();
        if !is_treatment_plant(&name) {
            report.filtered += 1;
            continue;
        }

        let Some(region) = string_prop(feature, PROP_STATE)
            .as_deref()
            .and_then(regions::by_code)
        else {
            report.filtered += 1;
            continue;
        };

        let Some((lat, lon)) = point_coordinates(feature) else {
            report.malformed += 1;
            continue;
        };

        let row_key = (name.clone(), region.code.to_string(), lat.to_bits(), lon.to_bits());
        if !seen_rows.insert(row_key) {
            report.duplicates += 1;
            continue;
        }

        let base_id = ID_PROPS
            .iter()
            .find_map(|key| string_prop(feature, key))
            .unwrap_or_else(|| format!("epa-{}", idx + 1));
        let id = if seen_ids.contains(&base_id) {
            format!("{base_id}#{}", idx + 1)
        } else {
            base_id
        };
        seen_ids.insert(id.clone());

        match GeoPoint::new(id, name, lat, lon, PointSource::Regulatory, region.code) {
            Ok(point) => points.push(point),
            Err(e) => {
                log::debug!("Regulatory feature {}: {e}", idx + 1);
                report.malformed += 1;
            }
        }
    }

    report.kept = points.len() as u64;
    report.log();
    (points, report)
}

/// Reads a non-empty string (or number) property from a feature.
fn string_prop(feature: &Feature, key: &str) -> Option<String> {
    let value = feature.property(key)?;
    let s = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// Extracts `(lat, lon)` from a point geometry.
fn point_coordinates(feature: &Feature) -> Option<(f64, f64)> {
    let geometry = feature.geometry.as_ref()?;
    let Value::Point(position) = &geometry.value else {
        return None;
    };
    let lon = position.first().copied();
    let lat = position.get(1).copied();
    parse_lat_lon_f64(lat, lon)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(name: &str, state: &str, lon: f64, lat: f64) -> String {
        format!(
            r#"{{"type":"Feature","properties":{{"CWP_NAME":"{name}","CWP_STATE":"{state}"}},
               "geometry":{{"type":"Point","coordinates":[{lon},{lat}]}}}}"#
        )
    }

    fn collection(features: &[String]) -> String {
        format!(
            r#"{{"type":"FeatureCollection","features":[{}]}}"#,
            features.join(",")
        )
    }

    #[test]
    fn matches_acronyms_case_sensitively() {
        assert!(is_treatment_plant("CITY OF FRESNO WWTP"));
        assert!(is_treatment_plant("PALO ALTO RWQCF"));
        assert!(is_treatment_plant("EAST BAY STP NO 2"));
        assert!(!is_treatment_plant("City of Fresno wwtp"));
        assert!(!is_treatment_plant("ACME GRAVEL PIT"));
    }

    #[test]
    fn filters_dedupes_and_normalizes() {
        let text = collection(&[
            feature("FRESNO WWTP", "CA", -119.9, 36.7),
            feature("FRESNO WWTP", "CA", -119.9, 36.7),
            feature("GRAVEL PIT", "CA", -119.0, 36.0),
            feature("SAN JUAN STP", "PR", -66.1, 18.4),
            feature("AUSTIN WWTF", "tx", -97.7, 30.2),
            r#"{"type":"Feature","properties":{"CWP_NAME":"NO GEOM WRP","CWP_STATE":"CA"},"geometry":null}"#
                .to_string(),
        ]);

        let (points, report) = adapt_str(&text).unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].region(), "CA");
        assert_eq!(points[1].region(), "TX");
        assert_eq!(points[1].source(), PointSource::Regulatory);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.filtered, 2);
        assert_eq!(report.malformed, 1);
        assert_eq!(report.kept + report.dropped(), report.read);
    }

    #[test]
    fn generated_ids_are_unique() {
        let text = collection(&[
            feature("A WWTP", "CA", -119.9, 36.7),
            feature("B WWTP", "CA", -119.8, 36.6),
        ]);
        let (points, _) = adapt_str(&text).unwrap();
        assert_ne!(points[0].id(), points[1].id());
    }

    #[test]
    fn rejects_non_collection() {
        let text = r#"{"type":"Point","coordinates":[0,0]}"#;
        assert!(matches!(
            adapt_str(text),
            Err(SourceError::Normalization { .. })
        ));
    }
}
