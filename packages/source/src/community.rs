//! Community map adapter (OpenStreetMap).
//!
//! Facilities are mapped as closed ways tagged `man_made=wastewater_plant`.
//! Each way's node references are resolved into a [`BoundingGeometry`]
//! whose equal-area centroid becomes the canonical point. A manually
//! tagged CSV export (WKT centroids) is accepted as well.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;

use serde::Deserialize;
use wwtp_point_models::{BoundingGeometry, GeoPoint, PointSource, regions};
use wwtp_spatial::projection::equal_area_centroid;

use crate::parsing::parse_wkt_point;
use crate::{AdapterReport, SourceError};

/// An Overpass API JSON response (`[out:json]`).
#[derive(Debug, Clone, Deserialize)]
pub struct OverpassResponse {
    /// Nodes, ways and relations returned by the query.
    #[serde(default)]
    pub elements: Vec<OverpassElement>,
}

/// A single OSM element in an Overpass response.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OverpassElement {
    /// A node with its position.
    Node {
        /// OSM node id.
        id: i64,
        /// Latitude (WGS84).
        lat: f64,
        /// Longitude (WGS84).
        lon: f64,
    },
    /// A way with its ordered node references.
    Way {
        /// OSM way id.
        id: i64,
        /// Ordered node ids forming the outline.
        #[serde(default)]
        nodes: Vec<i64>,
        /// OSM tags.
        #[serde(default)]
        tags: BTreeMap<String, String>,
    },
    /// Relations and anything else are ignored.
    #[serde(other)]
    Other,
}

/// Normalizes an Overpass response into community points for `region`.
///
/// The region is the state the Overpass query was scoped to; the
/// response itself carries no state attribute.
#[must_use]
pub fn adapt_overpass(response: &OverpassResponse, region: &str) -> (Vec<GeoPoint>, AdapterReport) {
    let nodes: BTreeMap<i64, (f64, f64)> = response
        .elements
        .iter()
        .filter_map(|element| match element {
            OverpassElement::Node { id, lat, lon } => Some((*id, (*lon, *lat))),
            _ => None,
        })
        .collect();

    let mut report = AdapterReport::new(PointSource::Community);
    let mut seen_ids = BTreeSet::new();
    let mut points = Vec::new();

    for element in &response.elements {
        let OverpassElement::Way { id, nodes: refs, tags } = element else {
            continue;
        };
        report.read += 1;

        let point_id = format!("way/{id}");
        if !seen_ids.insert(point_id.clone()) {
            report.duplicates += 1;
            continue;
        }

        let vertices: Option<Vec<(f64, f64)>> =
            refs.iter().map(|node| nodes.get(node).copied()).collect();
        let Some(vertices) = vertices else {
            log::debug!("OSM way {id}: unresolved node reference");
            report.malformed += 1;
            continue;
        };

        let ring = BoundingGeometry::closed(vertices);
        let Some((lon, lat)) = equal_area_centroid(&ring) else {
            log::debug!("OSM way {id}: outline has no area");
            report.malformed += 1;
            continue;
        };

        let name = tags
            .get("name")
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Plant_{id}"));

        match GeoPoint::new(point_id, name, lat, lon, PointSource::Community, region) {
            Ok(point) => points.push(point),
            Err(e) => {
                log::debug!("OSM way {id}: {e}");
                report.malformed += 1;
            }
        }
    }

    report.kept = points.len() as u64;
    report.log();
    (points, report)
}

/// Parses an Overpass JSON document and normalizes it.
///
/// # Errors
///
/// Returns [`SourceError`] if the text is not a valid Overpass response.
pub fn adapt_overpass_str(
    text: &str,
    region: &str,
) -> Result<(Vec<GeoPoint>, AdapterReport), SourceError> {
    let response: OverpassResponse = serde_json::from_str(text)?;
    Ok(adapt_overpass(&response, region))
}

/// A row of the manually tagged community CSV.
#[derive(Debug, Deserialize)]
struct TaggedRow {
    osm_name: Option<String>,
    centroid: Option<String>,
    state: Option<String>,
}

/// Normalizes the manually tagged community CSV (`osm_name`, `centroid`
/// as WKT `POINT (lon lat)`, `state` as name or code).
///
/// # Errors
///
/// Returns [`SourceError`] if the CSV header cannot be read.
pub fn adapt_tagged_csv<R: Read>(reader: R) -> Result<(Vec<GeoPoint>, AdapterReport), SourceError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    csv_reader.headers()?;

    let mut report = AdapterReport::new(PointSource::Community);
    let mut points = Vec::new();

    for (row_idx, row) in csv_reader.deserialize::<TaggedRow>().enumerate() {
        report.read += 1;
        let Ok(row) = row else {
            report.malformed += 1;
            continue;
        };

        let Some((lon, lat)) = row.centroid.as_deref().and_then(parse_wkt_point) else {
            report.malformed += 1;
            continue;
        };

        let Some(region) = row.state.as_deref().and_then(regions::normalize) else {
            report.ambiguous += 1;
            continue;
        };

        let id = format!("osm-{}", row_idx + 1);
        let name = row.osm_name.unwrap_or_default();

        match GeoPoint::new(id, name, lat, lon, PointSource::Community, region) {
            Ok(point) => points.push(point),
            Err(e) => {
                log::debug!("Tagged OSM row {}: {e}", row_idx + 1);
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

    const RESPONSE: &str = r#"{
        "version": 0.6,
        "elements": [
            {"type": "node", "id": 1, "lat": 61.20, "lon": -149.90},
            {"type": "node", "id": 2, "lat": 61.20, "lon": -149.88},
            {"type": "node", "id": 3, "lat": 61.21, "lon": -149.88},
            {"type": "node", "id": 4, "lat": 61.21, "lon": -149.90},
            {"type": "way", "id": 100, "nodes": [1, 2, 3, 4, 1],
             "tags": {"man_made": "wastewater_plant", "name": "Asplund WWTF"}},
            {"type": "way", "id": 101, "nodes": [1, 2, 3, 4],
             "tags": {"man_made": "wastewater_plant"}},
            {"type": "way", "id": 102, "nodes": [1, 2, 99],
             "tags": {"man_made": "wastewater_plant"}},
            {"type": "way", "id": 103, "nodes": [1, 2],
             "tags": {"man_made": "wastewater_plant"}},
            {"type": "relation", "id": 7, "members": []}
        ]
    }"#;

    #[test]
    fn centroids_closed_ways() {
        let (points, report) = adapt_overpass_str(RESPONSE, "AK").unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].id(), "way/100");
        assert_eq!(points[0].name(), "Asplund WWTF");
        assert_eq!(points[1].name(), "Plant_101");
        assert_eq!(points[0].region(), "AK");

        let p = &points[0];
        assert!((p.lon() - -149.89).abs() < 1e-6);
        assert!(p.lat() > 61.20 && p.lat() < 61.21);

        assert_eq!(report.read, 4);
        assert_eq!(report.malformed, 2);
    }

    #[test]
    fn adapts_tagged_csv() {
        let csv = "osm_name,centroid,state\n\
                   Plant A,POINT (-97.7 30.2),Texas\n\
                   Plant B,garbage,Texas\n\
                   Plant C,POINT (-97.6 30.1),Atlantis\n";
        let (points, report) = adapt_tagged_csv(csv.as_bytes()).unwrap();

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].region(), "TX");
        assert!((points[0].lat() - 30.2).abs() < f64::EPSILON);
        assert_eq!(report.malformed, 1);
        assert_eq!(report.ambiguous, 1);
    }
}
