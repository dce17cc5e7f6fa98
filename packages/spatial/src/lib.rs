#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Spatial primitives for WWTP reconciliation.
//!
//! Loads administrative boundary polygons from `GeoJSON`, builds an R-tree
//! over their envelopes, and answers strict point-in-polygon queries used
//! to assign a region to each hydrology facility. The [`projection`] and
//! [`geodesy`] modules provide the equal-area centroid and geodesic
//! distance used by the adapters and the matcher.

pub mod geodesy;
pub mod projection;

use std::path::Path;

use geo::{Contains, MultiPolygon};
use geojson::GeoJson;
use rstar::{AABB, RTree, RTreeObject};
use wwtp_point_models::regions;

/// Errors raised while loading boundary data.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// I/O error reading the boundary file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid `GeoJSON`.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] Box<geojson::Error>),

    /// The document parsed but does not hold usable boundaries.
    #[error("Invalid boundary data: {message}")]
    InvalidBoundaries {
        /// Description of what went wrong.
        message: String,
    },
}

/// A region polygon stored in the R-tree with its code.
struct BoundaryEntry {
    region: String,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for BoundaryEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Outcome of a region lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionLookup<'a> {
    /// The point lies strictly inside exactly one region.
    Unique(&'a str),
    /// The point lies inside no region (offshore, on a border, or abroad).
    Outside,
    /// The point lies inside more than one region polygon.
    Ambiguous(usize),
}

/// Pre-built spatial index over administrative boundaries.
pub struct RegionIndex {
    boundaries: RTree<BoundaryEntry>,
}

impl RegionIndex {
    /// Builds an index from already-parsed `(region code, polygon)` pairs.
    #[must_use]
    pub fn from_boundaries(boundaries: Vec<(String, MultiPolygon<f64>)>) -> Self {
        let entries = boundaries
            .into_iter()
            .map(|(region, polygon)| BoundaryEntry {
                region,
                envelope: compute_envelope(&polygon),
                polygon,
            })
            .collect();

        Self {
            boundaries: RTree::bulk_load(entries),
        }
    }

    /// Loads a `GeoJSON` `FeatureCollection` of region polygons from disk.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the file cannot be read or parsed, or
    /// if no feature yields a usable region polygon.
    pub fn load(path: &Path) -> Result<Self, SpatialError> {
        let text = std::fs::read_to_string(path)?;
        let index = Self::from_geojson_str(&text)?;
        log::info!(
            "Loaded {} region boundaries from {}",
            index.len(),
            path.display()
        );
        Ok(index)
    }

    /// Parses region polygons from a `GeoJSON` `FeatureCollection` string.
    ///
    /// Each feature must carry a `STUSPS` (two-letter code) or `NAME`
    /// (full state name) property. Features naming an unknown region or
    /// carrying non-polygonal geometry are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the text is not a `FeatureCollection`
    /// or contains no usable boundaries.
    pub fn from_geojson_str(text: &str) -> Result<Self, SpatialError> {
        let geojson: GeoJson = text.parse().map_err(Box::new)?;
        let GeoJson::FeatureCollection(collection) = geojson else {
            return Err(SpatialError::InvalidBoundaries {
                message: "expected a FeatureCollection".to_string(),
            });
        };

        let mut boundaries = Vec::new();
        for feature in collection.features {
            let label = ["STUSPS", "NAME", "name"]
                .iter()
                .find_map(|key| feature.property(key).and_then(serde_json::Value::as_str));

            let Some(region) = label.and_then(regions::normalize) else {
                log::warn!("Skipping boundary feature with unknown region {label:?}");
                continue;
            };

            let Some(polygon) = feature.geometry.and_then(geometry_to_multipolygon) else {
                log::warn!("Skipping boundary feature for {region}: not a polygon");
                continue;
            };

            boundaries.push((region.to_string(), polygon));
        }

        if boundaries.is_empty() {
            return Err(SpatialError::InvalidBoundaries {
                message: "no usable region polygons".to_string(),
            });
        }

        Ok(Self::from_boundaries(boundaries))
    }

    /// Number of boundary polygons in the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.boundaries.size()
    }

    /// Whether the index holds no boundaries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.boundaries.size() == 0
    }

    /// Finds the region strictly containing a point.
    ///
    /// Points on a shared border are contained by neither polygon and come
    /// back as [`RegionLookup::Outside`].
    #[must_use]
    pub fn lookup_region(&self, lon: f64, lat: f64) -> RegionLookup<'_> {
        let point = geo::Point::new(lon, lat);
        let query_env = AABB::from_point([lon, lat]);

        let mut found: Option<&str> = None;
        let mut count = 0usize;

        for entry in self.boundaries.locate_in_envelope_intersecting(&query_env) {
            if entry.polygon.contains(&point) {
                count += 1;
                found = Some(&entry.region);
            }
        }

        match (count, found) {
            (1, Some(region)) => RegionLookup::Unique(region),
            (0, _) | (_, None) => RegionLookup::Outside,
            (n, Some(_)) => RegionLookup::Ambiguous(n),
        }
    }
}

/// Converts a `GeoJSON` geometry into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn geometry_to_multipolygon(geometry: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    use geo::BoundingRect;

    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
            (x: x0, y: y0),
        ]])
    }

    fn two_state_index() -> RegionIndex {
        RegionIndex::from_boundaries(vec![
            ("CA".to_string(), square(-124.0, 32.0, -114.0, 42.0)),
            ("NV".to_string(), square(-114.0, 35.0, -110.0, 42.0)),
        ])
    }

    #[test]
    fn finds_unique_region() {
        let index = two_state_index();
        assert_eq!(index.lookup_region(-120.0, 37.0), RegionLookup::Unique("CA"));
        assert_eq!(index.lookup_region(-112.0, 40.0), RegionLookup::Unique("NV"));
    }

    #[test]
    fn border_and_outside_points_are_unassigned() {
        let index = two_state_index();
        assert_eq!(index.lookup_region(-114.0, 38.0), RegionLookup::Outside);
        assert_eq!(index.lookup_region(-80.0, 38.0), RegionLookup::Outside);
    }

    #[test]
    fn overlapping_polygons_are_ambiguous() {
        let index = RegionIndex::from_boundaries(vec![
            ("CA".to_string(), square(0.0, 0.0, 2.0, 2.0)),
            ("NV".to_string(), square(1.0, 1.0, 3.0, 3.0)),
        ]);
        assert_eq!(index.lookup_region(1.5, 1.5), RegionLookup::Ambiguous(2));
    }

    #[test]
    fn loads_feature_collection() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": { "NAME": "Nevada" },
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[-114,35],[-110,35],[-110,42],[-114,42],[-114,35]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": { "NAME": "Atlantis" },
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]
                    }
                }
            ]
        }"#;

        let index = RegionIndex::from_geojson_str(text).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.lookup_region(-112.0, 40.0), RegionLookup::Unique("NV"));
    }

    #[test]
    fn rejects_collection_without_regions() {
        let text = r#"{"type": "FeatureCollection", "features": []}"#;
        assert!(matches!(
            RegionIndex::from_geojson_str(text),
            Err(SpatialError::InvalidBoundaries { .. })
        ));
    }
}
