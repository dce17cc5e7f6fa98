#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Canonical located-entity types.
//!
//! Every input dataset (hydrology inventory, regulatory facility list,
//! community map, combined candidate list) is normalized into [`GeoPoint`]
//! records. The matcher produces [`MatchRecord`]s and [`RegionSummary`]s
//! from them, and the acquisition pipeline consumes them unchanged.

pub mod regions;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Which dataset a [`GeoPoint`] came from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PointSource {
    /// National hydrology inventory (HydroWASTE)
    Hydro,
    /// Regulatory / compliance facility dataset (EPA)
    Regulatory,
    /// Community-curated map (OpenStreetMap)
    Community,
    /// Reconciled candidate list fed to acquisition
    Candidate,
}

/// Errors raised when constructing a [`GeoPoint`] from raw values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PointError {
    /// Latitude or longitude is NaN or infinite.
    #[error("non-finite coordinate ({lat}, {lon})")]
    NonFinite {
        /// Offending latitude.
        lat: f64,
        /// Offending longitude.
        lon: f64,
    },

    /// Latitude outside `[-90, 90]`.
    #[error("latitude {lat} out of range [-90, 90]")]
    LatitudeOutOfRange {
        /// Offending latitude.
        lat: f64,
    },

    /// Longitude outside `[-180, 180]`.
    #[error("longitude {lon} out of range [-180, 180]")]
    LongitudeOutOfRange {
        /// Offending longitude.
        lon: f64,
    },

    /// Entity id is blank.
    #[error("point id is empty")]
    EmptyId,

    /// Region code is blank.
    #[error("region is empty for point {id}")]
    EmptyRegion {
        /// Id of the point missing a region.
        id: String,
    },
}

/// A located entity in canonical form.
///
/// Fields are private so every instance has passed the coordinate and
/// region checks in [`GeoPoint::new`]. Deserialization goes through the
/// same checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGeoPoint")]
pub struct GeoPoint {
    id: String,
    name: String,
    lat: f64,
    lon: f64,
    region: String,
    source: PointSource,
}

/// Unvalidated mirror of [`GeoPoint`] used for deserialization.
#[derive(Deserialize)]
struct RawGeoPoint {
    id: String,
    #[serde(default)]
    name: String,
    lat: f64,
    lon: f64,
    region: String,
    source: PointSource,
}

impl TryFrom<RawGeoPoint> for GeoPoint {
    type Error = PointError;

    fn try_from(raw: RawGeoPoint) -> Result<Self, Self::Error> {
        Self::new(raw.id, raw.name, raw.lat, raw.lon, raw.source, &raw.region)
    }
}

impl GeoPoint {
    /// Creates a validated point.
    ///
    /// The region is trimmed and upper-cased so that `"ca"` and `"CA "`
    /// partition together.
    ///
    /// # Errors
    ///
    /// Returns [`PointError`] if a coordinate is non-finite or out of range,
    /// or if the id or region is blank.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        lat: f64,
        lon: f64,
        source: PointSource,
        region: &str,
    ) -> Result<Self, PointError> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(PointError::NonFinite { lat, lon });
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(PointError::LatitudeOutOfRange { lat });
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(PointError::LongitudeOutOfRange { lon });
        }

        let id = id.into().trim().to_string();
        if id.is_empty() {
            return Err(PointError::EmptyId);
        }

        let region = region.trim().to_ascii_uppercase();
        if region.is_empty() {
            return Err(PointError::EmptyRegion { id });
        }

        Ok(Self {
            id,
            name: name.into().trim().to_string(),
            lat,
            lon,
            region,
            source,
        })
    }

    /// Unique identifier within the point's source.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable facility name (may be empty).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Latitude (WGS84).
    #[must_use]
    pub const fn lat(&self) -> f64 {
        self.lat
    }

    /// Longitude (WGS84).
    #[must_use]
    pub const fn lon(&self) -> f64 {
        self.lon
    }

    /// Two-letter region code.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Dataset this point came from.
    #[must_use]
    pub const fn source(&self) -> PointSource {
        self.source
    }

    /// Returns a copy of this point re-tagged with a different source and id.
    ///
    /// Used when reconciled points are promoted into the candidate list.
    #[must_use]
    pub fn retag(&self, id: impl Into<String>, source: PointSource) -> Self {
        Self {
            id: id.into(),
            source,
            ..self.clone()
        }
    }
}

/// An ordered ring of `(lon, lat)` vertices outlining a facility.
///
/// Only community-map entities carry one, and only long enough to derive
/// a centroid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundingGeometry {
    vertices: Vec<(f64, f64)>,
}

impl BoundingGeometry {
    /// Builds a ring from `(lon, lat)` vertices, closing it if the last
    /// vertex does not repeat the first.
    #[must_use]
    pub fn closed(mut vertices: Vec<(f64, f64)>) -> Self {
        if let (Some(first), Some(last)) = (vertices.first().copied(), vertices.last().copied())
            && first != last
        {
            vertices.push(first);
        }
        Self { vertices }
    }

    /// Vertices of the closed ring, first vertex repeated at the end.
    #[must_use]
    pub fn vertices(&self) -> &[(f64, f64)] {
        &self.vertices
    }

    /// Number of distinct vertices (ignores the closing repeat).
    #[must_use]
    pub fn distinct_len(&self) -> usize {
        let mut seen: Vec<(u64, u64)> = self
            .vertices
            .iter()
            .map(|(x, y)| (x.to_bits(), y.to_bits()))
            .collect();
        seen.sort_unstable();
        seen.dedup();
        seen.len()
    }
}

/// A source entity paired with its nearest reference entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Entity from the dataset being reconciled.
    pub source_point: GeoPoint,
    /// Its geodesically nearest entity in the reference dataset.
    pub reference_point: GeoPoint,
    /// Geodesic distance between the two, in kilometres.
    pub distance_km: f64,
}

/// Flat, CSV-friendly view of a [`MatchRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRow {
    pub source_id: String,
    pub source_name: String,
    pub source_lat: f64,
    pub source_lon: f64,
    pub source_region: String,
    pub source_source: PointSource,
    pub reference_id: String,
    pub reference_name: String,
    pub reference_lat: f64,
    pub reference_lon: f64,
    pub reference_region: String,
    pub reference_source: PointSource,
    pub distance_km: f64,
}

impl From<&MatchRecord> for MatchRow {
    fn from(record: &MatchRecord) -> Self {
        let s = &record.source_point;
        let r = &record.reference_point;
        Self {
            source_id: s.id.clone(),
            source_name: s.name.clone(),
            source_lat: s.lat,
            source_lon: s.lon,
            source_region: s.region.clone(),
            source_source: s.source,
            reference_id: r.id.clone(),
            reference_name: r.name.clone(),
            reference_lat: r.lat,
            reference_lon: r.lon,
            reference_region: r.region.clone(),
            reference_source: r.source,
            distance_km: record.distance_km,
        }
    }
}

/// Per-region counts aggregated from a matching run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSummary {
    /// Two-letter region code.
    pub region: String,
    /// Source-side entities in the region (hydrology in the standard run).
    pub count_hydro: u64,
    /// Reference-side entities in the region.
    pub count_reference: u64,
    /// Source entities whose match lies strictly within the threshold.
    pub count_within_threshold: u64,
}
