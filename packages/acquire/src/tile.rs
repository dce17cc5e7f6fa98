//! Tile geometry and on-disk naming.
//!
//! A tile lives at `{output_root}/{region}/{stem}.tif`; its existence is the
//! only record that the point is done. Downloads land in a hidden `.part`
//! sibling first and are renamed into place.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use wwtp_point_models::GeoPoint;
use wwtp_spatial::geodesy::distance_km;

/// File extension of exported tiles.
pub const TILE_EXTENSION: &str = "tif";

/// Axis-aligned lon/lat box around a point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileBounds {
    /// Western edge (longitude).
    pub west: f64,
    /// Southern edge (latitude).
    pub south: f64,
    /// Eastern edge (longitude).
    pub east: f64,
    /// Northern edge (latitude).
    pub north: f64,
}

/// Pixel grid of a tile in EPSG:4326.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelGrid {
    /// Columns.
    pub width: u32,
    /// Rows.
    pub height: u32,
    /// Degrees of longitude per column.
    pub scale_x: f64,
    /// Degrees of latitude per row (positive; rows run north to south).
    pub scale_y: f64,
}

impl TileBounds {
    /// Box of `half_width_deg` by `half_height_deg` centred on the point,
    /// clamped to valid latitudes.
    #[must_use]
    pub fn around(point: &GeoPoint, half_width_deg: f64, half_height_deg: f64) -> Self {
        Self {
            west: point.lon() - half_width_deg,
            south: (point.lat() - half_height_deg).max(-90.0),
            east: point.lon() + half_width_deg,
            north: (point.lat() + half_height_deg).min(90.0),
        }
    }

    /// `[west, south, east, north]`.
    #[must_use]
    pub const fn coordinates(&self) -> [f64; 4] {
        [self.west, self.south, self.east, self.north]
    }

    /// Grid whose pixels measure about `scale_m` metres at the tile centre.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn pixel_grid(&self, scale_m: f64) -> PixelGrid {
        let lat = f64::midpoint(self.south, self.north);
        let lon = f64::midpoint(self.west, self.east);
        let width_deg = self.east - self.west;
        let height_deg = self.north - self.south;

        let width_m = distance_km(lat, lon - width_deg / 2.0, lat, lon + width_deg / 2.0) * 1000.0;
        let height_m = distance_km(self.south, lon, self.north, lon) * 1000.0;

        let width = (width_m / scale_m).round().max(1.0) as u32;
        let height = (height_m / scale_m).round().max(1.0) as u32;

        PixelGrid {
            width,
            height,
            scale_x: width_deg / f64::from(width),
            scale_y: height_deg / f64::from(height),
        }
    }
}

/// One point scheduled for export, with its region-unique file stem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadTask {
    /// Point to export.
    pub point: GeoPoint,
    /// File name without extension.
    pub file_stem: String,
}

impl DownloadTask {
    /// `{output_root}/{region}/{stem}.tif`.
    #[must_use]
    pub fn target_path(&self, output_root: &Path) -> PathBuf {
        output_root
            .join(self.point.region())
            .join(format!("{}.{TILE_EXTENSION}", self.file_stem))
    }

    /// Hidden sibling the download is written to before the rename.
    #[must_use]
    pub fn part_path(&self, output_root: &Path) -> PathBuf {
        output_root
            .join(self.point.region())
            .join(format!(".{}.{TILE_EXTENSION}.part", self.file_stem))
    }
}

/// Characters that cannot appear in a file name on common filesystems.
const RESERVED: &[char] = &['/', '\\', ':', '<', '>', '"', '|', '?', '*'];

/// Hex digits of the id digest appended to disambiguated stems.
const DIGEST_LEN: usize = 8;

/// Makes a name safe to use as a file stem.
///
/// Path separators, characters reserved on Windows and control characters
/// become `_`; surrounding whitespace and trailing dots are trimmed.
#[must_use]
pub fn sanitize_stem(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if RESERVED.contains(&c) || c.is_control() { '_' } else { c })
        .collect();
    cleaned.trim().trim_end_matches('.').trim_end().to_string()
}

/// Short digest of a raw point id, used to tell apart points whose
/// sanitized stems coincide.
#[must_use]
pub fn id_digest(id: &str) -> String {
    let mut digest = format!("{:x}", md5::compute(id.as_bytes()));
    digest.truncate(DIGEST_LEN);
    digest
}

/// Builds the download tasks for one region's points, in input order.
///
/// The stem is the sanitized name, or the sanitized id when the name is
/// empty. Every point whose stem is shared with another point of the
/// region (or is empty) gets `__{digest of raw id}` appended. A stem that
/// still clashes, e.g. a name spelled like another point's suffixed stem,
/// takes a `~{n}` counter. Stems are unique within the region and depend
/// only on the region's point list, not on the number of workers.
#[must_use]
pub fn plan_region(points: &[GeoPoint]) -> Vec<DownloadTask> {
    let bases: Vec<String> = points
        .iter()
        .map(|p| {
            let name = sanitize_stem(p.name());
            if name.is_empty() {
                sanitize_stem(p.id())
            } else {
                name
            }
        })
        .collect();
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for base in &bases {
        *counts.entry(base.as_str()).or_default() += 1;
    }

    let mut taken: BTreeSet<String> = BTreeSet::new();
    points
        .iter()
        .zip(&bases)
        .map(|(point, base)| {
            let shared = counts.get(base.as_str()).copied().unwrap_or_default() > 1;
            let stem = if shared || base.is_empty() {
                format!("{base}__{}", id_digest(point.id()))
            } else {
                base.clone()
            };

            let mut file_stem = stem.clone();
            let mut n = 1;
            while !taken.insert(file_stem.clone()) {
                n += 1;
                file_stem = format!("{stem}~{n}");
            }
            if n > 1 {
                log::debug!("Tile stem {stem} taken; using {file_stem} for {}", point.id());
            }

            DownloadTask {
                point: point.clone(),
                file_stem,
            }
        })
        .collect()
}
