#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Cross-source spatial matching.
//!
//! For each point of a source dataset, finds the geodesically nearest point
//! of a reference dataset within the same region. Candidates come from an
//! R-tree over reference `(lon, lat)` pairs; the Euclidean nearest is only a
//! starting radius, refined by scanning every reference point whose
//! envelope could hold something geodesically closer.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use rstar::RTree;
use rstar::primitives::GeomWithData;
use wwtp_point_models::{GeoPoint, MatchRecord, PointSource, RegionSummary};
use wwtp_spatial::geodesy::{distance_km, search_windows};

/// Errors raised by the matcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    /// There is nothing to match against in this region.
    #[error("no reference points in region {region}")]
    EmptyReferenceSet {
        /// Region whose reference subset is empty.
        region: String,
    },
}

/// An R-tree entry: `[lon, lat]` plus the index into the reference slice.
type ReferenceEntry = GeomWithData<[f64; 2], usize>;

/// Spatial index over one set of reference points.
struct ReferenceIndex<'a> {
    points: &'a [&'a GeoPoint],
    tree: RTree<ReferenceEntry>,
}

impl<'a> ReferenceIndex<'a> {
    fn new(points: &'a [&'a GeoPoint]) -> Self {
        let entries = points
            .iter()
            .enumerate()
            .map(|(idx, p)| ReferenceEntry::new([p.lon(), p.lat()], idx))
            .collect();
        Self {
            points,
            tree: RTree::bulk_load(entries),
        }
    }

    /// Returns the geodesically nearest reference point and its distance
    /// in kilometres. Equal distances resolve to the smaller reference id.
    fn nearest(&self, query: &GeoPoint) -> Option<(&'a GeoPoint, f64)> {
        let candidate = self.tree.nearest_neighbor(&[query.lon(), query.lat()])?;
        let mut best = self.points[candidate.data];
        let mut best_km = distance_km(query.lat(), query.lon(), best.lat(), best.lon());

        for window in search_windows(query.lat(), query.lon(), best_km) {
            for entry in self.tree.locate_in_envelope(&window) {
                let other = self.points[entry.data];
                let km = distance_km(query.lat(), query.lon(), other.lat(), other.lon());
                let closer = km
                    .total_cmp(&best_km)
                    .then_with(|| other.id().cmp(best.id()))
                    == Ordering::Less;
                if closer {
                    best = other;
                    best_km = km;
                }
            }
        }

        Some((best, best_km))
    }
}

/// Matches every source point to its geodesically nearest reference point.
///
/// Callers are expected to pass same-region subsets; see
/// [`match_by_region`]. Records are sorted by ascending distance, ties
/// broken by source id.
///
/// # Errors
///
/// Returns [`MatchError::EmptyReferenceSet`] if `reference` is empty.
pub fn match_points(
    source: &[GeoPoint],
    reference: &[GeoPoint],
) -> Result<Vec<MatchRecord>, MatchError> {
    let source: Vec<&GeoPoint> = source.iter().collect();
    let reference: Vec<&GeoPoint> = reference.iter().collect();
    let region = source
        .first()
        .or_else(|| reference.first())
        .map(|p| p.region().to_string())
        .unwrap_or_default();
    match_refs(&region, &source, &reference)
}

fn match_refs(
    region: &str,
    source: &[&GeoPoint],
    reference: &[&GeoPoint],
) -> Result<Vec<MatchRecord>, MatchError> {
    if reference.is_empty() {
        return Err(MatchError::EmptyReferenceSet {
            region: region.to_string(),
        });
    }

    let index = ReferenceIndex::new(reference);
    let mut records: Vec<MatchRecord> = source
        .iter()
        .filter_map(|point| {
            index.nearest(point).map(|(nearest, km)| MatchRecord {
                source_point: (*point).clone(),
                reference_point: nearest.clone(),
                distance_km: km,
            })
        })
        .collect();

    records.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then_with(|| a.source_point.id().cmp(b.source_point.id()))
    });
    Ok(records)
}

/// Per-region outcome of [`match_by_region`].
#[derive(Debug, Default)]
pub struct RegionalMatches {
    /// Match records keyed by region code.
    pub matches: BTreeMap<String, Vec<MatchRecord>>,
    /// Regions that could not be matched, with the reason.
    pub failures: BTreeMap<String, MatchError>,
}

impl RegionalMatches {
    /// All records in region order, each region sorted by distance.
    pub fn records(&self) -> impl Iterator<Item = &MatchRecord> {
        self.matches.values().flatten()
    }

    /// Total number of match records across regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.matches.values().map(Vec::len).sum()
    }

    /// Whether no region produced any record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn group_by_region(points: &[GeoPoint]) -> BTreeMap<&str, Vec<&GeoPoint>> {
    let mut groups: BTreeMap<&str, Vec<&GeoPoint>> = BTreeMap::new();
    for point in points {
        groups.entry(point.region()).or_default().push(point);
    }
    groups
}

/// Matches source to reference points region by region.
///
/// Only same-region subsets are ever compared, so a record never pairs
/// points from different regions. A region with source points but no
/// reference points is recorded in [`RegionalMatches::failures`] and the
/// remaining regions still run.
#[must_use]
pub fn match_by_region(source: &[GeoPoint], reference: &[GeoPoint]) -> RegionalMatches {
    let source_groups = group_by_region(source);
    let reference_groups = group_by_region(reference);
    let mut result = RegionalMatches::default();

    for (region, source_points) in &source_groups {
        let reference_points = reference_groups
            .get(region)
            .map_or(&[][..], Vec::as_slice);

        match match_refs(region, source_points, reference_points) {
            Ok(records) => {
                log::debug!("[{region}] matched {} points", records.len());
                result.matches.insert((*region).to_string(), records);
            }
            Err(e) => {
                log::warn!("[{region}] {e}");
                result.failures.insert((*region).to_string(), e);
            }
        }
    }

    log::info!(
        "Matched {} points across {} regions ({} regions failed)",
        result.len(),
        result.matches.len(),
        result.failures.len(),
    );
    result
}

/// Builds one summary per region present in either dataset.
///
/// `count_within_threshold` counts records strictly closer than
/// `threshold_km`. Summaries are ordered by source count descending, then
/// region code.
#[must_use]
pub fn summarize(
    source: &[GeoPoint],
    reference: &[GeoPoint],
    regional: &RegionalMatches,
    threshold_km: f64,
) -> Vec<RegionSummary> {
    let source_groups = group_by_region(source);
    let reference_groups = group_by_region(reference);
    let regions: BTreeSet<&str> = source_groups
        .keys()
        .chain(reference_groups.keys())
        .copied()
        .collect();

    let count = |groups: &BTreeMap<&str, Vec<&GeoPoint>>, region: &str| {
        groups.get(region).map_or(0, |g| g.len() as u64)
    };

    let mut summaries: Vec<RegionSummary> = regions
        .into_iter()
        .map(|region| RegionSummary {
            region: region.to_string(),
            count_hydro: count(&source_groups, region),
            count_reference: count(&reference_groups, region),
            count_within_threshold: regional.matches.get(region).map_or(0, |records| {
                records
                    .iter()
                    .filter(|r| r.distance_km < threshold_km)
                    .count() as u64
            }),
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.count_hydro
            .cmp(&a.count_hydro)
            .then_with(|| a.region.cmp(&b.region))
    });
    summaries
}

/// Regions where the source dataset lists more facilities than the
/// reference dataset.
#[must_use]
pub fn source_surplus(summaries: &[RegionSummary]) -> Vec<&RegionSummary> {
    summaries
        .iter()
        .filter(|s| s.count_hydro > s.count_reference)
        .collect()
}

/// Builds the combined candidate list for tile acquisition.
///
/// Every hydrology point is kept. A regulatory point is added only when
/// its nearest hydrology point in the same region is at least
/// `threshold_km` away, or when the region has no hydrology points.
/// Output ids are prefixed with `hydro:` or `epa:` and every point is
/// re-tagged as [`PointSource::Candidate`].
#[must_use]
pub fn reconcile_candidates(
    hydro: &[GeoPoint],
    regulatory: &[GeoPoint],
    threshold_km: f64,
) -> Vec<GeoPoint> {
    let hydro_groups = group_by_region(hydro);
    let indexes: BTreeMap<&str, ReferenceIndex<'_>> = hydro_groups
        .iter()
        .map(|(region, points)| (*region, ReferenceIndex::new(points)))
        .collect();

    let mut candidates: Vec<GeoPoint> = hydro
        .iter()
        .map(|p| p.retag(format!("hydro:{}", p.id()), PointSource::Candidate))
        .collect();

    let mut suppressed = 0_u64;
    for point in regulatory {
        let nearest_km = indexes
            .get(point.region())
            .and_then(|index| index.nearest(point))
            .map(|(_, km)| km);

        match nearest_km {
            Some(km) if km < threshold_km => suppressed += 1,
            _ => candidates.push(point.retag(format!("epa:{}", point.id()), PointSource::Candidate)),
        }
    }

    log::info!(
        "Reconciled {} candidates ({} hydrology, {} regulatory added, {suppressed} suppressed)",
        candidates.len(),
        hydro.len(),
        candidates.len() - hydro.len(),
    );
    candidates
}
