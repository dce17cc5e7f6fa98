//! Geodesic distance and search windows.
//!
//! Distances are computed on the WGS84 ellipsoid with Karney's algorithm
//! (via [`geo::Geodesic`]). Search windows bound, in raw lon/lat degrees,
//! every point that could lie within a given physical distance, so a
//! lon/lat spatial index can be queried without missing candidates.

use geo::{Distance, Geodesic, Point};
use rstar::AABB;

/// Smallest radius of curvature on WGS84 (equatorial meridional), in km.
/// Using it to convert distances to angles always overestimates the angle.
const MIN_RADIUS_KM: f64 = 6_335.439;

/// Safety margin applied to search radii to absorb ellipsoidal effects.
const SEARCH_MARGIN: f64 = 1.01;

/// Geodesic distance between two `(lat, lon)` positions, in kilometres.
#[must_use]
pub fn distance_km(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    let a = Point::new(lon_a, lat_a);
    let b = Point::new(lon_b, lat_b);
    Geodesic.distance(a, b) / 1000.0
}

/// Returns lon/lat envelopes that together contain every position within
/// `radius_km` of `(lat, lon)`.
///
/// Uses the spherical-cap bounding box: the latitude span is the angular
/// radius, and the longitude span widens by `1 / cos(lat)` up to the full
/// circle when the cap reaches a pole. Windows crossing the antimeridian
/// are split in two.
#[must_use]
pub fn search_windows(lat: f64, lon: f64, radius_km: f64) -> Vec<AABB<[f64; 2]>> {
    let angular = (radius_km.max(0.0) * SEARCH_MARGIN / MIN_RADIUS_KM).min(std::f64::consts::PI);
    let angular_deg = angular.to_degrees();

    let lat_min = lat - angular_deg;
    let lat_max = lat + angular_deg;

    if lat_min <= -90.0 || lat_max >= 90.0 {
        return vec![AABB::from_corners(
            [-180.0, lat_min.max(-90.0)],
            [180.0, lat_max.min(90.0)],
        )];
    }

    let ratio = angular.sin() / lat.to_radians().cos();
    if ratio >= 1.0 {
        return vec![AABB::from_corners([-180.0, lat_min], [180.0, lat_max])];
    }
    let delta_lon = ratio.asin().to_degrees();

    let lon_min = lon - delta_lon;
    let lon_max = lon + delta_lon;

    let mut windows = vec![AABB::from_corners(
        [lon_min.max(-180.0), lat_min],
        [lon_max.min(180.0), lat_max],
    )];
    if lon_min < -180.0 {
        windows.push(AABB::from_corners([lon_min + 360.0, lat_min], [180.0, lat_max]));
    }
    if lon_max > 180.0 {
        windows.push(AABB::from_corners([-180.0, lat_min], [lon_max - 360.0, lat_max]));
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstar::Envelope as _;

    #[test]
    fn coincident_points_are_zero_apart() {
        assert!(distance_km(37.7749, -122.4194, 37.7749, -122.4194) < 1e-6);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = distance_km(0.0, 0.0, 1.0, 0.0);
        assert!((d - 110.574).abs() < 0.01, "got {d}");
    }

    #[test]
    fn longitude_compresses_at_high_latitude() {
        let equator = distance_km(0.0, 0.0, 0.0, 1.0);
        let north = distance_km(60.0, 0.0, 60.0, 1.0);
        assert!((north / equator - 0.5).abs() < 0.01);
    }

    #[test]
    fn window_contains_points_at_radius() {
        let (lat, lon) = (45.0, -100.0);
        let windows = search_windows(lat, lon, 100.0);
        assert_eq!(windows.len(), 1);

        // Due east and due north, just inside 100 km.
        for &(plat, plon) in &[(45.0, -98.74), (45.89, -100.0), (44.11, -100.0)] {
            assert!(distance_km(lat, lon, plat, plon) < 100.0);
            assert!(windows.iter().any(|w| w.contains_point(&[plon, plat])));
        }
    }

    #[test]
    fn window_splits_at_antimeridian() {
        let windows = search_windows(52.0, 179.9, 50.0);
        assert_eq!(windows.len(), 2);
        assert!(windows.iter().any(|w| w.contains_point(&[-179.9, 52.0])));
    }

    #[test]
    fn window_near_pole_spans_all_longitudes() {
        let windows = search_windows(89.9, 0.0, 50.0);
        assert_eq!(windows.len(), 1);
        assert!(windows[0].contains_point(&[179.0, 89.95]));
    }
}
