//! Cylindrical equal-area projection (`+proj=cea`) on the GRS80 ellipsoid.
//!
//! Facility outlines are centroided in this projection rather than in raw
//! lon/lat degrees, which over-weights high-latitude vertices. Formulas
//! follow Snyder, *Map Projections: A Working Manual*, pp. 76-85, with the
//! standard parallel at the equator.

use geo::{Area, Centroid, Coord, LineString, Polygon};
use wwtp_point_models::BoundingGeometry;

/// GRS80 semi-major axis in metres.
const SEMI_MAJOR_M: f64 = 6_378_137.0;

/// GRS80 flattening.
const FLATTENING: f64 = 1.0 / 298.257_222_101;

fn eccentricity_sq() -> f64 {
    FLATTENING.mul_add(-FLATTENING, 2.0 * FLATTENING)
}

/// Snyder's `q` function (eq. 3-12).
fn authalic_q(phi: f64) -> f64 {
    let e2 = eccentricity_sq();
    let e = e2.sqrt();
    let sin_phi = phi.sin();
    let es = e * sin_phi;

    (1.0 - e2)
        * (sin_phi / es.mul_add(-es, 1.0) - (1.0 / (2.0 * e)) * ((1.0 - es) / (1.0 + es)).ln())
}

/// Projects `(lon, lat)` degrees to planar `(x, y)` metres.
#[must_use]
pub fn forward(lon: f64, lat: f64) -> (f64, f64) {
    let x = SEMI_MAJOR_M * lon.to_radians();
    let y = SEMI_MAJOR_M * authalic_q(lat.to_radians()) / 2.0;
    (x, y)
}

/// Inverse of [`forward`]: planar `(x, y)` metres to `(lon, lat)` degrees.
#[must_use]
pub fn inverse(x: f64, y: f64) -> (f64, f64) {
    let e2 = eccentricity_sq();
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    let q_p = authalic_q(std::f64::consts::FRAC_PI_2);

    let beta = (2.0 * y / (SEMI_MAJOR_M * q_p)).clamp(-1.0, 1.0).asin();

    // Series for latitude from authalic latitude (Snyder eq. 3-18).
    let phi = beta
        + (e2 / 3.0 + 31.0 * e4 / 180.0 + 517.0 * e6 / 5040.0) * (2.0 * beta).sin()
        + (23.0 * e4 / 360.0 + 251.0 * e6 / 3780.0) * (4.0 * beta).sin()
        + (761.0 * e6 / 45360.0) * (6.0 * beta).sin();

    let lon = (x / SEMI_MAJOR_M).to_degrees();
    (lon, phi.to_degrees())
}

/// Wraps a longitude into `[-180, 180]`.
fn wrap_lon(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && lon > 0.0 {
        180.0
    } else {
        wrapped
    }
}

/// Computes the area centroid of a facility outline in the equal-area
/// projection and returns it as `(lon, lat)` degrees.
///
/// Longitudes are unwrapped relative to the first vertex before projecting
/// so that rings straddling the antimeridian stay contiguous.
///
/// Returns `None` for rings with fewer than three distinct vertices or
/// zero area.
#[must_use]
pub fn equal_area_centroid(ring: &BoundingGeometry) -> Option<(f64, f64)> {
    if ring.distinct_len() < 3 {
        return None;
    }

    let anchor = ring.vertices().first()?.0;
    let coords: Vec<Coord<f64>> = ring
        .vertices()
        .iter()
        .map(|&(lon, lat)| {
            let mut delta = lon - anchor;
            if delta > 180.0 {
                delta -= 360.0;
            } else if delta < -180.0 {
                delta += 360.0;
            }
            let (x, y) = forward(anchor + delta, lat);
            Coord { x, y }
        })
        .collect();

    let polygon = Polygon::new(LineString::from(coords), vec![]);
    if polygon.unsigned_area() <= 0.0 {
        return None;
    }

    let centroid = polygon.centroid()?;
    let (lon, lat) = inverse(centroid.x(), centroid.y());
    Some((wrap_lon(lon), lat))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_inverse_roundtrip() {
        for &(lon, lat) in &[(0.0, 0.0), (-122.4, 37.8), (151.2, -33.9), (-149.9, 61.2)] {
            let (x, y) = forward(lon, lat);
            let (lon2, lat2) = inverse(x, y);
            assert!((lon - lon2).abs() < 1e-9, "lon {lon} -> {lon2}");
            assert!((lat - lat2).abs() < 1e-6, "lat {lat} -> {lat2}");
        }
    }

    #[test]
    fn equator_maps_to_zero() {
        let (x, y) = forward(0.0, 0.0);
        assert!(x.abs() < 1e-9);
        assert!(y.abs() < 1e-9);
    }

    #[test]
    fn symmetric_square_centroid_is_its_center_longitude() {
        let ring = BoundingGeometry::closed(vec![
            (-100.01, 40.0),
            (-99.99, 40.0),
            (-99.99, 40.02),
            (-100.01, 40.02),
        ]);
        let (lon, lat) = equal_area_centroid(&ring).unwrap();
        assert!((lon - -100.0).abs() < 1e-9);
        assert!(lat > 40.0 && lat < 40.02);
        assert!((lat - 40.01).abs() < 1e-4);
    }

    #[test]
    fn high_latitude_centroid_shifts_toward_equator() {
        // A large 1°-tall band at 70°N: equal-area weighting pulls the
        // centroid below the naive degree midpoint.
        let ring = BoundingGeometry::closed(vec![
            (10.0, 70.0),
            (12.0, 70.0),
            (12.0, 72.0),
            (10.0, 72.0),
        ]);
        let (_, lat) = equal_area_centroid(&ring).unwrap();
        assert!(lat < 71.0);
        assert!(lat > 70.5);
    }

    #[test]
    fn antimeridian_ring_stays_contiguous() {
        let ring = BoundingGeometry::closed(vec![
            (179.99, 51.0),
            (-179.99, 51.0),
            (-179.99, 51.01),
            (179.99, 51.01),
        ]);
        let (lon, lat) = equal_area_centroid(&ring).unwrap();
        assert!(lon.abs() > 179.98, "centroid lon {lon} should sit on the antimeridian");
        assert!(lat > 51.0 && lat < 51.01);
    }

    #[test]
    fn degenerate_rings_have_no_centroid() {
        let line = BoundingGeometry::closed(vec![(0.0, 0.0), (1.0, 1.0)]);
        assert!(equal_area_centroid(&line).is_none());

        let collinear = BoundingGeometry::closed(vec![(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]);
        assert!(equal_area_centroid(&collinear).is_none());
    }
}
