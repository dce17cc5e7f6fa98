//! Shared parsing utilities for source adapters.
//!
//! Coordinate, WKT and text-encoding helpers used across multiple
//! adapter implementations.

/// Parses lat/lon from string fields. Returns `None` if missing,
/// unparseable, or non-finite.
///
/// Zero is a real coordinate (equator, prime meridian); range checks are
/// left to [`wwtp_point_models::GeoPoint::new`].
#[must_use]
pub fn parse_lat_lon_str(lat: Option<&str>, lon: Option<&str>) -> Option<(f64, f64)> {
    let latitude = lat?.trim().parse::<f64>().ok()?;
    let longitude = lon?.trim().parse::<f64>().ok()?;
    parse_lat_lon_f64(Some(latitude), Some(longitude))
}

/// Parses lat/lon from optional f64 fields. Returns `None` if missing or
/// non-finite.
#[must_use]
pub fn parse_lat_lon_f64(lat: Option<f64>, lon: Option<f64>) -> Option<(f64, f64)> {
    let latitude = lat?;
    let longitude = lon?;
    if !latitude.is_finite() || !longitude.is_finite() {
        return None;
    }
    Some((latitude, longitude))
}

/// Parses a WKT point (`POINT (lon lat)`) into `(lon, lat)`.
#[must_use]
pub fn parse_wkt_point(wkt: &str) -> Option<(f64, f64)> {
    let body = wkt
        .trim()
        .strip_prefix("POINT")?
        .trim()
        .strip_prefix('(')?
        .strip_suffix(')')?;

    let mut parts = body.split_whitespace();
    let lon = parts.next()?.parse::<f64>().ok()?;
    let lat = parts.next()?.parse::<f64>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((lon, lat))
}

/// Decodes ISO-8859-1 (Latin-1) bytes. Every byte maps to the Unicode
/// code point of the same value, so decoding cannot fail.
#[must_use]
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lat_lon_strings() {
        let (la, lo) = parse_lat_lon_str(Some("41.8781"), Some(" -87.6298 ")).unwrap();
        assert!((la - 41.8781).abs() < f64::EPSILON);
        assert!((lo - -87.6298).abs() < f64::EPSILON);
    }

    #[test]
    fn keeps_equator_and_prime_meridian() {
        assert_eq!(parse_lat_lon_str(Some("0.0"), Some("-87.6298")), Some((0.0, -87.6298)));
        assert_eq!(parse_lat_lon_str(Some("51.4779"), Some("0")), Some((51.4779, 0.0)));
        assert_eq!(parse_lat_lon_f64(Some(0.0), Some(0.0)), Some((0.0, 0.0)));
    }

    #[test]
    fn rejects_missing_or_garbage_lat_lon() {
        assert!(parse_lat_lon_str(None, Some("-87.6298")).is_none());
        assert!(parse_lat_lon_str(Some("abc"), Some("-87.6298")).is_none());
        assert!(parse_lat_lon_str(Some("NaN"), Some("-87.6298")).is_none());
    }

    #[test]
    fn parses_wkt_point() {
        assert_eq!(
            parse_wkt_point("POINT (-122.5 37.25)"),
            Some((-122.5, 37.25))
        );
        assert_eq!(parse_wkt_point("POINT(-1 2)"), Some((-1.0, 2.0)));
        assert!(parse_wkt_point("LINESTRING (0 0, 1 1)").is_none());
        assert!(parse_wkt_point("POINT (1 2 3)").is_none());
    }

    #[test]
    fn decodes_latin1() {
        assert_eq!(decode_latin1(b"Sa\xf1ta Fe"), "Sañta Fe");
    }
}
