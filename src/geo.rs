use glam::DVec2;
use serde::{Deserialize, Serialize};

/// Mean radius of the standard sphere in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6370.997;

/// A point in final image space, x to the right and y down.
pub type PixelPoint = DVec2;

/// Reference datum tag carried alongside a location.
/// The core never converts between datums, it only keeps the tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Datum {
    Wgs84,
    Nad83,
    Nad27,
    Sphere,
}

/// A latitude/longitude pair in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeographicLocation {
    pub lat: f64,
    /// Longitude in [-180, 180)
    pub lon: f64,
    pub datum: Option<Datum>,
}

impl GeographicLocation {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon: lon_range(lon),
            datum: None,
        }
    }

    pub fn with_datum(lat: f64, lon: f64, datum: Datum) -> Self {
        Self {
            datum: Some(datum),
            ..Self::new(lat, lon)
        }
    }

    /// Location with NaN coordinates, used when a transform has no answer.
    pub fn invalid() -> Self {
        Self {
            lat: f64::NAN,
            lon: f64::NAN,
            datum: None,
        }
    }

    #[inline(always)]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }

    /// Great circle distance in kilometres (haversine).
    pub fn distance(&self, other: &GeographicLocation) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = lat2 - lat1;
        let dlon = other.lon.to_radians() - self.lon.to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().min(1.0).asin();
        EARTH_RADIUS_KM * c
    }

    /// Shift by a latitude/longitude delta. Crossing a pole reflects the
    /// latitude and moves to the opposite meridian.
    pub fn translate(&self, dlat: f64, dlon: f64) -> Self {
        let mut lat = self.lat + dlat;
        let mut lon = self.lon;
        if lat > 90.0 {
            lat = 180.0 - lat;
            lon += 180.0;
        } else if lat < -90.0 {
            lat = -180.0 - lat;
            lon += 180.0;
        }
        Self {
            lat,
            lon: lon_range(lon + dlon),
            datum: self.datum,
        }
    }

    /// 1° cell containing this location as (lat, lon) integer degrees.
    /// The north pole is folded into the topmost row.
    #[inline(always)]
    pub fn cell(&self) -> (i32, i32) {
        let mut lat = self.lat.floor() as i32;
        if lat == 90 {
            lat = 89;
        }
        (lat, self.lon.floor() as i32)
    }
}

/// Wrap a longitude into [-180, 180)
#[inline(always)]
pub fn lon_range(lon: f64) -> f64 {
    if !lon.is_finite() {
        return lon;
    }
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// A (row, column) coordinate in a data grid's index space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridLocation {
    pub row: f64,
    pub col: f64,
}

impl GridLocation {
    pub fn new(row: f64, col: f64) -> Self {
        Self { row, col }
    }

    /// "No corresponding grid cell"
    pub fn invalid() -> Self {
        Self {
            row: f64::NAN,
            col: f64::NAN,
        }
    }

    #[inline(always)]
    pub fn is_valid(&self) -> bool {
        self.row.is_finite() && self.col.is_finite()
    }

    /// True when inside the inclusive rectangle spanned by `min` and `max`.
    pub fn is_contained(&self, min: &GridLocation, max: &GridLocation) -> bool {
        self.row >= min.row && self.row <= max.row && self.col >= min.col && self.col <= max.col
    }

    #[inline(always)]
    pub(crate) fn as_vec(&self) -> DVec2 {
        DVec2::new(self.row, self.col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lon_range_wraps() {
        assert_eq!(lon_range(180.0), -180.0);
        assert_eq!(lon_range(190.0), -170.0);
        assert_eq!(lon_range(-190.0), 170.0);
        assert_eq!(lon_range(359.5), -0.5);
        assert_eq!(lon_range(12.5), 12.5);
    }

    #[test]
    fn test_distance_quarter_meridian() {
        let equator = GeographicLocation::new(0.0, 0.0);
        let pole = GeographicLocation::new(90.0, 0.0);
        let expected = EARTH_RADIUS_KM * std::f64::consts::FRAC_PI_2;
        assert!((equator.distance(&pole) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_distance_across_antimeridian_is_short() {
        let a = GeographicLocation::new(0.0, 179.9);
        let b = GeographicLocation::new(0.0, -179.9);
        // 0.2 degrees of arc
        let expected = EARTH_RADIUS_KM * 0.2_f64.to_radians();
        assert!((a.distance(&b) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_translate_over_pole() {
        let loc = GeographicLocation::new(89.5, 10.0);
        let moved = loc.translate(1.0, 0.0);
        assert!((moved.lat - 89.5).abs() < 1e-12);
        assert!((moved.lon - (-170.0)).abs() < 1e-12);
    }

    #[test]
    fn test_cell_folds_pole() {
        assert_eq!(GeographicLocation::new(90.0, 0.0).cell(), (89, 0));
        assert_eq!(GeographicLocation::new(-0.5, -0.5).cell(), (-1, -1));
    }

    #[test]
    fn test_invalid_grid_location() {
        assert!(!GridLocation::invalid().is_valid());
        assert!(GridLocation::new(1.0, 2.0).is_valid());
    }
}
