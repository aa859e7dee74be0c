use std::f64::consts::PI;

use crate::geo::{lon_range, Datum, GeographicLocation, GridLocation};

/// Highest latitude Mercator keeps finite grid rows for
pub const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// Geographic <-> data grid mapping supplied by the caller.
///
/// Implementations report failure with invalid (NaN) locations rather than
/// errors; points off the visible hemisphere, at a singular pole or outside
/// the grid's coverage are ordinary input.
pub trait EarthProjection: Send + Sync + std::fmt::Debug {
    fn geo_to_grid(&self, loc: &GeographicLocation) -> GridLocation;

    fn grid_to_geo(&self, grid: &GridLocation) -> GeographicLocation;

    fn datum(&self) -> Option<Datum> {
        None
    }
}

/// Plate carrée grid with its north-west corner at (`north`, `west`) and a
/// fixed number of degrees per grid cell. Longitudes map to one turn of
/// columns starting at `west`, so the seam sits at `west + 360`; columns
/// outside that turn wrap around the globe.
#[derive(Clone, Debug)]
pub struct Equirectangular {
    north: f64,
    west: f64,
    resolution: f64,
}

impl Equirectangular {
    pub fn new(north: f64, west: f64, resolution: f64) -> Self {
        Self {
            north,
            west: lon_range(west),
            resolution,
        }
    }

    /// Whole-world grid at the given degrees per cell, seam on the
    /// antimeridian.
    pub fn world(resolution: f64) -> Self {
        Self::new(90.0, -180.0, resolution)
    }
}

impl EarthProjection for Equirectangular {
    fn geo_to_grid(&self, loc: &GeographicLocation) -> GridLocation {
        if !loc.is_valid() || loc.lat.abs() > 90.0 {
            return GridLocation::invalid();
        }
        let east_of_west = (loc.lon - self.west).rem_euclid(360.0);
        GridLocation::new(
            (self.north - loc.lat) / self.resolution,
            east_of_west / self.resolution,
        )
    }

    fn grid_to_geo(&self, grid: &GridLocation) -> GeographicLocation {
        if !grid.is_valid() {
            return GeographicLocation::invalid();
        }
        let lat = self.north - grid.row * self.resolution;
        if !(-90.0..=90.0).contains(&lat) {
            return GeographicLocation::invalid();
        }
        GeographicLocation::new(lat, self.west + grid.col * self.resolution)
    }
}

/// Spherical Mercator over a square grid of `size` cells per side,
/// centred on `center_lon`. Rows run from north to south.
#[derive(Clone, Debug)]
pub struct Mercator {
    center_lon: f64,
    size: f64,
}

impl Mercator {
    pub fn new(center_lon: f64, size: f64) -> Self {
        Self {
            center_lon: lon_range(center_lon),
            size,
        }
    }
}

impl EarthProjection for Mercator {
    fn geo_to_grid(&self, loc: &GeographicLocation) -> GridLocation {
        if !loc.is_valid() || loc.lat.abs() > MERCATOR_MAX_LAT {
            return GridLocation::invalid();
        }
        // Normalized Web Mercator coordinates in [0, 1)
        let x = (loc.lon - self.center_lon + 180.0).rem_euclid(360.0) / 360.0;
        let lat_rad = loc.lat.to_radians();
        let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0;

        GridLocation::new(y * self.size, x * self.size)
    }

    fn grid_to_geo(&self, grid: &GridLocation) -> GeographicLocation {
        if !grid.is_valid() {
            return GeographicLocation::invalid();
        }
        let x = grid.col / self.size;
        let y = grid.row / self.size;
        if !(0.0..1.0).contains(&x) || !(0.0..=1.0).contains(&y) {
            return GeographicLocation::invalid();
        }

        let lon = x * 360.0 - 180.0 + self.center_lon;
        // Inverse Mercator for latitude
        let lat = (PI * (1.0 - 2.0 * y)).sinh().atan().to_degrees();
        GeographicLocation::new(lat, lon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn test_equirectangular_round_trip() {
        let proj = Equirectangular::world(0.25);
        let loc = GeographicLocation::new(-33.9, 151.2);
        let grid = proj.geo_to_grid(&loc);
        assert_close(grid.row, (90.0 + 33.9) / 0.25);
        let back = proj.grid_to_geo(&grid);
        assert_close(back.lat, loc.lat);
        assert_close(back.lon, loc.lon);
    }

    #[test]
    fn test_equirectangular_seam_is_far_apart() {
        let proj = Equirectangular::world(1.0);
        let east = proj.geo_to_grid(&GeographicLocation::new(0.0, 179.9));
        let west = proj.geo_to_grid(&GeographicLocation::new(0.0, -179.9));
        assert!((east.col - west.col).abs() > 359.0);
    }

    #[test]
    fn test_equirectangular_outside_coverage() {
        let proj = Equirectangular::world(1.0);
        assert!(!proj.grid_to_geo(&GridLocation::new(-5.0, 10.0)).is_valid());
        assert!(!proj.geo_to_grid(&GeographicLocation::invalid()).is_valid());

        // Past the seam wraps back onto the globe
        let wrapped = proj.grid_to_geo(&GridLocation::new(5.0, 361.0));
        assert!((wrapped.lon - (-179.0)).abs() < 1e-9);
    }

    #[test]
    fn test_mercator_center() {
        let proj = Mercator::new(0.0, 100.0);
        let grid = proj.geo_to_grid(&GeographicLocation::new(0.0, 0.0));
        assert_close(grid.row, 50.0);
        assert_close(grid.col, 50.0);
    }

    #[test]
    fn test_mercator_pole_is_singular() {
        let proj = Mercator::new(0.0, 100.0);
        assert!(!proj.geo_to_grid(&GeographicLocation::new(90.0, 0.0)).is_valid());
        assert!(!proj.geo_to_grid(&GeographicLocation::new(-89.0, 0.0)).is_valid());
    }

    #[test]
    fn test_mercator_round_trip() {
        let proj = Mercator::new(-30.0, 512.0);
        let loc = GeographicLocation::new(51.5, -0.1);
        let back = proj.grid_to_geo(&proj.geo_to_grid(&loc));
        assert!((back.lat - loc.lat).abs() < 1e-9);
        assert!((back.lon - loc.lon).abs() < 1e-9);
    }
}
