use glam::DVec3;

use crate::geo::{lon_range, GeographicLocation, GridLocation};
use crate::map::EarthProjection;

/// Orthographic projection of the sphere as seen from far above a centre
/// point. Orientation is stored as three orthonormal basis vectors.
///
/// Grid rows grow southward and columns eastward from `center_grid`; the
/// visible disk has a radius of `radius` grid cells. Points on the far
/// hemisphere have no grid location.
#[derive(Clone, Debug)]
pub struct Orthographic {
    /// Direction from the sphere centre to the view centre
    forward: DVec3,
    /// Points east at the view centre
    right: DVec3,
    /// Points north at the view centre
    up: DVec3,
    radius: f64,
    center_grid: GridLocation,
}

impl Orthographic {
    /// Build a view centred on (lat, lon) with the disk centre at grid
    /// (radius, radius), so the whole disk lies in positive grid space.
    pub fn new(center_lat: f64, center_lon: f64, radius: f64) -> Self {
        Self::with_grid_center(center_lat, center_lon, radius, GridLocation::new(radius, radius))
    }

    pub fn with_grid_center(center_lat: f64, center_lon: f64, radius: f64, center_grid: GridLocation) -> Self {
        let forward = lonlat_to_vec3(center_lon, center_lat);
        let lat_rad = center_lat.to_radians();
        let lon_rad = center_lon.to_radians();

        // Derivative of forward w.r.t. latitude (points north)
        let raw_up = DVec3::new(
            -lat_rad.sin() * lon_rad.cos(),
            -lat_rad.sin() * lon_rad.sin(),
            lat_rad.cos(),
        );

        // East = up × forward, then re-orthogonalize up
        let right = raw_up.cross(forward).normalize();
        let up = forward.cross(right).normalize();

        Self {
            forward,
            right,
            up,
            radius,
            center_grid,
        }
    }

    /// Geographic centre of the view
    pub fn center(&self) -> GeographicLocation {
        let lat = self.forward.z.clamp(-1.0, 1.0).asin().to_degrees();
        let lon = self.forward.y.atan2(self.forward.x).to_degrees();
        GeographicLocation::new(lat, lon)
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }
}

impl EarthProjection for Orthographic {
    fn geo_to_grid(&self, loc: &GeographicLocation) -> GridLocation {
        if !loc.is_valid() {
            return GridLocation::invalid();
        }
        let p = lonlat_to_vec3(loc.lon, loc.lat);

        // Dot with forward: negative is the far side
        if p.dot(self.forward) < 0.0 {
            return GridLocation::invalid();
        }

        let sx = p.dot(self.right);
        let sy = p.dot(self.up);
        GridLocation::new(
            self.center_grid.row - sy * self.radius,
            self.center_grid.col + sx * self.radius,
        )
    }

    fn grid_to_geo(&self, grid: &GridLocation) -> GeographicLocation {
        if !grid.is_valid() {
            return GeographicLocation::invalid();
        }
        let sx = (grid.col - self.center_grid.col) / self.radius;
        let sy = -(grid.row - self.center_grid.row) / self.radius;

        let r2 = sx * sx + sy * sy;
        if r2 > 1.0 {
            return GeographicLocation::invalid();
        }

        // Reconstruct the point on the near hemisphere
        let sz = (1.0 - r2).sqrt();
        let p = self.right * sx + self.up * sy + self.forward * sz;

        let lat = p.z.clamp(-1.0, 1.0).asin().to_degrees();
        let lon = p.y.atan2(p.x).to_degrees();
        GeographicLocation::new(lat, lon_range(lon))
    }
}

/// Convert lon/lat (degrees) to a unit sphere vector.
#[inline(always)]
fn lonlat_to_vec3(lon: f64, lat: f64) -> DVec3 {
    let lon_rad = lon.to_radians();
    let lat_rad = lat.to_radians();
    DVec3::new(
        lat_rad.cos() * lon_rad.cos(),
        lat_rad.cos() * lon_rad.sin(),
        lat_rad.sin(),
    )
}
