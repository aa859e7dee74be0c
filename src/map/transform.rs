use std::sync::Arc;

use glam::DVec2;

use crate::geo::{GeographicLocation, GridLocation, PixelPoint};
use crate::map::{EarthProjection, ImageDimensions, ImageTransform, TransformError};

/// Geographic location <-> image pixel pipeline: an earth projection to the
/// data grid followed by the grid-to-image affine.
///
/// Projected path caches are keyed on the identity of a shared
/// `Arc<EarthImageTransform>`; changing the view means building a new one.
#[derive(Debug)]
pub struct EarthImageTransform {
    projection: Arc<dyn EarthProjection>,
    image: ImageTransform,
}

impl EarthImageTransform {
    pub fn new(projection: Arc<dyn EarthProjection>, image: ImageTransform) -> Self {
        Self { projection, image }
    }

    /// Pipeline with `center` in the middle of an image of `dims` pixels and
    /// `scale` grid cells per pixel.
    pub fn centered(
        projection: Arc<dyn EarthProjection>,
        dims: ImageDimensions,
        center: &GeographicLocation,
        scale: f64,
    ) -> Result<Self, TransformError> {
        let grid = projection.geo_to_grid(center);
        if !grid.is_valid() {
            return Err(TransformError::NoGridLocation {
                lat: center.lat,
                lon: center.lon,
            });
        }
        let image = ImageTransform::new(dims, grid, scale)?;
        Ok(Self { projection, image })
    }

    pub fn projection(&self) -> &Arc<dyn EarthProjection> {
        &self.projection
    }

    pub fn image(&self) -> &ImageTransform {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut ImageTransform {
        &mut self.image
    }

    /// Project to pixel space. `None` when the projection has no grid
    /// location for this point.
    #[inline(always)]
    pub fn geo_to_pixel(&self, loc: &GeographicLocation) -> Option<PixelPoint> {
        self.image.grid_to_pixel(&self.projection.geo_to_grid(loc))
    }

    /// Pixel back to a geographic location, invalid off the projection.
    pub fn pixel_to_geo(&self, pixel: PixelPoint) -> GeographicLocation {
        self.projection.grid_to_geo(&self.image.pixel_to_grid(pixel))
    }

    /// Integer pixel back to a geographic location using the cached
    /// per-axis lookups.
    pub fn pixel_to_geo_at(&self, x: i64, y: i64) -> GeographicLocation {
        self.projection.grid_to_geo(&self.image.pixel_to_grid_at(x, y))
    }

    pub fn grid_to_pixel(&self, grid: &GridLocation) -> Option<PixelPoint> {
        self.image.grid_to_pixel(grid)
    }

    pub fn pixel_to_grid(&self, pixel: PixelPoint) -> GridLocation {
        self.image.pixel_to_grid(pixel)
    }

    /// Local image resolution in kilometres per pixel: half the ground
    /// distance spanned by the pixels either side, the smaller of the
    /// horizontal and vertical spans. NaN if any neighbour is off the
    /// projection.
    pub fn resolution_at(&self, pixel: PixelPoint) -> f64 {
        let left = self.pixel_to_geo(pixel - DVec2::X);
        let right = self.pixel_to_geo(pixel + DVec2::X);
        let up = self.pixel_to_geo(pixel - DVec2::Y);
        let down = self.pixel_to_geo(pixel + DVec2::Y);

        let horizontal = left.distance(&right) / 2.0;
        let vertical = up.distance(&down) / 2.0;
        if horizontal.is_nan() || vertical.is_nan() {
            return f64::NAN;
        }
        horizontal.min(vertical)
    }
}
