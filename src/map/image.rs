use std::sync::OnceLock;

use glam::{DAffine2, DMat2, DVec2};

use crate::geo::{GridLocation, PixelPoint};
use crate::map::TransformError;

/// Pixel size of the output image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageDimensions {
    pub width: usize,
    pub height: usize,
}

impl ImageDimensions {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }
}

/// Per-axis pixel to grid lookups for integer pixels inside the image.
/// The affine has no shear, so a pixel's row depends only on y and its
/// column only on x.
#[derive(Debug)]
struct PixelLookup {
    rows: Vec<f64>,
    cols: Vec<f64>,
}

/// Affine mapping between data grid (row, col) and image pixels (x, y).
///
/// The grid location `center` lands on the middle of the image and one grid
/// cell spans `1 / scale` pixels. Rows run down the image and columns across.
#[derive(Debug)]
pub struct ImageTransform {
    dims: ImageDimensions,
    center: GridLocation,
    scale: f64,
    grid_to_pixel: DAffine2,
    pixel_to_grid: DAffine2,
    lookup: OnceLock<PixelLookup>,
}

impl ImageTransform {
    /// Build the transform. Fails if the dimensions are empty or the
    /// resulting affine cannot be inverted (zero or non-finite scale).
    pub fn new(dims: ImageDimensions, center: GridLocation, scale: f64) -> Result<Self, TransformError> {
        if dims.width == 0 || dims.height == 0 {
            return Err(TransformError::EmptyImage {
                width: dims.width,
                height: dims.height,
            });
        }

        // Grid to pixel, applied right to left: move the centre to the
        // origin, scale to pixels, move to the middle of the image, then
        // swap (row, col) into (x, y).
        let swap = DAffine2::from_mat2(DMat2::from_cols(DVec2::new(0.0, 1.0), DVec2::new(1.0, 0.0)));
        let half = DVec2::new(dims.height as f64 / 2.0, dims.width as f64 / 2.0);
        let grid_to_pixel = swap
            * DAffine2::from_translation(half)
            * DAffine2::from_scale(DVec2::splat(1.0 / scale))
            * DAffine2::from_translation(-center.as_vec());

        let determinant = grid_to_pixel.matrix2.determinant();
        if !determinant.is_finite() || determinant.abs() < f64::EPSILON || !grid_to_pixel.is_finite() {
            return Err(TransformError::NonInvertible { determinant });
        }
        let pixel_to_grid = grid_to_pixel.inverse();
        if !pixel_to_grid.is_finite() {
            return Err(TransformError::NonInvertible { determinant });
        }

        Ok(Self {
            dims,
            center,
            scale,
            grid_to_pixel,
            pixel_to_grid,
            lookup: OnceLock::new(),
        })
    }

    /// Replace the view parameters. On error the transform is unchanged.
    pub fn reconfigure(&mut self, dims: ImageDimensions, center: GridLocation, scale: f64) -> Result<(), TransformError> {
        *self = Self::new(dims, center, scale)?;
        Ok(())
    }

    pub fn resize(&mut self, dims: ImageDimensions) -> Result<(), TransformError> {
        self.reconfigure(dims, self.center, self.scale)
    }

    pub fn dimensions(&self) -> ImageDimensions {
        self.dims
    }

    pub fn center(&self) -> GridLocation {
        self.center
    }

    /// Grid cells per pixel
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Grid location to pixel. Returns `None` for an invalid grid location.
    #[inline(always)]
    pub fn grid_to_pixel(&self, grid: &GridLocation) -> Option<PixelPoint> {
        if !grid.is_valid() {
            return None;
        }
        Some(self.grid_to_pixel.transform_point2(grid.as_vec()))
    }

    /// Pixel to grid location.
    #[inline(always)]
    pub fn pixel_to_grid(&self, pixel: PixelPoint) -> GridLocation {
        let v = self.pixel_to_grid.transform_point2(pixel);
        GridLocation::new(v.x, v.y)
    }

    /// Pixel to grid location for an integer pixel. Pixels inside the image
    /// are answered from lookup tables built on first use.
    pub fn pixel_to_grid_at(&self, x: i64, y: i64) -> GridLocation {
        let in_bounds = x >= 0 && y >= 0 && (x as usize) < self.dims.width && (y as usize) < self.dims.height;
        if !in_bounds {
            return self.pixel_to_grid(DVec2::new(x as f64, y as f64));
        }
        let lookup = self.lookup.get_or_init(|| self.build_lookup());
        GridLocation::new(lookup.rows[y as usize], lookup.cols[x as usize])
    }

    fn build_lookup(&self) -> PixelLookup {
        let rows = (0..self.dims.height)
            .map(|y| self.pixel_to_grid(DVec2::new(0.0, y as f64)).row)
            .collect();
        let cols = (0..self.dims.width)
            .map(|x| self.pixel_to_grid(DVec2::new(x as f64, 0.0)).col)
            .collect();
        PixelLookup { rows, cols }
    }
}
