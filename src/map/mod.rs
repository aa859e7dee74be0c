mod globe;
mod image;
mod projection;
mod transform;

pub use globe::Orthographic;
pub use image::{ImageDimensions, ImageTransform};
pub use projection::{EarthProjection, Equirectangular, Mercator};
pub use transform::EarthImageTransform;

/// Failures building or using the coordinate transform pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransformError {
    #[error("grid to pixel transform is not invertible (determinant {determinant})")]
    NonInvertible { determinant: f64 },

    #[error("image dimensions must be non-zero, got {width}x{height}")]
    EmptyImage { width: usize, height: usize },

    #[error("grid location ({row}, {col}) has no earth location")]
    NoEarthLocation { row: f64, col: f64 },

    #[error("earth location ({lat}, {lon}) has no grid location")]
    NoGridLocation { lat: f64, lon: f64 },
}
