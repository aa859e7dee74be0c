//! Vector coastline and border retrieval, projection and rendering for
//! raster Earth views.
//!
//! Features are read from an indexed binary database, a remote binned
//! database or GeoJSON, selected by an [`EarthArea`] of 1°×1° cells, and
//! drawn through an [`EarthImageTransform`] into any [`RenderTarget`].
//! Segments that tear across a projection seam are detected and broken
//! instead of being drawn across the image.

pub mod area;
pub mod braille;
pub mod config;
pub mod data;
pub mod error;
pub mod feature;
pub mod geo;
pub mod map;
pub mod render;

pub use area::EarthArea;
pub use config::{RenderOptions, Resolution, StoreConfig};
pub use data::{AreaSelectable, BinaryFeatureStore, FeatureSource, PolygonSource};
pub use error::{StoreError, StoreResult};
pub use feature::{AttributeNamed, AttributeValue, Feature, PolygonFeature, PolygonLevel};
pub use geo::{GeographicLocation, GridLocation, PixelPoint};
pub use map::{EarthImageTransform, EarthProjection, ImageDimensions, TransformError};
pub use render::{FillRule, PathAssembler, PolygonWindingAssembler, RenderStats, RenderTarget};
