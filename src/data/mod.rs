//! Feature sources: the indexed binary database, its remote binned
//! variant and user-supplied GeoJSON files.

mod binary;
mod builder;
mod cache;
mod geojson_source;
pub mod hierarchy;
mod index;
mod perimeter;
mod record;
mod remote;

pub use binary::{BinaryFeatureStore, DataHandle};
pub use builder::DatabaseBuilder;
pub use cache::{CacheKey, CacheStats, DatabaseId, FeatureCache, PointCount};
pub use geojson_source::GeoJsonFeatureSource;
pub use index::SpatialIndex;
pub use record::{FeatureHeader, ATTRIBUTE_NAMES, HEADER_LEN};
pub use remote::{
    BinContents, BinLayout, MemoryTransport, MemoryTransportBuilder, RemoteFeatureStore, RemoteVariable, SliceTransport,
    REMOTE_ATTRIBUTE_NAMES,
};

use crate::area::EarthArea;
use crate::error::StoreResult;
use crate::feature::{Feature, PolygonFeature};

/// Sources whose contents are chosen by an area of interest.
pub trait AreaSelectable {
    /// Replace the current selection with the features touching `area`.
    /// On error the previous selection is kept.
    fn select(&mut self, area: &EarthArea) -> StoreResult<()>;

    /// Area of the current selection
    fn area(&self) -> &EarthArea;
}

/// Sources of line features.
pub trait FeatureSource: AreaSelectable {
    /// Features of the last selection. Restart by selecting again.
    fn features(&self) -> std::slice::Iter<'_, Feature>;
}

/// Sources that can also deliver sentinel-delimited polygon groups.
pub trait PolygonSource: FeatureSource {
    fn polygons(&self) -> std::slice::Iter<'_, PolygonFeature>;
}
