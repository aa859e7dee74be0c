//! Indexed binary feature database.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::cache::{CacheKey, DatabaseId, FeatureCache};
use super::hierarchy;
use super::index::SpatialIndex;
use super::record::{parse_points, FeatureHeader, ATTRIBUTE_NAMES, HEADER_LEN};
use super::{AreaSelectable, FeatureSource, PolygonSource};
use crate::area::EarthArea;
use crate::config::{Resolution, StoreConfig};
use crate::error::{StoreError, StoreResult};
use crate::feature::{AttributeNamed, Feature, PolygonFeature};
use crate::geo::GeographicLocation;

fn open_file(path: &Path) -> StoreResult<File> {
    File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => StoreError::NotFound(path.to_path_buf()),
        _ => StoreError::Io(e),
    })
}

/// Random access to the records of a data file.
///
/// One file handle behind a mutex; every seek and its read happen under
/// the same lock.
#[derive(Debug)]
pub struct DataHandle {
    file: Mutex<File>,
    len: u64,
    path: PathBuf,
}

impl DataHandle {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let file = open_file(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            len,
            path: path.to_path_buf(),
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }

    pub fn read_header_at(&self, offset: u64) -> StoreResult<FeatureHeader> {
        if offset.saturating_add(HEADER_LEN) > self.len {
            return Err(StoreError::decode(
                offset,
                format!("header runs past the end of {} byte data file", self.len),
            ));
        }
        let mut buf = [0u8; HEADER_LEN as usize];
        self.read_exact_at(offset, &mut buf)?;
        FeatureHeader::parse(&buf, offset)
    }

    pub fn read_feature_body(&self, header: &FeatureHeader) -> StoreResult<Vec<GeographicLocation>> {
        let start = header.offset + HEADER_LEN;
        if start.saturating_add(header.body_len()) > self.len {
            return Err(StoreError::decode(
                header.offset,
                format!("{} points run past the end of the data file", header.point_count),
            ));
        }
        let mut buf = vec![0u8; header.body_len() as usize];
        self.read_exact_at(start, &mut buf)?;
        parse_points(&buf, header)
    }
}

enum Backing {
    Indexed { index: SpatialIndex, data: DataHandle },
    /// Every record of an index-less file, read once at open
    Resident(Vec<(FeatureHeader, Feature)>),
}

/// Feature store over a binary database.
///
/// With an index, a select reads only records referenced by the area's
/// cells, decoding through the cache and splitting each feature against
/// the area. Without one, every record is held in memory and a select
/// returns all of them whole.
pub struct BinaryFeatureStore {
    name: String,
    database: DatabaseId,
    backing: Backing,
    config: StoreConfig,
    cache: Arc<FeatureCache>,
    attribute_names: Vec<String>,
    area: EarthArea,
    features: Vec<Feature>,
    polygons: Vec<PolygonFeature>,
}

impl std::fmt::Debug for BinaryFeatureStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryFeatureStore")
            .field("name", &self.name)
            .field("indexed", &self.is_indexed())
            .field("features", &self.features.len())
            .field("polygons", &self.polygons.len())
            .finish()
    }
}

impl BinaryFeatureStore {
    pub fn open(index_path: impl AsRef<Path>, data_path: impl AsRef<Path>, config: StoreConfig) -> StoreResult<Self> {
        let data_path = data_path.as_ref();
        let index = SpatialIndex::open(index_path)?;
        let data = DataHandle::open(data_path)?;
        let name = database_name(data_path);
        let identity = std::fs::canonicalize(data_path).unwrap_or_else(|_| data_path.to_path_buf());
        let database = DatabaseId::from_name(&identity.to_string_lossy());
        info!(
            database = %name,
            bytes = data.len(),
            records = index.record_refs(),
            "opened feature database"
        );
        Ok(Self::with_backing(name, database, Backing::Indexed { index, data }, config))
    }

    /// Open `<name>.index` and `<name>.b` in `dir`.
    pub fn open_named(dir: impl AsRef<Path>, name: &str, config: StoreConfig) -> StoreResult<Self> {
        let dir = dir.as_ref();
        Self::open(dir.join(format!("{name}.index")), dir.join(format!("{name}.b")), config)
    }

    /// Open the database whose nominal resolution is closest to `km`.
    pub fn open_resolution(dir: impl AsRef<Path>, km: f64, config: StoreConfig) -> StoreResult<Self> {
        Self::open_named(dir, Resolution::closest(km).database_name(), config)
    }

    /// Open a data file without an index, reading it whole.
    pub fn open_single(path: impl AsRef<Path>, config: StoreConfig) -> StoreResult<Self> {
        let path = path.as_ref();
        let file = open_file(path)?;
        Self::from_reader(&database_name(path), BufReader::new(file), config)
    }

    /// Read every record from a stream of concatenated records.
    pub fn from_reader<R: Read>(name: &str, mut reader: R, config: StoreConfig) -> StoreResult<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;

        let mut records = Vec::new();
        let mut offset = 0usize;
        while offset < bytes.len() {
            let header = FeatureHeader::parse(&bytes[offset..], offset as u64)?;
            let body = offset + HEADER_LEN as usize;
            let points = parse_points(&bytes[body..], &header)?;
            offset = body + header.body_len() as usize;
            let feature = decode_feature(&header, points);
            records.push((header, feature));
        }
        info!(database = name, records = records.len(), "read feature stream");

        let mut store = Self::with_backing(name.to_string(), DatabaseId::unique(), Backing::Resident(records), config);
        store.select(&EarthArea::world())?;
        Ok(store)
    }

    fn with_backing(name: String, database: DatabaseId, backing: Backing, config: StoreConfig) -> Self {
        Self {
            database,
            name,
            backing,
            cache: Arc::new(FeatureCache::new(config.cache_points)),
            config,
            attribute_names: ATTRIBUTE_NAMES.iter().map(|n| n.to_string()).collect(),
            area: EarthArea::new(),
            features: Vec::new(),
            polygons: Vec::new(),
        }
    }

    /// Share a cache with other stores. Entries are keyed by the canonical
    /// data file path, so stores over different files never see each
    /// other's features.
    pub fn with_cache(mut self, cache: Arc<FeatureCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &Arc<FeatureCache> {
        &self.cache
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database(&self) -> DatabaseId {
        self.database
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self.backing, Backing::Indexed { .. })
    }

    /// Whether a record survives the minimum area rule. Only polygons
    /// carry an area; lines always pass.
    fn keeps(&self, header: &FeatureHeader) -> bool {
        if header.polygon_level().is_none() {
            return true;
        }
        match self.config.min_area_km2 {
            Some(min) if min > 0.0 => header.area_km2 >= min,
            _ => true,
        }
    }

    fn load(&self, data: &DataHandle, header: &FeatureHeader) -> StoreResult<Arc<Feature>> {
        let key = CacheKey::new(self.database, header.id as u32 as u64);
        if let Some(feature) = self.cache.get(&key) {
            return Ok(feature);
        }
        let points = data.read_feature_body(header)?;
        let feature = Arc::new(decode_feature(header, points));
        self.cache.put(key, Arc::clone(&feature));
        Ok(feature)
    }

    fn select_indexed(
        &self,
        index: &SpatialIndex,
        data: &DataHandle,
        area: &EarthArea,
    ) -> StoreResult<(Vec<Feature>, Vec<PolygonFeature>)> {
        let mut features = Vec::new();
        let mut polygons = Vec::new();
        for offset in index.query(area) {
            let header = data.read_header_at(offset)?;
            let shown = self.config.shows_level(header.level);
            if !self.keeps(&header) || !(shown || self.config.polygon_rendering) {
                continue;
            }
            let feature = self.load(data, &header)?;
            if shown {
                features.extend(feature.filter(area));
            }
            if self.config.polygon_rendering {
                if let Some(level) = header.polygon_level() {
                    polygons.push(PolygonFeature::new((*feature).clone(), level));
                }
            }
        }
        Ok((features, polygons))
    }

    fn select_resident(&self, records: &[(FeatureHeader, Feature)]) -> (Vec<Feature>, Vec<PolygonFeature>) {
        let mut features = Vec::new();
        let mut polygons = Vec::new();
        for (header, feature) in records.iter().filter(|(h, _)| self.keeps(h)) {
            if self.config.shows_level(header.level) {
                features.push(feature.clone());
            }
            if self.config.polygon_rendering {
                if let Some(level) = header.polygon_level() {
                    polygons.push(PolygonFeature::new(feature.clone(), level));
                }
            }
        }
        (features, polygons)
    }
}

/// Polygon rings are wound for their level once, here, so every select
/// hands out the same shared points.
fn decode_feature(header: &FeatureHeader, points: Vec<GeographicLocation>) -> Feature {
    let feature = Feature::with_attributes(points, header.attributes());
    match header.polygon_level() {
        Some(level) => feature.oriented(level.winding()),
        None => feature,
    }
}

fn database_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl AreaSelectable for BinaryFeatureStore {
    fn select(&mut self, area: &EarthArea) -> StoreResult<()> {
        let (features, polygons) = match &self.backing {
            Backing::Indexed { index, data } => self.select_indexed(index, data, area)?,
            Backing::Resident(records) => self.select_resident(records),
        };
        let polygons = if polygons.is_empty() {
            polygons
        } else {
            hierarchy::group(polygons)
        };

        self.features = features;
        self.polygons = polygons;
        self.area = area.clone();
        debug!(
            database = %self.name,
            cells = area.len(),
            features = self.features.len(),
            polygons = self.polygons.len(),
            cached_points = self.cache.total_points(),
            "selected features"
        );
        Ok(())
    }

    fn area(&self) -> &EarthArea {
        &self.area
    }
}

impl FeatureSource for BinaryFeatureStore {
    fn features(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }
}

impl PolygonSource for BinaryFeatureStore {
    fn polygons(&self) -> std::slice::Iter<'_, PolygonFeature> {
        self.polygons.iter()
    }
}

impl AttributeNamed for BinaryFeatureStore {
    fn attribute_names(&self) -> &[String] {
        &self.attribute_names
    }
}
