//! Remote binned coastline store.
//!
//! The remote database splits the globe into square bins numbered from the
//! north-west corner, row-major. Each bin owns a contiguous range of
//! segments, and each segment a contiguous range of points stored as 16-bit
//! offsets from the bin's south-west corner. A select fetches every needed
//! bin in parallel runs of adjacent bins, then reads them back through the
//! cache. With polygon rendering on, each bin's segments are also closed
//! into fillable rings along the bin perimeter when the bin is decoded.

use std::collections::{BTreeSet, HashMap};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, ensure};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, warn};

use super::cache::{CacheKey, DatabaseId, FeatureCache, PointCount};
use super::perimeter::{self, edge_side, side_key, BinFrame, BinSegment, CLOSED};
use super::{AreaSelectable, FeatureSource, PolygonSource};
use crate::area::EarthArea;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::feature::{AttributeNamed, AttributeValue, Feature, PolygonFeature};
use crate::geo::GeographicLocation;

/// Names of the attributes attached to remote segment features, in order.
pub const REMOTE_ATTRIBUTE_NAMES: [&str; 4] = ["level", "area_km2", "entry", "exit"];

const DELTA_SCALE: f64 = 65535.0;

/// Per-segment and per-point variables served by a remote database.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RemoteVariable {
    /// `points << 9 | level << 6 | entry << 3 | exit`, one per segment
    SegmentInfo,
    /// Ten times the parent polygon area in km², one per segment
    SegmentArea,
    /// Unsigned 16-bit longitude offset from the bin corner, one per point
    PointDeltaLon,
    /// Unsigned 16-bit latitude offset from the bin corner, one per point
    PointDeltaLat,
}

impl RemoteVariable {
    pub const ALL: [RemoteVariable; 4] = [
        RemoteVariable::SegmentInfo,
        RemoteVariable::SegmentArea,
        RemoteVariable::PointDeltaLon,
        RemoteVariable::PointDeltaLat,
    ];

    /// Variable name on the server
    pub fn name(self) -> &'static str {
        match self {
            RemoteVariable::SegmentInfo => "Embedded_npts_levels_exit_entry_for_a_segment",
            RemoteVariable::SegmentArea => "Ten_times_the_km_squared_area_of_the_parent_polygon_of_a_segmen",
            RemoteVariable::PointDeltaLon => "Relative_longitude_from_SW_corner_of_bin",
            RemoteVariable::PointDeltaLat => "Relative_latitude_from_SW_corner_of_bin",
        }
    }
}

/// Global bin layout of a remote database.
#[derive(Clone, Debug, PartialEq)]
pub struct BinLayout {
    /// Bin edge length in degrees
    pub bin_size: f64,
    pub lon_bins: usize,
    pub lat_bins: usize,
    /// First segment of each bin
    pub first_segment: Vec<u32>,
    /// Segment count of each bin
    pub segment_count: Vec<u32>,
    /// First point of each segment
    pub first_point: Vec<u32>,
    pub total_points: u32,
    /// Levels at the corners of each bin, `sw << 9 | se << 6 | ne << 3 | nw`
    pub node_levels: Vec<u16>,
}

impl BinLayout {
    pub fn total_bins(&self) -> usize {
        self.lon_bins * self.lat_bins
    }

    pub fn total_segments(&self) -> usize {
        self.first_point.len()
    }

    /// Check that the per-bin and per-segment tables are consistent.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.bin_size > 0.0, "bin size {} is not positive", self.bin_size);
        ensure!(
            self.lon_bins > 0 && self.lat_bins > 0,
            "empty {}x{} bin grid",
            self.lon_bins,
            self.lat_bins
        );
        let bins = self.total_bins();
        ensure!(
            self.first_segment.len() == bins && self.segment_count.len() == bins && self.node_levels.len() == bins,
            "expected {bins} bin entries, got {} first segments, {} counts and {} node levels",
            self.first_segment.len(),
            self.segment_count.len(),
            self.node_levels.len()
        );
        let segments = self.total_segments() as u64;
        let mut next_free = 0u64;
        for bin in (0..bins).filter(|&bin| self.segment_count[bin] > 0) {
            let first = self.first_segment[bin] as u64;
            let end = first + self.segment_count[bin] as u64;
            if first < next_free {
                bail!("bin {bin} segments start at {first}, inside the previous bin ending at {next_free}");
            }
            if end > segments {
                bail!("bin {bin} segments end at {end}, past {segments}");
            }
            next_free = end;
        }
        if let Some(&last) = self.first_point.last() {
            ensure!(
                last <= self.total_points,
                "last segment starts at point {last}, past {}",
                self.total_points
            );
        }
        ensure!(
            self.first_point.windows(2).all(|w| w[0] <= w[1]),
            "segment point starts are not sorted"
        );
        Ok(())
    }

    /// Bin holding a location. Latitude 90 folds into the top row.
    pub fn bin_index(&self, loc: &GeographicLocation) -> usize {
        let lat_bin = (((90.0 - loc.lat) / self.bin_size).floor() as usize).min(self.lat_bins - 1);
        let lon = loc.lon.rem_euclid(360.0);
        let lon_bin = ((lon / self.bin_size).floor() as usize).min(self.lon_bins - 1);
        lat_bin * self.lon_bins + lon_bin
    }

    /// South-west corner of a bin, longitude in [0, 360)
    pub fn bin_corner(&self, bin: usize) -> (f64, f64) {
        let lat_bin = bin / self.lon_bins;
        let lon_bin = bin % self.lon_bins;
        (
            90.0 - (lat_bin + 1) as f64 * self.bin_size,
            lon_bin as f64 * self.bin_size,
        )
    }

    /// Levels at the south-west, south-east, north-east and north-west
    /// corners of a bin.
    pub fn corner_levels(&self, bin: usize) -> [u8; 4] {
        let packed = self.node_levels.get(bin).copied().unwrap_or(0);
        [9, 6, 3, 0].map(|shift| ((packed >> shift) & 7) as u8)
    }

    fn frame(&self, bin: usize) -> BinFrame {
        let (lat, lon) = self.bin_corner(bin);
        BinFrame {
            lat,
            lon,
            size: self.bin_size,
        }
    }

    /// Sorted bins covering the centres of every cell of an area.
    pub fn bins_for(&self, area: &EarthArea) -> Vec<usize> {
        let bins: BTreeSet<usize> = area
            .cells()
            .map(|(lat, lon)| self.bin_index(&GeographicLocation::new(lat as f64 + 0.5, lon as f64 + 0.5)))
            .collect();
        bins.into_iter().collect()
    }

    /// Point index where a segment starts; one past the last segment is the
    /// total point count.
    fn point_start(&self, segment: usize) -> usize {
        self.first_point
            .get(segment)
            .map_or(self.total_points as usize, |&p| p as usize)
    }
}

/// Fetches slices of remote variables.
pub trait SliceTransport: Send + Sync {
    fn layout(&self) -> anyhow::Result<BinLayout>;

    /// Read `count` values of `var` starting at element `start`.
    fn fetch(&self, var: RemoteVariable, start: usize, count: usize) -> anyhow::Result<Vec<i32>>;
}

/// In-memory transport, for tests and offline use.
///
/// Segments are added per bin; bins listed with [`MemoryTransportBuilder::fail_bin`]
/// make every segment fetch overlapping them fail.
pub struct MemoryTransport {
    layout: BinLayout,
    values: HashMap<RemoteVariable, Vec<i32>>,
    failing: Vec<RangeInclusive<usize>>,
    fetches: AtomicUsize,
}

/// Segment waiting to be laid out by [`MemoryTransportBuilder`].
struct PendingSegment {
    info: i32,
    area: i32,
    dx: Vec<i32>,
    dy: Vec<i32>,
}

pub struct MemoryTransportBuilder {
    bin_size: f64,
    lon_bins: usize,
    lat_bins: usize,
    bins: Vec<Vec<PendingSegment>>,
    node_levels: Vec<u16>,
    failing: Vec<usize>,
}

impl MemoryTransport {
    pub fn builder(bin_size: f64) -> MemoryTransportBuilder {
        let lon_bins = (360.0 / bin_size).round() as usize;
        let lat_bins = (180.0 / bin_size).round() as usize;
        MemoryTransportBuilder {
            bin_size,
            lon_bins,
            lat_bins,
            bins: (0..lon_bins * lat_bins).map(|_| Vec::new()).collect(),
            node_levels: vec![0; lon_bins * lat_bins],
            failing: Vec::new(),
        }
    }

    /// Number of fetch calls served so far
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl MemoryTransportBuilder {
    /// Add a segment to the bin holding its mean point. Points must lie
    /// inside that bin. A segment whose ends both sit on the bin edge
    /// enters and leaves through those sides; any other is a closed ring.
    pub fn add_segment(mut self, level: u8, area_km2: f64, points: &[GeographicLocation]) -> Self {
        let layout = self.shape();
        if points.is_empty() {
            return self;
        }
        let n = points.len() as f64;
        let mean = GeographicLocation::new(
            points.iter().map(|p| p.lat).sum::<f64>() / n,
            points.iter().map(|p| p.lon.rem_euclid(360.0)).sum::<f64>() / n,
        );
        let bin = layout.bin_index(&mean);
        let (lat0, lon0) = layout.bin_corner(bin);
        let scale = DELTA_SCALE / self.bin_size;
        let delta = |v: f64| ((v * scale).round() as i32).clamp(0, 0xffff);

        let dx: Vec<i32> = points.iter().map(|p| delta(p.lon.rem_euclid(360.0) - lon0)).collect();
        let dy: Vec<i32> = points.iter().map(|p| delta(p.lat - lat0)).collect();
        let last = points.len() - 1;
        let side = |i: usize| edge_side(dx[i] as u16, dy[i] as u16);
        let (entry, exit) = match (side(0), side(last)) {
            (entry, exit) if last > 0 && entry != CLOSED && exit != CLOSED => (entry, exit),
            _ => (CLOSED, CLOSED),
        };
        let info = ((points.len() as i32) << 9) | ((level as i32 & 7) << 6) | ((entry as i32) << 3) | exit as i32;
        self.bins[bin].push(PendingSegment {
            info,
            area: (area_km2 * 10.0).round() as i32,
            dx,
            dy,
        });
        self
    }

    /// Set the levels at the south-west, south-east, north-east and
    /// north-west corners of a bin.
    pub fn corner_levels(mut self, bin: usize, levels: [u8; 4]) -> Self {
        if let Some(packed) = self.node_levels.get_mut(bin) {
            *packed = levels
                .iter()
                .zip([9, 6, 3, 0])
                .fold(0, |acc, (&level, shift)| acc | ((level as u16 & 7) << shift));
        }
        self
    }

    pub fn fail_bin(mut self, bin: usize) -> Self {
        self.failing.push(bin);
        self
    }

    fn shape(&self) -> BinLayout {
        BinLayout {
            bin_size: self.bin_size,
            lon_bins: self.lon_bins,
            lat_bins: self.lat_bins,
            first_segment: Vec::new(),
            segment_count: Vec::new(),
            first_point: Vec::new(),
            total_points: 0,
            node_levels: self.node_levels.clone(),
        }
    }

    pub fn build(self) -> MemoryTransport {
        let mut layout = self.shape();
        let mut values: HashMap<RemoteVariable, Vec<i32>> =
            RemoteVariable::ALL.iter().map(|&v| (v, Vec::new())).collect();

        for segments in &self.bins {
            layout.first_segment.push(layout.first_point.len() as u32);
            layout.segment_count.push(segments.len() as u32);
            for segment in segments {
                layout.first_point.push(layout.total_points);
                layout.total_points += segment.dx.len() as u32;
                values.entry(RemoteVariable::SegmentInfo).or_default().push(segment.info);
                values.entry(RemoteVariable::SegmentArea).or_default().push(segment.area);
                values.entry(RemoteVariable::PointDeltaLon).or_default().extend(&segment.dx);
                values.entry(RemoteVariable::PointDeltaLat).or_default().extend(&segment.dy);
            }
        }

        let failing = self
            .failing
            .iter()
            .filter_map(|&bin| {
                let count = *layout.segment_count.get(bin)? as usize;
                let first = layout.first_segment[bin] as usize;
                (count > 0).then(|| first..=first + count - 1)
            })
            .collect();

        MemoryTransport {
            layout,
            values,
            failing,
            fetches: AtomicUsize::new(0),
        }
    }
}

impl SliceTransport for MemoryTransport {
    fn layout(&self) -> anyhow::Result<BinLayout> {
        Ok(self.layout.clone())
    }

    fn fetch(&self, var: RemoteVariable, start: usize, count: usize) -> anyhow::Result<Vec<i32>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        if count == 0 {
            return Ok(Vec::new());
        }
        if var == RemoteVariable::SegmentInfo {
            let end = start + count - 1;
            if let Some(bad) = self.failing.iter().find(|r| *r.start() <= end && start <= *r.end()) {
                bail!("segments {}..={} unavailable", bad.start(), bad.end());
            }
        }
        let values = self.values.get(&var).map(Vec::as_slice).unwrap_or_default();
        match values.get(start..start + count) {
            Some(slice) => Ok(slice.to_vec()),
            None => bail!("{} slice {start}+{count} outside {} values", var.name(), values.len()),
        }
    }
}

/// Decoded contents of one bin, as cached.
#[derive(Debug, Default)]
pub struct BinContents {
    segments: Vec<Feature>,
    polygons: Vec<PolygonFeature>,
}

impl BinContents {
    /// Every segment of the bin, attributes in [`REMOTE_ATTRIBUTE_NAMES`] order
    pub fn segments(&self) -> &[Feature] {
        &self.segments
    }

    /// Rings closed along the bin perimeter, empty unless polygon
    /// rendering is on
    pub fn polygons(&self) -> &[PolygonFeature] {
        &self.polygons
    }
}

impl PointCount for BinContents {
    fn point_count(&self) -> usize {
        self.segments.point_count() + self.polygons.iter().map(|p| p.points().len()).sum::<usize>()
    }
}

/// Feature store over a remote binned database.
pub struct RemoteFeatureStore<T: SliceTransport> {
    name: String,
    database: DatabaseId,
    transport: Arc<T>,
    layout: BinLayout,
    config: StoreConfig,
    cache: FeatureCache<Arc<BinContents>>,
    pool: Option<ThreadPool>,
    attribute_names: Vec<String>,
    area: EarthArea,
    features: Vec<Feature>,
    polygons: Vec<PolygonFeature>,
}

impl<T: SliceTransport> std::fmt::Debug for RemoteFeatureStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFeatureStore")
            .field("name", &self.name)
            .field("database", &self.database)
            .field("layout", &self.layout)
            .field("config", &self.config)
            .field("area", &self.area)
            .finish_non_exhaustive()
    }
}

impl<T: SliceTransport> RemoteFeatureStore<T> {
    pub fn new(name: &str, transport: Arc<T>, config: StoreConfig) -> StoreResult<Self> {
        let layout = transport.layout()?;
        layout
            .validate()
            .map_err(|e| StoreError::malformed("remote layout", format!("{e:#}")))?;
        let pool = match config.fetch_threads {
            0 => None,
            threads => Some(
                ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("shoreline-fetch-{i}"))
                    .build()?,
            ),
        };
        info!(
            database = name,
            bins = layout.total_bins(),
            segments = layout.total_segments(),
            points = layout.total_points,
            "opened remote database"
        );
        Ok(Self {
            database: DatabaseId::unique(),
            name: name.to_string(),
            transport,
            layout,
            cache: FeatureCache::new(config.cache_points),
            config,
            pool,
            attribute_names: REMOTE_ATTRIBUTE_NAMES.iter().map(|n| n.to_string()).collect(),
            area: EarthArea::new(),
            features: Vec::new(),
            polygons: Vec::new(),
        })
    }

    pub fn layout(&self) -> &BinLayout {
        &self.layout
    }

    pub fn cache(&self) -> &FeatureCache<Arc<BinContents>> {
        &self.cache
    }

    fn key(&self, bin: usize) -> CacheKey {
        CacheKey::new(self.database, bin as u64)
    }

    /// Split sorted bins into runs of adjacent bins, dropping empty or
    /// cached bins from the ends of each run.
    fn plan_runs(&self, bins: &[usize]) -> Vec<RangeInclusive<usize>> {
        let skip = |bin: usize| self.layout.segment_count[bin] == 0 || self.cache.contains(&self.key(bin));

        let mut runs = Vec::new();
        let mut i = 0;
        while i < bins.len() {
            let mut j = i;
            while j + 1 < bins.len() && bins[j + 1] == bins[j] + 1 {
                j += 1;
            }
            let (mut first, mut last) = (bins[i], bins[j]);
            while first <= last && skip(first) {
                first += 1;
            }
            while last > first && skip(last) {
                last -= 1;
            }
            if first <= last && !skip(first) {
                runs.push(first..=last);
            }
            i = j + 1;
        }
        runs
    }

    /// Fetch and decode a run of bins, caching each non-empty bin.
    fn fetch_run(&self, run: RangeInclusive<usize>) -> StoreResult<Vec<(usize, Arc<BinContents>)>> {
        let (first, last) = (*run.start(), *run.end());
        let malformed = |reason: String| StoreError::malformed("remote layout", format!("bins {first}..={last}: {reason}"));
        let seg_start = self.layout.first_segment[first] as usize;
        let seg_end = self.layout.first_segment[last] as usize + self.layout.segment_count[last] as usize;
        let pt_start = self.layout.point_start(seg_start);
        let pt_end = self.layout.point_start(seg_end);

        let nseg = seg_end
            .checked_sub(seg_start)
            .ok_or_else(|| malformed(format!("segments end at {seg_end}, before {seg_start}")))?;
        let npts = pt_end
            .checked_sub(pt_start)
            .ok_or_else(|| malformed(format!("points end at {pt_end}, before {pt_start}")))?;
        let info = self.transport.fetch(RemoteVariable::SegmentInfo, seg_start, nseg)?;
        let area = self.transport.fetch(RemoteVariable::SegmentArea, seg_start, nseg)?;
        let dx = self.transport.fetch(RemoteVariable::PointDeltaLon, pt_start, npts)?;
        let dy = self.transport.fetch(RemoteVariable::PointDeltaLat, pt_start, npts)?;
        if info.len() != nseg || area.len() != nseg || dx.len() != npts || dy.len() != npts {
            return Err(StoreError::malformed(
                "remote slice",
                format!("bins {first}..={last}: short read"),
            ));
        }

        let mut decoded = Vec::new();
        for bin in run {
            let count = self.layout.segment_count[bin] as usize;
            if count == 0 {
                continue;
            }
            let slices = (self.layout.first_segment[bin] as usize)
                .checked_sub(seg_start)
                .and_then(|at| info.get(at..at + count).zip(area.get(at..at + count)));
            let Some((info, area)) = slices else {
                return Err(malformed(format!("bin {bin} segments fall outside the run")));
            };
            let contents = Arc::new(self.decode_bin(bin, info, area, &dx, &dy, pt_start)?);
            self.cache.put(self.key(bin), Arc::clone(&contents));
            decoded.push((bin, contents));
        }
        Ok(decoded)
    }

    /// Decode the segments of one bin from its slice of the segment tables
    /// and the run's point tables starting at point `point_base`.
    fn decode_bin(
        &self,
        bin: usize,
        info: &[i32],
        area: &[i32],
        dx: &[i32],
        dy: &[i32],
        point_base: usize,
    ) -> StoreResult<BinContents> {
        let (lat0, lon0) = self.layout.bin_corner(bin);
        let scale = self.layout.bin_size / DELTA_SCALE;
        let first_segment = self.layout.first_segment[bin] as usize;
        let raw = |v: i32| (v & 0xffff) as u16;

        let mut segments = Vec::with_capacity(info.len());
        let mut ends = Vec::with_capacity(info.len());
        for (i, (&packed, &area)) in info.iter().zip(area).enumerate() {
            let segment = first_segment + i;
            let packed = packed as u32;
            let points = (packed >> 9) as usize;
            let range = self
                .layout
                .point_start(segment)
                .checked_sub(point_base)
                .and_then(|start| dx.get(start..start + points).zip(dy.get(start..start + points)));
            let Some((xs, ys)) = range else {
                return Err(StoreError::malformed(
                    "remote slice",
                    format!("segment {segment} points run past the fetched slice"),
                ));
            };

            let mut locations: Vec<GeographicLocation> = Vec::with_capacity(points);
            let mut last: Option<(u16, u16)> = None;
            for (&x, &y) in xs.iter().zip(ys) {
                let (x, y) = (raw(x), raw(y));
                if last == Some((x, y)) {
                    continue;
                }
                last = Some((x, y));
                locations.push(GeographicLocation::new(
                    lat0 + y as f64 * scale,
                    lon0 + x as f64 * scale,
                ));
            }

            let level = ((packed >> 6) & 7) as u8;
            let (entry, exit) = (((packed >> 3) & 7) as u8, (packed & 7) as u8);
            let keys = match (xs.first().zip(ys.first()), xs.last().zip(ys.last())) {
                (Some((&x0, &y0)), Some((&x1, &y1))) if entry != CLOSED => {
                    side_key(entry, raw(x0), raw(y0)).zip(side_key(exit, raw(x1), raw(y1)))
                }
                _ => None,
            };
            ends.push((level, keys));
            segments.push(Feature::with_attributes(
                locations,
                vec![
                    AttributeValue::Int(level as i64),
                    AttributeValue::Float(area as f64 / 10.0),
                    AttributeValue::Int(entry as i64),
                    AttributeValue::Int(exit as i64),
                ],
            ));
        }

        let polygons = if self.config.polygon_rendering {
            let pieces: Vec<BinSegment<'_>> = segments
                .iter()
                .zip(&ends)
                .filter(|(feature, _)| self.keeps(feature))
                .map(|(feature, &(level, keys))| BinSegment {
                    level,
                    keys,
                    points: feature.points(),
                })
                .collect();
            perimeter::assemble(bin, self.layout.frame(bin), self.layout.corner_levels(bin), &pieces)?
        } else {
            Vec::new()
        };
        Ok(BinContents { segments, polygons })
    }

    /// Fetch every missing bin in parallel and wait for all workers.
    fn prefetch(&self, bins: &[usize]) -> StoreResult<()> {
        let runs = self.plan_runs(bins);
        if runs.is_empty() {
            return Ok(());
        }
        let total = runs.len();
        let work = || {
            runs.par_iter()
                .map(|run| self.fetch_run(run.clone()).map_err(|e| (run.clone(), e)))
                .collect::<Vec<_>>()
        };
        let results = match &self.pool {
            Some(pool) => pool.install(work),
            None => work(),
        };

        let mut failed = 0;
        let mut first = None;
        for result in results {
            if let Err((run, err)) = result {
                warn!(database = %self.name, bins = ?run, error = %err, "bin fetch failed");
                failed += 1;
                first.get_or_insert_with(|| err.to_string());
            }
        }
        match first {
            None => {
                debug!(database = %self.name, runs = total, "prefetched bins");
                Ok(())
            }
            Some(first) => Err(StoreError::RemoteFetch { failed, total, first }),
        }
    }

    /// Contents of a bin after prefetch. Empty bins are never fetched; with
    /// polygon rendering they still carry their corner prefill.
    fn contents(&self, bin: usize) -> StoreResult<Option<Arc<BinContents>>> {
        if self.layout.segment_count[bin] == 0 {
            if !self.config.polygon_rendering {
                return Ok(None);
            }
            let polygons = perimeter::assemble(bin, self.layout.frame(bin), self.layout.corner_levels(bin), &[])?;
            return Ok(Some(Arc::new(BinContents {
                segments: Vec::new(),
                polygons,
            })));
        }
        if let Some(contents) = self.cache.get(&self.key(bin)) {
            return Ok(Some(contents));
        }
        debug!(database = %self.name, bin, "bin evicted before read, refetching");
        Ok(self.fetch_run(bin..=bin)?.pop().map(|(_, contents)| contents))
    }

    fn keeps(&self, feature: &Feature) -> bool {
        match (self.config.min_area_km2, feature.attribute(1).and_then(AttributeValue::as_f64)) {
            (Some(min), Some(area)) if min > 0.0 => area >= min,
            _ => true,
        }
    }

    fn shows(&self, feature: &Feature) -> bool {
        match feature.attribute(0) {
            Some(AttributeValue::Int(level)) => self.config.shows_level(*level as i32),
            _ => true,
        }
    }
}

impl<T: SliceTransport> AreaSelectable for RemoteFeatureStore<T> {
    fn select(&mut self, area: &EarthArea) -> StoreResult<()> {
        let bins = self.layout.bins_for(area);
        self.prefetch(&bins)?;

        let mut features = Vec::new();
        let mut polygons = Vec::new();
        for &bin in &bins {
            let Some(contents) = self.contents(bin)? else {
                continue;
            };
            for feature in contents.segments().iter().filter(|f| self.keeps(f) && self.shows(f)) {
                features.extend(feature.filter(area));
            }
            if !contents.polygons().is_empty() {
                polygons.extend_from_slice(contents.polygons());
                polygons.push(PolygonFeature::sentinel());
            }
        }

        self.features = features;
        self.polygons = polygons;
        self.area = area.clone();
        debug!(
            database = %self.name,
            bins = bins.len(),
            features = self.features.len(),
            polygons = self.polygons.len(),
            "selected remote features"
        );
        Ok(())
    }

    fn area(&self) -> &EarthArea {
        &self.area
    }
}

impl<T: SliceTransport> FeatureSource for RemoteFeatureStore<T> {
    fn features(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }
}

impl<T: SliceTransport> PolygonSource for RemoteFeatureStore<T> {
    fn polygons(&self) -> std::slice::Iter<'_, PolygonFeature> {
        self.polygons.iter()
    }
}

impl<T: SliceTransport> AttributeNamed for RemoteFeatureStore<T> {
    fn attribute_names(&self) -> &[String] {
        &self.attribute_names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::PolygonLevel;

    fn coast(lat: f64, lon: f64) -> Vec<GeographicLocation> {
        vec![
            GeographicLocation::new(lat + 0.1, lon + 0.1),
            GeographicLocation::new(lat + 0.5, lon + 0.5),
            GeographicLocation::new(lat + 0.5, lon + 0.5),
            GeographicLocation::new(lat + 0.9, lon + 0.2),
        ]
    }

    fn transport() -> MemoryTransport {
        MemoryTransport::builder(1.0)
            .add_segment(1, 5000.0, &coast(10.0, 20.0))
            .add_segment(2, 4.0, &coast(10.0, 21.0))
            .add_segment(1, 5000.0, &coast(10.0, 22.0))
            .add_segment(1, 700.0, &coast(-30.0, -60.0))
            .build()
    }

    fn store(transport: MemoryTransport, config: StoreConfig) -> RemoteFeatureStore<MemoryTransport> {
        RemoteFeatureStore::new("gshhs_remote", Arc::new(transport), config).unwrap()
    }

    #[test]
    fn test_bin_addressing() {
        let layout = transport().layout;
        assert_eq!(layout.bin_index(&GeographicLocation::new(89.5, 0.5)), 0);
        assert_eq!(layout.bin_index(&GeographicLocation::new(90.0, 0.5)), 0);
        assert_eq!(layout.bin_index(&GeographicLocation::new(-89.5, 359.5)), 180 * 360 - 1);
        // Western longitudes wrap to the far end of the row
        assert_eq!(layout.bin_index(&GeographicLocation::new(89.5, -0.5)), 359);
        assert_eq!(layout.bin_corner(359), (89.0, 359.0));
    }

    #[test]
    fn test_select_decodes_segments() {
        let mut store = store(transport(), StoreConfig::default());
        store.select(&EarthArea::from_bounds(10.0, 20.0, 11.0, 21.0)).unwrap();

        let features: Vec<&Feature> = store.features().collect();
        assert_eq!(features.len(), 1);
        // Duplicate point dropped
        assert_eq!(features[0].len(), 3);
        let p = features[0].points()[1];
        assert!((p.lat - 10.5).abs() < 1e-4);
        assert!((p.lon - 20.5).abs() < 1e-4);
        assert_eq!(features[0].attribute(0), Some(&AttributeValue::Int(1)));
        assert_eq!(features[0].attribute(1), Some(&AttributeValue::Float(5000.0)));
    }

    #[test]
    fn test_western_hemisphere_bins() {
        let mut store = store(transport(), StoreConfig::default());
        store.select(&EarthArea::from_bounds(-30.0, -60.0, -29.0, -59.0)).unwrap();
        let features: Vec<&Feature> = store.features().collect();
        assert_eq!(features.len(), 1);
        let p = features[0].points()[0];
        assert!((p.lon - -59.9).abs() < 1e-4);
    }

    #[test]
    fn test_cached_bins_are_not_refetched() {
        let transport = Arc::new(transport());
        let mut store = RemoteFeatureStore::new("gshhs_remote", Arc::clone(&transport), StoreConfig::default()).unwrap();
        let area = EarthArea::from_bounds(10.0, 20.0, 11.0, 23.0);
        store.select(&area).unwrap();
        // One run of three adjacent bins, four variables
        assert_eq!(transport.fetches(), 4);
        assert_eq!(store.features().count(), 3);

        store.select(&area).unwrap();
        assert_eq!(transport.fetches(), 4);
    }

    #[test]
    fn test_runs_trim_cached_ends() {
        let store = store(transport(), StoreConfig::default());
        let layout = store.layout();
        let bin = |lon: f64| layout.bin_index(&GeographicLocation::new(10.5, lon));
        let bins = vec![bin(19.5), bin(20.5), bin(21.5), bin(22.5), bin(23.5)];
        assert_eq!(store.plan_runs(&bins), vec![bins[1]..=bins[3]]);

        store.fetch_run(bins[1]..=bins[1]).unwrap();
        assert_eq!(store.plan_runs(&bins), vec![bins[2]..=bins[3]]);
    }

    #[test]
    fn test_min_area_filters_segments() {
        let config = StoreConfig {
            min_area_km2: Some(10.0),
            ..StoreConfig::default()
        };
        let mut store = store(transport(), config);
        store.select(&EarthArea::from_bounds(10.0, 20.0, 11.0, 23.0)).unwrap();
        assert_eq!(store.features().count(), 2);
    }

    #[test]
    fn test_failures_are_aggregated() {
        let transport = MemoryTransport::builder(1.0)
            .add_segment(1, 5000.0, &coast(10.0, 20.0))
            .add_segment(1, 5000.0, &coast(10.0, 30.0))
            .add_segment(1, 5000.0, &coast(10.0, 40.0))
            .fail_bin(79 * 360 + 30)
            .fail_bin(79 * 360 + 40)
            .build();
        let config = StoreConfig {
            fetch_threads: 2,
            ..StoreConfig::default()
        };
        let mut store = store(transport, config);
        let mut area = EarthArea::new();
        area.add_cell(10, 20);
        area.add_cell(10, 30);
        area.add_cell(10, 40);
        let err = store.select(&area).unwrap_err();
        match err {
            StoreError::RemoteFetch { failed, total, .. } => assert_eq!((failed, total), (2, 3)),
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(store.features().count(), 0);
        // The healthy run still landed in the cache
        assert_eq!(store.cache().len(), 1);
    }

    #[test]
    fn test_evicted_bin_is_refetched() {
        let config = StoreConfig {
            cache_points: 0,
            ..StoreConfig::default()
        };
        let mut store = store(transport(), config);
        store.select(&EarthArea::from_bounds(10.0, 20.0, 11.0, 22.0)).unwrap();
        assert_eq!(store.features().count(), 2);
        assert!(store.cache().is_empty());
    }

    #[test]
    fn test_inconsistent_layout_is_rejected() {
        let mut layout = transport().layout;
        layout.segment_count.pop();
        assert!(layout.validate().is_err());
    }

    /// Serves a fixed layout and zeroed values.
    struct FixedLayout(BinLayout);

    impl SliceTransport for FixedLayout {
        fn layout(&self) -> anyhow::Result<BinLayout> {
            Ok(self.0.clone())
        }

        fn fetch(&self, _var: RemoteVariable, _start: usize, count: usize) -> anyhow::Result<Vec<i32>> {
            Ok(vec![0; count])
        }
    }

    fn two_bins(first_segment: Vec<u32>) -> BinLayout {
        BinLayout {
            bin_size: 180.0,
            lon_bins: 2,
            lat_bins: 1,
            first_segment,
            segment_count: vec![1, 1],
            first_point: vec![0, 2],
            total_points: 4,
            node_levels: vec![0, 0],
        }
    }

    #[test]
    fn test_unordered_bins_are_malformed() {
        assert!(two_bins(vec![0, 1]).validate().is_ok());
        assert!(two_bins(vec![1, 0]).validate().is_err());

        let transport = Arc::new(FixedLayout(two_bins(vec![1, 0])));
        let err = RemoteFeatureStore::new("gshhs_remote", transport, StoreConfig::default()).unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));
    }

    #[test]
    fn test_bad_run_bounds_are_errors() {
        let transport = Arc::new(FixedLayout(two_bins(vec![0, 1])));
        let mut store = RemoteFeatureStore::new("gshhs_remote", transport, StoreConfig::default()).unwrap();
        store.layout.first_segment = vec![1, 0];
        let err = store.select(&EarthArea::world()).unwrap_err();
        assert!(matches!(err, StoreError::RemoteFetch { failed: 1, .. }));

        store.layout.first_segment = vec![0, 1];
        store.layout.first_point = vec![3, 0];
        let err = store.select(&EarthArea::world()).unwrap_err();
        assert!(matches!(err, StoreError::RemoteFetch { failed: 1, .. }));
    }

    #[test]
    fn test_level_range_limits_segments() {
        let config = StoreConfig {
            level_range: Some(1..=1),
            ..StoreConfig::default()
        };
        let mut store = store(transport(), config);
        store.select(&EarthArea::from_bounds(10.0, 20.0, 11.0, 23.0)).unwrap();
        let levels: Vec<_> = store.features().map(|f| f.attribute(0).cloned()).collect();
        assert_eq!(levels, vec![Some(AttributeValue::Int(1)); 2]);
    }

    #[test]
    fn test_bins_assemble_polygons() {
        let coast = [
            GeographicLocation::new(10.5, 21.0),
            GeographicLocation::new(10.6, 20.5),
            GeographicLocation::new(10.5, 20.0),
        ];
        let inland = 79 * 360 + 22;
        let transport = MemoryTransport::builder(1.0)
            .add_segment(1, 5000.0, &coast)
            .corner_levels(inland, [1, 1, 1, 1])
            .build();
        let config = StoreConfig {
            polygon_rendering: true,
            ..StoreConfig::default()
        };
        let mut store = store(transport, config);
        let mut area = EarthArea::new();
        area.add_cell(10, 20);
        area.add_cell(10, 22);
        area.add_cell(10, 23);
        store.select(&area).unwrap();

        let attributes = store.features().next().map(|f| f.attributes().to_vec());
        assert_eq!(attributes.as_ref().map(|a| (&a[2], &a[3])), Some((&AttributeValue::Int(1), &AttributeValue::Int(3))));

        let polygons: Vec<&PolygonFeature> = store.polygons().collect();
        let shape: Vec<usize> = polygons.iter().map(|p| p.points().len()).collect();
        // Coast closed through the southern corners, then the inland bin
        // prefilled, each bin its own group
        assert_eq!(shape, vec![5, 0, 4, 0]);
        assert_eq!(polygons[0].level(), PolygonLevel::Land);
        assert_eq!(polygons[0].points()[3], GeographicLocation::new(10.0, 20.0));
        assert_eq!(polygons[2].points()[0], GeographicLocation::new(10.0, 22.0));
        assert!(polygons[1].is_sentinel() && polygons[3].is_sentinel());
    }
}
