use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use crate::config::RenderOptions;
use crate::feature::Feature;
use crate::geo::{GeographicLocation, PixelPoint};
use crate::map::EarthImageTransform;
use crate::render::DiscontinuityDetector;

/// One connected polyline in image space.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubPath {
    pub points: Vec<PixelPoint>,
    pub closed: bool,
}

/// A renderable path made of zero or more sub-paths.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderPath {
    subpaths: Vec<SubPath>,
}

impl RenderPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new sub-path at `p`.
    pub fn move_to(&mut self, p: PixelPoint) {
        self.subpaths.push(SubPath {
            points: vec![p],
            closed: false,
        });
    }

    /// Extend the current sub-path, starting one if there is none.
    pub fn line_to(&mut self, p: PixelPoint) {
        match self.subpaths.last_mut() {
            Some(sub) if !sub.closed => sub.points.push(p),
            _ => self.move_to(p),
        }
    }

    /// Close the current sub-path back to its first point.
    pub fn close(&mut self) {
        if let Some(sub) = self.subpaths.last_mut() {
            sub.closed = true;
        }
    }

    /// Append all sub-paths of `other` without connecting them.
    pub fn append(&mut self, other: &RenderPath) {
        self.subpaths.extend(other.subpaths.iter().cloned());
    }

    /// True once any sub-path has been started
    #[inline(always)]
    pub fn has_current_point(&self) -> bool {
        !self.subpaths.is_empty()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.subpaths.is_empty()
    }

    pub fn subpaths(&self) -> &[SubPath] {
        &self.subpaths
    }

    pub fn point_count(&self) -> usize {
        self.subpaths.iter().map(|s| s.points.len()).sum()
    }

    pub fn clear(&mut self) {
        self.subpaths.clear();
    }
}

/// A projected feature and whether projecting it broke the line.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssembledPath {
    pub path: RenderPath,
    /// More than one sub-path was needed
    pub discontinuous: bool,
}

/// Project a point sequence into a path, breaking it wherever a segment
/// cannot be drawn.
///
/// Every point is projected exactly once. A segment with an unprojectable
/// endpoint always breaks the path; otherwise, unless `fast_mode` is set,
/// the detector decides. Fast mode never reports a discontinuity.
pub fn assemble(
    points: &[GeographicLocation],
    pipeline: &EarthImageTransform,
    detector: &DiscontinuityDetector,
    fast_mode: bool,
) -> AssembledPath {
    let mut path = RenderPath::new();
    let mut started = 0usize;
    let mut broken = true;

    let mut prev = match points.first() {
        Some(first) => (first, pipeline.geo_to_pixel(first)),
        None => return AssembledPath::default(),
    };

    for next in &points[1..] {
        let pixel = pipeline.geo_to_pixel(next);
        let (loc, prev_pixel) = prev;

        let drawable = match (prev_pixel, pixel) {
            (Some(_), Some(_)) => fast_mode || !detector.is_discontinuous(pipeline, loc, next, prev_pixel, pixel),
            _ => false,
        };

        match (drawable, prev_pixel, pixel) {
            (true, Some(a), Some(b)) => {
                if broken {
                    path.move_to(a);
                    started += 1;
                }
                path.line_to(b);
                broken = false;
            }
            _ => broken = true,
        }

        prev = (next, pixel);
    }

    AssembledPath {
        path,
        discontinuous: !fast_mode && started > 1,
    }
}

struct CachedPath {
    points: Weak<[GeographicLocation]>,
    path: Arc<AssembledPath>,
}

struct PathCache {
    pipeline: Weak<EarthImageTransform>,
    entries: HashMap<usize, CachedPath>,
    prune_at: usize,
}

const MIN_PRUNE_AT: usize = 256;

/// Assembles feature paths and remembers them for the pipeline they were
/// projected with.
///
/// Entries are keyed by the identity of a feature's shared point sequence.
/// Presenting a different pipeline instance drops every entry.
pub struct PathAssembler {
    options: RenderOptions,
    detector: DiscontinuityDetector,
    cache: Mutex<PathCache>,
}

impl Default for PathAssembler {
    fn default() -> Self {
        Self::new(RenderOptions::default())
    }
}

impl PathAssembler {
    pub fn new(options: RenderOptions) -> Self {
        Self {
            options,
            detector: DiscontinuityDetector::from_options(&options),
            cache: Mutex::new(PathCache {
                pipeline: Weak::new(),
                entries: HashMap::new(),
                prune_at: MIN_PRUNE_AT,
            }),
        }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Change rendering options, dropping cached paths.
    pub fn set_options(&mut self, options: RenderOptions) {
        self.options = options;
        self.detector = DiscontinuityDetector::from_options(&options);
        self.cache.get_mut().entries.clear();
    }

    /// Path for `feature` under `pipeline`, assembled on first request.
    pub fn path_for(&self, feature: &Feature, pipeline: &Arc<EarthImageTransform>) -> Arc<AssembledPath> {
        let mut cache = self.cache.lock();

        if !std::ptr::eq(cache.pipeline.as_ptr(), Arc::as_ptr(pipeline)) {
            trace!(dropped = cache.entries.len(), "pipeline changed, clearing path cache");
            cache.entries.clear();
            cache.prune_at = MIN_PRUNE_AT;
            cache.pipeline = Arc::downgrade(pipeline);
        }

        let points = feature.shared_points();
        let key = Arc::as_ptr(points).cast::<GeographicLocation>() as usize;
        if let Some(hit) = cache.entries.get(&key) {
            // The weak handle pins the allocation, so an equal pointer is
            // the same sequence
            if std::ptr::eq(hit.points.as_ptr(), Arc::as_ptr(points)) {
                return Arc::clone(&hit.path);
            }
        }

        let path = Arc::new(assemble(points, pipeline, &self.detector, self.options.fast_mode));
        cache.entries.insert(
            key,
            CachedPath {
                points: Arc::downgrade(points),
                path: Arc::clone(&path),
            },
        );

        if cache.entries.len() >= cache.prune_at {
            cache.entries.retain(|_, e| e.points.strong_count() > 0);
            cache.prune_at = (cache.entries.len() * 2).max(MIN_PRUNE_AT);
        }
        path
    }

    /// Number of cached paths
    pub fn cached(&self) -> usize {
        self.cache.lock().entries.len()
    }
}
