use std::sync::Arc;

use tracing::debug;

use crate::config::RenderOptions;
use crate::feature::PolygonFeature;
use crate::map::EarthImageTransform;
use crate::render::{FillRule, PathAssembler, RenderPath, RenderStats, RenderTarget};

/// Renders sentinel-delimited polygon groups as single non-zero fills.
///
/// Nested rings in a group wind in opposite directions, so filling the
/// whole group at once leaves lakes empty and islands in lakes solid. A
/// group containing a discontinuous polygon cannot be filled correctly and
/// is dropped entirely.
pub struct PolygonWindingAssembler {
    paths: PathAssembler,
}

impl Default for PolygonWindingAssembler {
    fn default() -> Self {
        Self::new(RenderOptions::default())
    }
}

impl PolygonWindingAssembler {
    pub fn new(options: RenderOptions) -> Self {
        Self {
            paths: PathAssembler::new(options),
        }
    }

    pub fn paths(&self) -> &PathAssembler {
        &self.paths
    }

    pub fn render_filled(
        &self,
        polygons: &[PolygonFeature],
        pipeline: &Arc<EarthImageTransform>,
        target: &mut dyn RenderTarget,
    ) -> RenderStats {
        let mut stats = RenderStats::default();
        let mut group = RenderPath::new();
        let mut skipping = false;

        for polygon in polygons {
            if polygon.is_sentinel() {
                if !skipping {
                    flush(&mut group, target, &mut stats);
                }
                group.clear();
                skipping = false;
                continue;
            }
            if skipping {
                continue;
            }

            let assembled = self.paths.path_for(polygon.feature(), pipeline);
            if !assembled.path.has_current_point() {
                continue;
            }

            if assembled.discontinuous {
                debug!(
                    level = ?polygon.level(),
                    points = polygon.points().len(),
                    "discontinuous polygon, skipping group"
                );
                stats.skipped_groups += 1;
                skipping = true;
                group.clear();
                continue;
            }

            group.append(&assembled.path);
            group.close();
        }

        if !skipping {
            flush(&mut group, target, &mut stats);
        }
        stats
    }

    /// Stroke every polygon on its own, ignoring groups. Continuous rings
    /// are closed; broken ones are stroked as their open pieces.
    pub fn render_outlines(
        &self,
        polygons: &[PolygonFeature],
        pipeline: &Arc<EarthImageTransform>,
        target: &mut dyn RenderTarget,
    ) -> RenderStats {
        let mut stats = RenderStats::default();
        for polygon in polygons.iter().filter(|p| !p.is_sentinel()) {
            let assembled = self.paths.path_for(polygon.feature(), pipeline);
            if assembled.path.is_empty() {
                continue;
            }
            if assembled.discontinuous {
                target.stroke(&assembled.path);
            } else {
                let mut ring = assembled.path.clone();
                ring.close();
                target.stroke(&ring);
            }
            stats.strokes += 1;
        }
        stats
    }
}

fn flush(group: &mut RenderPath, target: &mut dyn RenderTarget, stats: &mut RenderStats) {
    if group.is_empty() {
        return;
    }
    target.fill(group, FillRule::NonZero);
    stats.fills += 1;
    group.clear();
}
