mod discontinuity;
mod path;
mod polygon;

use std::sync::Arc;

pub use discontinuity::{jump_factor, DiscontinuityDetector, DEFAULT_JUMP_THRESHOLD};
pub use path::{assemble, AssembledPath, PathAssembler, RenderPath, SubPath};
pub use polygon::PolygonWindingAssembler;

use crate::feature::Feature;
use crate::map::EarthImageTransform;

/// Rule deciding which regions of a multi-ring path are inside.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillRule {
    NonZero,
    EvenOdd,
}

/// Raster sink for assembled paths.
pub trait RenderTarget {
    fn fill(&mut self, path: &RenderPath, rule: FillRule);

    fn stroke(&mut self, path: &RenderPath);
}

/// Counts of what a render pass sent to its target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub fills: usize,
    pub strokes: usize,
    pub skipped_groups: usize,
}

/// Stroke each feature's assembled path. Features that project to nothing
/// are skipped.
pub fn render_lines<'a, I>(
    features: I,
    assembler: &PathAssembler,
    pipeline: &Arc<EarthImageTransform>,
    target: &mut dyn RenderTarget,
) -> RenderStats
where
    I: IntoIterator<Item = &'a Feature>,
{
    let mut stats = RenderStats::default();
    for feature in features {
        let assembled = assembler.path_for(feature, pipeline);
        if assembled.path.is_empty() {
            continue;
        }
        target.stroke(&assembled.path);
        stats.strokes += 1;
    }
    stats
}
