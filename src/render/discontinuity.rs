use crate::config::RenderOptions;
use crate::geo::{GeographicLocation, PixelPoint};
use crate::map::EarthImageTransform;

/// Jump factor above which a projected segment is treated as a tear.
pub const DEFAULT_JUMP_THRESHOLD: f64 = 10.0;

/// Decides whether a projected segment is a projection artifact rather than
/// real geometry: a line across a wrap seam, through a singular pole or off
/// the visible hemisphere.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DiscontinuityDetector {
    threshold: f64,
}

impl Default for DiscontinuityDetector {
    fn default() -> Self {
        Self::new(DEFAULT_JUMP_THRESHOLD)
    }
}

impl DiscontinuityDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn from_options(options: &RenderOptions) -> Self {
        Self::new(options.jump_threshold)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// True when the segment `a -> b` should not be drawn. Pixels are the
    /// already projected endpoints; `None` means the endpoint has no image
    /// location, which always counts as a break.
    pub fn is_discontinuous(
        &self,
        pipeline: &EarthImageTransform,
        a: &GeographicLocation,
        b: &GeographicLocation,
        pixel_a: Option<PixelPoint>,
        pixel_b: Option<PixelPoint>,
    ) -> bool {
        let (Some(pa), Some(pb)) = (pixel_a, pixel_b) else {
            return true;
        };
        let jump = jump_factor(a.distance(b), pa.distance(pb), pipeline.resolution_at(pa));
        jump.is_nan() || jump > self.threshold
    }
}

/// How many times longer a segment is in the image than the local
/// resolution predicts. Continuous geometry sits near 1.
#[inline(always)]
pub fn jump_factor(earth_km: f64, image_px: f64, resolution_km: f64) -> f64 {
    (image_px / earth_km) / (1.0 / resolution_km)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::map::{Equirectangular, ImageDimensions};

    fn world() -> EarthImageTransform {
        EarthImageTransform::centered(
            Arc::new(Equirectangular::world(1.0)),
            ImageDimensions::new(360, 180),
            &GeographicLocation::new(0.0, 0.0),
            1.0,
        )
        .unwrap()
    }

    #[test]
    fn test_jump_factor_is_monotonic_in_image_distance() {
        let mut last = f64::NEG_INFINITY;
        for px in [0.5, 1.0, 2.0, 7.5, 40.0, 300.0] {
            let jump = jump_factor(111.0, px, 111.0);
            assert!(jump > last);
            last = jump;
        }
    }

    #[test]
    fn test_ordinary_segment_is_continuous() {
        let pipeline = world();
        let a = GeographicLocation::new(0.0, 10.0);
        let b = GeographicLocation::new(0.0, 11.0);
        let pa = pipeline.geo_to_pixel(&a);
        let pb = pipeline.geo_to_pixel(&b);
        assert!(!DiscontinuityDetector::default().is_discontinuous(&pipeline, &a, &b, pa, pb));
    }

    #[test]
    fn test_antimeridian_wrap_is_discontinuous() {
        let pipeline = world();
        let a = GeographicLocation::new(0.0, 179.9);
        let b = GeographicLocation::new(0.0, -179.9);
        let pa = pipeline.geo_to_pixel(&a);
        let pb = pipeline.geo_to_pixel(&b);
        assert!(pa.is_some() && pb.is_some());
        assert!(DiscontinuityDetector::default().is_discontinuous(&pipeline, &a, &b, pa, pb));
    }

    #[test]
    fn test_long_jump_exceeds_threshold() {
        let pipeline = world();
        let a = GeographicLocation::new(0.0, 10.0);
        let b = GeographicLocation::new(0.0, 11.0);
        let pa = pipeline.geo_to_pixel(&a).unwrap();
        let far = pa + PixelPoint::new(50.0, 0.0);

        let detector = DiscontinuityDetector::default();
        assert!(detector.is_discontinuous(&pipeline, &a, &b, Some(pa), Some(far)));
        // Same geometry passes with a looser threshold
        let loose = DiscontinuityDetector::new(100.0);
        assert!(!loose.is_discontinuous(&pipeline, &a, &b, Some(pa), Some(far)));
    }

    #[test]
    fn test_unprojectable_endpoint_is_discontinuous() {
        let pipeline = world();
        let a = GeographicLocation::new(0.0, 10.0);
        let b = GeographicLocation::new(0.0, 11.0);
        let pa = pipeline.geo_to_pixel(&a);
        assert!(DiscontinuityDetector::default().is_discontinuous(&pipeline, &a, &b, pa, None));
    }

    #[test]
    fn test_zero_length_segment_is_discontinuous() {
        let pipeline = world();
        let a = GeographicLocation::new(0.0, 10.0);
        let pa = pipeline.geo_to_pixel(&a);
        assert!(DiscontinuityDetector::default().is_discontinuous(&pipeline, &a, &a, pa, pa));
    }
}
