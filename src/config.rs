use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::render::DEFAULT_JUMP_THRESHOLD;

/// Default cache budget: 2 MiB worth of 8-byte points.
pub const DEFAULT_CACHE_POINTS: usize = 2048 * 1024 / 8;

/// Feature store settings. Every field has a default, so a partial
/// document deserializes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Polygons with a smaller header area (km²) are skipped before decode
    pub min_area_km2: Option<f64>,
    /// Point budget of the feature cache
    pub cache_points: usize,
    /// Also build the grouped polygon sequence on select
    pub polygon_rendering: bool,
    /// Worker threads for remote bin prefetch, 0 uses rayon's global pool
    pub fetch_threads: usize,
    /// Polygon levels delivered as line features, e.g. `1..=1` for
    /// coastlines without lake shores. `None` delivers every level.
    pub level_range: Option<RangeInclusive<i32>>,
}

impl StoreConfig {
    /// Whether line features of a record at `level` are delivered. Plain
    /// lines (level 0) always are.
    pub fn shows_level(&self, level: i32) -> bool {
        level == 0 || self.level_range.as_ref().map_or(true, |range| range.contains(&level))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            min_area_km2: None,
            cache_points: DEFAULT_CACHE_POINTS,
            polygon_rendering: false,
            fetch_threads: 0,
            level_range: None,
        }
    }
}

/// Per-call rendering options.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Treat every segment as continuous and skip discontinuity checks
    pub fast_mode: bool,
    pub jump_threshold: f64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            fast_mode: false,
            jump_threshold: DEFAULT_JUMP_THRESHOLD,
        }
    }
}

/// Database resolutions, named after their nominal coastline accuracy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    Crude,
    Low,
    Intermediate,
    High,
}

impl Resolution {
    pub const ALL: [Resolution; 4] = [
        Resolution::Crude,
        Resolution::Low,
        Resolution::Intermediate,
        Resolution::High,
    ];

    /// Nominal resolution in kilometres
    pub fn km(self) -> f64 {
        match self {
            Resolution::Crude => 25.0,
            Resolution::Low => 5.0,
            Resolution::Intermediate => 1.0,
            Resolution::High => 0.2,
        }
    }

    /// Database base name for this resolution
    pub fn database_name(self) -> &'static str {
        match self {
            Resolution::Crude => "gshhs_c",
            Resolution::Low => "gshhs_l",
            Resolution::Intermediate => "gshhs_i",
            Resolution::High => "gshhs_h",
        }
    }

    /// Resolution closest to `km`. Ties go to the coarser database.
    pub fn closest(km: f64) -> Resolution {
        let mut best = Resolution::Crude;
        for res in Self::ALL {
            if (res.km() - km).abs() < (best.km() - km).abs() {
                best = res;
            }
        }
        best
    }
}
