//! Geographic area of interest as a set of 1°×1° cells.
//!
//! Cells are numbered `(lat + 90) * 360 + (lon + 180)` for integer south-west
//! corners, the same addressing the binary spatial index uses, so iterating an
//! area in cell order visits index entries sequentially.

use crate::geo::{lon_range, GeographicLocation, GridLocation};
use crate::map::{EarthProjection, TransformError};

const LON_CELLS: usize = 360;
const LAT_CELLS: usize = 180;
pub const TOTAL_CELLS: usize = LON_CELLS * LAT_CELLS;
const WORDS: usize = TOTAL_CELLS.div_ceil(64);

/// Probe directions used while exploring: 4 edge neighbours then diagonals.
const PROBE_LAT: [f64; 8] = [1.0, 0.0, -1.0, 0.0, 1.0, -1.0, -1.0, 1.0];
const PROBE_LON: [f64; 8] = [0.0, 1.0, 0.0, -1.0, 1.0, 1.0, -1.0, -1.0];

/// Index of the cell with south-west corner (lat, lon), if on the globe.
#[inline(always)]
pub fn cell_index(lat: i32, lon: i32) -> Option<usize> {
    if !(-90..=89).contains(&lat) || !(-180..=179).contains(&lon) {
        return None;
    }
    Some((lat + 90) as usize * LON_CELLS + (lon + 180) as usize)
}

/// South-west corner (lat, lon) of a cell index.
#[inline(always)]
pub fn cell_corner(index: usize) -> (i32, i32) {
    ((index / LON_CELLS) as i32 - 90, (index % LON_CELLS) as i32 - 180)
}

/// Set of 1°×1° cells covering part of the globe.
#[derive(Clone, PartialEq, Eq)]
pub struct EarthArea {
    bits: Box<[u64; WORDS]>,
}

impl std::fmt::Debug for EarthArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EarthArea")
            .field("cells", &self.len())
            .field("extremes", &self.extremes())
            .finish()
    }
}

impl Default for EarthArea {
    fn default() -> Self {
        Self::new()
    }
}

impl EarthArea {
    /// Empty area
    pub fn new() -> Self {
        Self {
            bits: Box::new([0u64; WORDS]),
        }
    }

    /// Area covering the whole globe
    pub fn world() -> Self {
        let mut area = Self::new();
        area.add_all();
        area
    }

    /// Area covering every cell touched by a lat/lon box. `west > east`
    /// describes a box crossing the antimeridian.
    pub fn from_bounds(south: f64, west: f64, north: f64, east: f64) -> Self {
        let mut area = Self::new();
        let lat0 = (south.floor() as i32).clamp(-90, 89);
        let lat1 = ((north.ceil() as i32) - 1).clamp(-90, 89);
        let width = if east - west >= 360.0 {
            360.0
        } else {
            (east - west).rem_euclid(360.0)
        };
        let west = lon_range(west);
        let lon0 = west.floor() as i32;
        let span = ((west + width).ceil() as i32 - lon0).clamp(1, 360);
        for lat in lat0..=lat1.max(lat0) {
            for step in 0..span {
                let lon = (lon0 + step + 180).rem_euclid(360) - 180;
                area.add_cell(lat, lon);
            }
        }
        area
    }

    /// Build the area visible in the grid rectangle `min..=max` of a
    /// projection by flood-filling outward from the rectangle centre, then
    /// padding by one cell so features straddling the edge are kept.
    pub fn from_grid_bounds(
        projection: &dyn EarthProjection,
        min: &GridLocation,
        max: &GridLocation,
    ) -> Result<Self, TransformError> {
        let center = GridLocation::new((min.row + max.row) / 2.0, (min.col + max.col) / 2.0);
        let start = projection.grid_to_geo(&center);
        if !start.is_valid() {
            return Err(TransformError::NoEarthLocation {
                row: center.row,
                col: center.col,
            });
        }
        let mut area = Self::new();
        area.explore(projection, min, max, &start);
        area.expand();
        Ok(area)
    }

    #[inline(always)]
    fn get_bit(&self, index: usize) -> bool {
        (self.bits[index / 64] >> (index % 64)) & 1 == 1
    }

    #[inline(always)]
    fn set_bit(&mut self, index: usize) {
        self.bits[index / 64] |= 1u64 << (index % 64);
    }

    #[inline(always)]
    fn clear_bit(&mut self, index: usize) {
        self.bits[index / 64] &= !(1u64 << (index % 64));
    }

    /// Does the area contain the cell holding this location?
    pub fn contains(&self, loc: &GeographicLocation) -> bool {
        if !loc.is_valid() {
            return false;
        }
        let (lat, lon) = loc.cell();
        self.contains_cell(lat, lon)
    }

    pub fn contains_cell(&self, lat: i32, lon: i32) -> bool {
        cell_index(lat, lon).is_some_and(|i| self.get_bit(i))
    }

    /// Add the cell holding this location
    pub fn add(&mut self, loc: &GeographicLocation) {
        if loc.is_valid() {
            let (lat, lon) = loc.cell();
            self.add_cell(lat, lon);
        }
    }

    pub fn add_cell(&mut self, lat: i32, lon: i32) {
        if let Some(i) = cell_index(lat, lon) {
            self.set_bit(i);
        }
    }

    pub fn remove(&mut self, loc: &GeographicLocation) {
        if !loc.is_valid() {
            return;
        }
        let (lat, lon) = loc.cell();
        if let Some(i) = cell_index(lat, lon) {
            self.clear_bit(i);
        }
    }

    pub fn add_all(&mut self) {
        self.bits.fill(u64::MAX);
        // Clear padding bits past the last cell
        let tail = TOTAL_CELLS % 64;
        if tail != 0 {
            self.bits[WORDS - 1] = (1u64 << tail) - 1;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&w| w == 0)
    }

    /// Number of cells in the area
    pub fn len(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Cells common to both areas
    pub fn intersection(&self, other: &EarthArea) -> EarthArea {
        let mut area = self.clone();
        for (a, b) in area.bits.iter_mut().zip(other.bits.iter()) {
            *a &= *b;
        }
        area
    }

    /// Iterate cell indices in ascending order
    pub fn cell_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter().enumerate().flat_map(|(word_idx, &word)| {
            let mut w = word;
            std::iter::from_fn(move || {
                if w == 0 {
                    return None;
                }
                let bit = w.trailing_zeros() as usize;
                w &= w - 1;
                Some(word_idx * 64 + bit)
            })
        })
    }

    /// Iterate south-west corners (lat, lon) of the cells in ascending
    /// index order.
    pub fn cells(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.cell_indices().map(cell_corner)
    }

    /// Grow the area by one cell in every direction.
    pub fn expand(&mut self) {
        let base: Vec<usize> = self.cell_indices().collect();
        for index in base {
            let (lat, lon) = cell_corner(index);
            let center = GeographicLocation::new(lat as f64 + 0.5, lon as f64 + 0.5);
            for (dlat, dlon) in PROBE_LAT.iter().zip(PROBE_LON.iter()) {
                self.add(&center.translate(*dlat, *dlon));
            }
        }
    }

    /// Flood-fill from `start`, adding every cell whose centre projects into
    /// the grid rectangle `min..=max`.
    pub fn explore(
        &mut self,
        projection: &dyn EarthProjection,
        min: &GridLocation,
        max: &GridLocation,
        start: &GeographicLocation,
    ) {
        let inside = |loc: &GeographicLocation| {
            let grid = projection.geo_to_grid(loc);
            grid.is_valid() && grid.is_contained(min, max)
        };

        let mut pending = EarthArea::new();
        pending.add(start);
        for (dlat, dlon) in PROBE_LAT.iter().zip(PROBE_LON.iter()) {
            pending.add(&start.translate(*dlat, *dlon));
        }

        let mut stack: Vec<usize> = pending.cell_indices().collect();
        while let Some(index) = stack.pop() {
            if self.get_bit(index) {
                continue;
            }
            let (lat, lon) = cell_corner(index);
            let center = GeographicLocation::new(lat as f64 + 0.5, lon as f64 + 0.5);
            if !inside(&center) {
                continue;
            }
            self.set_bit(index);
            for (dlat, dlon) in PROBE_LAT.iter().zip(PROBE_LON.iter()).take(4) {
                let sample = center.translate(*dlat, *dlon);
                let (plat, plon) = sample.cell();
                if let Some(pi) = cell_index(plat, plon) {
                    if !self.get_bit(pi) && !pending.get_bit(pi) {
                        pending.set_bit(pi);
                        stack.push(pi);
                    }
                }
            }
        }

        // Small views may not contain any cell centre
        if inside(start) {
            self.add(start);
        }
    }

    /// Bounding extremes as `[north, south, east, west]` in whole degrees.
    /// Areas spanning the whole longitude range but not crossing it are
    /// reported in 0..360 longitudes.
    pub fn extremes(&self) -> [i32; 4] {
        let mut cells = self.cells();
        let Some((lat, lon)) = cells.next() else {
            return [0, 0, 0, 0];
        };
        let lon_mod = |lon: i32| if lon < 0 { lon + 360 } else { lon };
        let (mut north, mut south, mut east, mut west) = (lat, lat, lon, lon);
        let (mut east_mod, mut west_mod) = (lon_mod(lon), lon_mod(lon));
        for (lat, lon) in cells {
            north = north.max(lat);
            south = south.min(lat);
            east = east.max(lon);
            west = west.min(lon);
            east_mod = east_mod.max(lon_mod(lon));
            west_mod = west_mod.min(lon_mod(lon));
        }
        if west == -180 && east == 179 {
            east = east_mod;
            west = west_mod;
        }
        [north + 1, south, east + 1, west]
    }
}
