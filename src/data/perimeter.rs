//! Polygon assembly inside one bin of a binned coastline database.
//!
//! Open segments enter and leave a bin through its sides. A position on the
//! bin perimeter is keyed `side << 16 | offset` with offsets counted
//! counter-clockwise from the south-west corner, so ascending keys walk the
//! perimeter counter-clockwise. A land ring follows its segments and, between
//! one segment's exit and the next entry, the perimeter counter-clockwise.
//! Water rings walk it clockwise.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{StoreError, StoreResult};
use crate::feature::{Feature, PolygonFeature, PolygonLevel};
use crate::geo::GeographicLocation;

pub(crate) const SOUTH: u8 = 0;
pub(crate) const EAST: u8 = 1;
pub(crate) const NORTH: u8 = 2;
pub(crate) const WEST: u8 = 3;
/// Entry side of a segment that is a closed ring inside the bin
pub(crate) const CLOSED: u8 = 4;

pub(crate) const MAX_OFFSET: u16 = 0xffff;
const LAST_KEY: u32 = ((WEST as u32) << 16) | MAX_OFFSET as u32;

/// Perimeter key of a point on `side`, from its raw offsets within the bin.
pub(crate) fn side_key(side: u8, dx: u16, dy: u16) -> Option<u32> {
    let offset = match side {
        SOUTH => dx,
        EAST => dy,
        NORTH => MAX_OFFSET - dx,
        WEST => MAX_OFFSET - dy,
        _ => return None,
    };
    Some(((side as u32) << 16) | offset as u32)
}

/// Side of the bin edge a raw point lies on, or [`CLOSED`] for interior
/// points.
pub(crate) fn edge_side(dx: u16, dy: u16) -> u8 {
    match (dx, dy) {
        (_, 0) => SOUTH,
        (MAX_OFFSET, _) => EAST,
        (_, MAX_OFFSET) => NORTH,
        (0, _) => WEST,
        _ => CLOSED,
    }
}

fn successor(key: u32, reverse: bool) -> u32 {
    match (reverse, key) {
        (true, 0) => LAST_KEY,
        (true, key) => key - 1,
        (false, LAST_KEY) => 0,
        (false, key) => key + 1,
    }
}

/// First key at or past `from` in walking order, wrapping around.
fn next_key<'a>(keys: impl DoubleEndedIterator<Item = &'a u32> + Clone, from: u32, reverse: bool) -> Option<u32> {
    let found = if reverse {
        keys.clone().rev().find(|&&k| k <= from).or_else(|| keys.clone().next_back())
    } else {
        keys.clone().find(|&&k| k >= from).or_else(|| keys.clone().next())
    };
    found.copied()
}

/// South-west corner and edge length of a bin.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BinFrame {
    pub lat: f64,
    pub lon: f64,
    pub size: f64,
}

impl BinFrame {
    fn location(&self, key: u32) -> GeographicLocation {
        let side = (key >> 16) as u8;
        let mut offset = (key & 0xffff) as u16;
        if side == NORTH || side == WEST {
            offset = MAX_OFFSET - offset;
        }
        let d = offset as f64 * self.size / MAX_OFFSET as f64;
        match side {
            SOUTH => GeographicLocation::new(self.lat, self.lon + d),
            EAST => GeographicLocation::new(self.lat + d, self.lon + self.size),
            NORTH => GeographicLocation::new(self.lat + self.size, self.lon + d),
            _ => GeographicLocation::new(self.lat + d, self.lon),
        }
    }
}

/// One decoded segment of a bin.
pub(crate) struct BinSegment<'a> {
    pub level: u8,
    /// Entry and exit perimeter keys; `None` for closed rings
    pub keys: Option<(u32, u32)>,
    pub points: &'a [GeographicLocation],
}

fn polygon_level(bin: usize, level: u8) -> StoreResult<PolygonLevel> {
    PolygonLevel::from_code(level as i32)
        .ok_or_else(|| StoreError::malformed("remote bin", format!("bin {bin} has a segment at level {level}")))
}

/// Assemble the fillable polygons of a bin, outermost level first.
///
/// `corner_levels` gives the level of the area at each bin corner and
/// decides whether a bin with no rings is prefilled as land.
pub(crate) fn assemble(
    bin: usize,
    frame: BinFrame,
    corner_levels: [u8; 4],
    segments: &[BinSegment<'_>],
) -> StoreResult<Vec<PolygonFeature>> {
    let mut order: Vec<usize> = (0..segments.len()).filter(|&i| !segments[i].points.is_empty()).collect();
    order.sort_by_key(|&i| segments[i].level);

    let open: Vec<(usize, u32, u32)> = order
        .iter()
        .filter_map(|&i| segments[i].keys.map(|(entry, exit)| (i, entry, exit)))
        .collect();

    let mut perimeter: BTreeSet<u32> = (0..4u32).map(|side| side << 16).collect();
    for &(_, entry, exit) in &open {
        perimeter.insert(entry);
        perimeter.insert(exit);
    }

    let mut polygons = Vec::new();
    for group in open.chunk_by(|a, b| segments[a.0].level == segments[b.0].level) {
        let level = polygon_level(bin, segments[group[0].0].level)?;
        let reverse = !level.is_land();
        let entries: BTreeMap<u32, usize> = group.iter().map(|&(i, entry, _)| (entry, i)).collect();
        let keys: BTreeMap<usize, (u32, u32)> = group.iter().map(|&(i, entry, exit)| (i, (entry, exit))).collect();
        let mut remaining: Vec<usize> = group.iter().map(|&(i, _, _)| i).collect();

        while let Some(&first) = remaining.first() {
            let mut ring: Vec<GeographicLocation> = Vec::new();
            let mut next = first;
            loop {
                let this = next;
                let Some(pos) = remaining.iter().position(|&i| i == this) else {
                    return Err(StoreError::malformed(
                        "remote bin",
                        format!("level {} segments of bin {bin} do not close", level.code()),
                    ));
                };
                remaining.remove(pos);
                let points = segments[this].points;
                if ring.last() == points.first() {
                    ring.pop();
                }
                ring.extend_from_slice(points);

                let exit = keys[&this].1;
                let mut entry = next_key(entries.keys(), exit, reverse).unwrap_or(exit);
                next = entries.get(&entry).copied().unwrap_or(first);
                if next == this && this != first {
                    entry = keys[&first].0;
                    next = first;
                }
                if exit != entry {
                    let mut key = next_key(perimeter.iter(), successor(exit, reverse), reverse);
                    while let Some(corner) = key.filter(|&k| k != entry) {
                        ring.push(frame.location(corner));
                        key = next_key(perimeter.iter(), successor(corner, reverse), reverse);
                    }
                }
                if next == first {
                    break;
                }
            }
            polygons.push(PolygonFeature::new(Feature::new(ring), level));
        }
    }

    for &i in order.iter().filter(|&&i| segments[i].keys.is_none()) {
        let level = polygon_level(bin, segments[i].level)?;
        polygons.push(PolygonFeature::new(Feature::new(segments[i].points.to_vec()), level));
    }

    let fill = if polygons.is_empty() {
        corner_levels
            .iter()
            .min()
            .and_then(|&level| PolygonLevel::from_code(level as i32))
            .filter(|level| level.is_land())
    } else {
        order
            .first()
            .and_then(|&i| PolygonLevel::from_code(segments[i].level as i32))
            .filter(|level| !level.is_land())
            .and_then(PolygonLevel::parent)
    };
    if let Some(level) = fill {
        let ring = perimeter.iter().map(|&key| frame.location(key)).collect();
        polygons.insert(0, PolygonFeature::new(Feature::new(ring), level));
    }

    Ok(polygons)
}
