//! Fixed-layout feature records of the binary database.
//!
//! Every record is a 36 byte big-endian header followed by `point_count`
//! `{lon_e6, lat_e6}` pairs of i32 micro-degrees.

use std::io::{self, Write};

use crate::error::{StoreError, StoreResult};
use crate::feature::{AttributeValue, PolygonLevel};
use crate::geo::{lon_range, GeographicLocation};

pub const HEADER_LEN: u64 = 36;
pub const POINT_LEN: u64 = 8;

/// Names of the attributes attached to binary database features, in order.
pub const ATTRIBUTE_NAMES: [&str; 4] = ["id", "level", "area_km2", "source"];

const MICRO: f64 = 1e-6;

#[inline(always)]
fn to_micro(deg: f64) -> i32 {
    (deg / MICRO).round() as i32
}

/// Big-endian i32 at `at`; the caller has checked the length.
#[inline(always)]
pub(crate) fn be_i32(buf: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

#[inline(always)]
pub(crate) fn be_i16(buf: &[u8], at: usize) -> i16 {
    i16::from_be_bytes([buf[at], buf[at + 1]])
}

/// Decoded record header.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureHeader {
    pub id: i32,
    pub point_count: u32,
    pub level: i32,
    /// Western edge in [-180, 180)
    pub west: f64,
    /// Eastern edge, `west` plus the box's longitude span, so it exceeds
    /// 180 for boxes crossing the antimeridian
    pub east: f64,
    pub south: f64,
    pub north: f64,
    pub area_km2: f64,
    pub crosses_antimeridian: bool,
    pub source: i16,
    /// Byte offset of the header in the data file
    pub offset: u64,
}

impl FeatureHeader {
    /// Parse a header from the start of `buf`. `offset` is the header's
    /// position in the data file, kept for error reporting and body reads.
    pub fn parse(buf: &[u8], offset: u64) -> StoreResult<Self> {
        if buf.len() < HEADER_LEN as usize {
            return Err(StoreError::decode(offset, "record header truncated"));
        }

        let id = be_i32(buf, 0);
        let point_count = be_i32(buf, 4);
        let level = be_i32(buf, 8);
        let west_e6 = be_i32(buf, 12);
        let east_e6 = be_i32(buf, 16);
        let south_e6 = be_i32(buf, 20);
        let north_e6 = be_i32(buf, 24);
        let area_e1 = be_i32(buf, 28);
        let antimeridian = be_i16(buf, 32);
        let source = be_i16(buf, 34);

        if point_count < 0 {
            return Err(StoreError::decode(
                offset,
                format!("impossible point count {point_count}"),
            ));
        }

        let raw_west = west_e6 as f64 * MICRO;
        let span = (east_e6 as f64 - west_e6 as f64) * MICRO;
        let west = lon_range(raw_west);

        Ok(Self {
            id,
            point_count: point_count as u32,
            level,
            west,
            east: west + span.clamp(0.0, 360.0),
            south: south_e6 as f64 * MICRO,
            north: north_e6 as f64 * MICRO,
            area_km2: area_e1 as f64 * 0.1,
            crosses_antimeridian: antimeridian != 0,
            source,
            offset,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let mut buf = [0u8; HEADER_LEN as usize];
        let fields = [
            self.id,
            self.point_count as i32,
            self.level,
            to_micro(self.west),
            to_micro(self.east),
            to_micro(self.south),
            to_micro(self.north),
            (self.area_km2 * 10.0).round() as i32,
        ];
        for (i, value) in fields.iter().enumerate() {
            buf[i * 4..i * 4 + 4].copy_from_slice(&value.to_be_bytes());
        }
        buf[32..34].copy_from_slice(&i16::from(self.crosses_antimeridian).to_be_bytes());
        buf[34..36].copy_from_slice(&self.source.to_be_bytes());
        writer.write_all(&buf)
    }

    /// Length of the point body following the header
    #[inline(always)]
    pub fn body_len(&self) -> u64 {
        self.point_count as u64 * POINT_LEN
    }

    pub fn polygon_level(&self) -> Option<PolygonLevel> {
        PolygonLevel::from_code(self.level)
    }

    /// Attributes in [`ATTRIBUTE_NAMES`] order
    pub fn attributes(&self) -> Vec<AttributeValue> {
        vec![
            AttributeValue::Int(self.id as i64),
            AttributeValue::Int(self.level as i64),
            AttributeValue::Float(self.area_km2),
            AttributeValue::Int(self.source as i64),
        ]
    }

    /// Whether the location falls in the header's bounding box.
    pub fn bounds_contain(&self, loc: &GeographicLocation) -> bool {
        if loc.lat < self.south || loc.lat > self.north {
            return false;
        }
        (loc.lon - self.west).rem_euclid(360.0) <= self.east - self.west
    }

    /// Bounding box area in square degrees, used to rank candidate parents.
    pub fn bounds_extent(&self) -> f64 {
        (self.north - self.south) * (self.east - self.west)
    }
}

/// Parse a record body from the start of `buf`. Consecutive duplicate
/// points are dropped.
pub fn parse_points(buf: &[u8], header: &FeatureHeader) -> StoreResult<Vec<GeographicLocation>> {
    if (buf.len() as u64) < header.body_len() {
        return Err(StoreError::decode(header.offset, "record body truncated"));
    }

    let mut points: Vec<GeographicLocation> = Vec::with_capacity(header.point_count as usize);
    for pair in buf[..header.body_len() as usize].chunks_exact(POINT_LEN as usize) {
        let lon = be_i32(pair, 0) as f64 * MICRO;
        let lat = be_i32(pair, 4) as f64 * MICRO;
        let loc = GeographicLocation::new(lat, lon);
        if points.last() != Some(&loc) {
            points.push(loc);
        }
    }
    Ok(points)
}

pub fn write_points<W: Write>(writer: &mut W, points: &[GeographicLocation]) -> io::Result<()> {
    for p in points {
        writer.write_all(&to_micro(p.lon).to_be_bytes())?;
        writer.write_all(&to_micro(p.lat).to_be_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(point_count: u32) -> FeatureHeader {
        FeatureHeader {
            id: 42,
            point_count,
            level: 2,
            west: 170.0,
            east: 190.0,
            south: -5.0,
            north: 5.0,
            area_km2: 1234.5,
            crosses_antimeridian: true,
            source: 1,
            offset: 0,
        }
    }

    #[test]
    fn test_header_is_36_bytes() {
        let mut buf = Vec::new();
        header(3).write_to(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, HEADER_LEN);

        let back = FeatureHeader::parse(&buf, 0).unwrap();
        assert_eq!(back.id, 42);
        assert_eq!(back.point_count, 3);
        assert_eq!(back.polygon_level(), Some(PolygonLevel::Lake));
        assert!((back.west - 170.0).abs() < 1e-9);
        assert!((back.east - 190.0).abs() < 1e-9);
        assert!((back.area_km2 - 1234.5).abs() < 1e-9);
        assert!(back.crosses_antimeridian);
    }

    #[test]
    fn test_bounds_across_antimeridian() {
        let h = header(0);
        assert!(h.bounds_contain(&GeographicLocation::new(0.0, 175.0)));
        assert!(h.bounds_contain(&GeographicLocation::new(0.0, -175.0)));
        assert!(!h.bounds_contain(&GeographicLocation::new(0.0, -165.0)));
        assert!(!h.bounds_contain(&GeographicLocation::new(10.0, 175.0)));
    }

    #[test]
    fn test_negative_point_count_is_rejected() {
        let mut buf = Vec::new();
        let mut h = header(0);
        h.point_count = u32::MAX;
        h.write_to(&mut buf).unwrap();
        let err = FeatureHeader::parse(&buf, 72).unwrap_err();
        assert!(matches!(err, StoreError::Decode { offset: 72, .. }));
    }

    #[test]
    fn test_duplicate_points_are_dropped() {
        let points = vec![
            GeographicLocation::new(1.0, 1.0),
            GeographicLocation::new(1.0, 1.0),
            GeographicLocation::new(2.0, 1.5),
            GeographicLocation::new(2.0, 1.5),
            GeographicLocation::new(1.0, 1.0),
        ];
        let mut buf = Vec::new();
        write_points(&mut buf, &points).unwrap();
        let decoded = parse_points(&buf, &header(5)).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[2], decoded[0]);
    }

    #[test]
    fn test_truncated_body() {
        let mut buf = Vec::new();
        write_points(&mut buf, &[GeographicLocation::new(1.0, 1.0)]).unwrap();
        let err = parse_points(&buf, &header(2)).unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));
    }
}
