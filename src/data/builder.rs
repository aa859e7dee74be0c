//! Writer for the indexed binary database format.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use super::index::CELL_TABLE_LEN;
use super::record::{write_points, FeatureHeader, HEADER_LEN};
use crate::area::{EarthArea, TOTAL_CELLS};
use crate::error::{StoreError, StoreResult};
use crate::feature::{unwrapped_lons, PolygonLevel};
use crate::geo::{lon_range, GeographicLocation};

/// Level code stored for records that are plain lines
const LINE_LEVEL: i32 = 0;

struct PendingRecord {
    header: FeatureHeader,
    points: Vec<GeographicLocation>,
}

/// Accumulates features and writes a `<name>.index` / `<name>.b` pair.
#[derive(Default)]
pub struct DatabaseBuilder {
    records: Vec<PendingRecord>,
}

impl DatabaseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_polygon(&mut self, level: PolygonLevel, area_km2: f64, points: Vec<GeographicLocation>) -> i32 {
        self.add_record(level.code(), area_km2, 0, points)
    }

    pub fn add_line(&mut self, points: Vec<GeographicLocation>) -> i32 {
        self.add_record(LINE_LEVEL, 0.0, 0, points)
    }

    /// Add a record and return its id. Ids are assigned sequentially.
    pub fn add_record(&mut self, level: i32, area_km2: f64, source: i16, points: Vec<GeographicLocation>) -> i32 {
        let id = self.records.len() as i32;
        let lons = unwrapped_lons(&points);
        let (mut west, mut east) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut south, mut north) = (f64::INFINITY, f64::NEG_INFINITY);
        for (lon, p) in lons.iter().zip(&points) {
            west = west.min(*lon);
            east = east.max(*lon);
            south = south.min(p.lat);
            north = north.max(p.lat);
        }
        if points.is_empty() {
            (west, east, south, north) = (0.0, 0.0, 0.0, 0.0);
        }
        let span = east - west;
        let west = lon_range(west);

        self.records.push(PendingRecord {
            header: FeatureHeader {
                id,
                point_count: points.len() as u32,
                level,
                west,
                east: west + span,
                south,
                north,
                area_km2,
                crosses_antimeridian: west + span > 180.0,
                source,
                offset: 0,
            },
            points,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write every record and return their byte offsets in insertion order.
    pub fn write_data<W: Write>(&self, writer: &mut W) -> StoreResult<Vec<u64>> {
        let mut offsets = Vec::with_capacity(self.records.len());
        let mut offset = 0u64;
        for record in &self.records {
            offsets.push(offset);
            record.header.write_to(writer)?;
            write_points(writer, &record.points)?;
            offset += HEADER_LEN + record.header.body_len();
        }
        Ok(offsets)
    }

    /// Write the cell index for records laid out at `offsets`.
    pub fn write_index<W: Write>(&self, writer: &mut W, offsets: &[u64]) -> StoreResult<()> {
        let mut lists: Vec<Vec<i32>> = vec![Vec::new(); TOTAL_CELLS];
        for (record, &offset) in self.records.iter().zip(offsets) {
            let offset = i32::try_from(offset)
                .map_err(|_| StoreError::malformed("database", format!("record offset {offset} exceeds i32")))?;
            for cell in touched_cells(&record.points).cell_indices() {
                lists[cell].push(offset);
            }
        }

        let mut table = Vec::with_capacity(TOTAL_CELLS);
        let mut tail: Vec<u8> = Vec::new();
        for (cell, list) in lists.iter().enumerate() {
            if list.is_empty() {
                table.push(-1);
                continue;
            }
            let count = i16::try_from(list.len())
                .map_err(|_| StoreError::malformed("database", format!("cell {cell} holds {} records", list.len())))?;
            let location = CELL_TABLE_LEN + tail.len();
            let location = i32::try_from(location)
                .map_err(|_| StoreError::malformed("database", format!("index location {location} exceeds i32")))?;
            table.push(location);
            tail.extend_from_slice(&count.to_be_bytes());
            for &offset in list {
                tail.extend_from_slice(&offset.to_be_bytes());
            }
        }

        for location in table {
            writer.write_all(&location.to_be_bytes())?;
        }
        writer.write_all(&tail)?;
        Ok(())
    }

    /// Write `<name>.b` and `<name>.index` into `dir`, returning the index
    /// and data paths.
    pub fn write_to_dir(&self, dir: impl AsRef<Path>, name: &str) -> StoreResult<(PathBuf, PathBuf)> {
        let dir = dir.as_ref();
        let data_path = dir.join(format!("{name}.b"));
        let index_path = dir.join(format!("{name}.index"));

        let mut data = BufWriter::new(File::create(&data_path)?);
        let offsets = self.write_data(&mut data)?;
        data.flush()?;

        let mut index = BufWriter::new(File::create(&index_path)?);
        self.write_index(&mut index, &offsets)?;
        index.flush()?;

        info!(database = name, records = self.records.len(), "wrote feature database");
        Ok((index_path, data_path))
    }
}

/// Cells covered by the bounding box of every segment of a point run.
fn touched_cells(points: &[GeographicLocation]) -> EarthArea {
    let mut area = EarthArea::new();
    if let [only] = points {
        area.add(only);
        return area;
    }
    for pair in points.windows(2) {
        let lons = unwrapped_lons(pair);
        let lon0 = lons[0].min(lons[1]).floor() as i32;
        let lon1 = lons[0].max(lons[1]).floor() as i32;
        let lat0 = (pair[0].lat.min(pair[1].lat).floor() as i32).clamp(-90, 89);
        let lat1 = (pair[0].lat.max(pair[1].lat).floor() as i32).clamp(-90, 89);
        for lat in lat0..=lat1 {
            for lon in lon0..=lon1 {
                area.add_cell(lat, (lon + 180).rem_euclid(360) - 180);
            }
        }
    }
    area
}
