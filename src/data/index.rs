use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

use super::record::{be_i16, be_i32};
use crate::area::{EarthArea, TOTAL_CELLS};
use crate::error::{StoreError, StoreResult};

/// Byte length of the dense cell offset table at the start of an index file
pub const CELL_TABLE_LEN: usize = TOTAL_CELLS * 4;

/// Resident spatial index: for every 1°×1° cell, the sorted byte offsets of
/// data records touching it.
///
/// The file starts with one big-endian i32 per cell, addressed
/// `(lat + 90) * 360 + (lon + 180)`. A value of -1 means the cell is empty;
/// otherwise it points at an i16 count followed by that many i32 record
/// offsets.
#[derive(Debug)]
pub struct SpatialIndex {
    cells: Vec<Box<[u32]>>,
}

impl SpatialIndex {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(path.to_path_buf()),
            _ => StoreError::Io(e),
        })?;
        let index = Self::from_bytes(&bytes)?;
        debug!(path = %path.display(), records = index.record_refs(), "opened spatial index");
        Ok(index)
    }

    /// Parse and validate a whole index file.
    pub fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        if bytes.len() < CELL_TABLE_LEN {
            return Err(StoreError::malformed(
                "spatial index",
                format!("{} bytes is shorter than the {CELL_TABLE_LEN} byte cell table", bytes.len()),
            ));
        }

        let mut cells = Vec::with_capacity(TOTAL_CELLS);
        for cell in 0..TOTAL_CELLS {
            let location = be_i32(bytes, cell * 4);
            if location == -1 {
                cells.push(Box::default());
                continue;
            }
            cells.push(Self::read_list(bytes, cell, location)?);
        }
        Ok(Self { cells })
    }

    fn read_list(bytes: &[u8], cell: usize, location: i32) -> StoreResult<Box<[u32]>> {
        let bad = |reason: String| StoreError::malformed("spatial index", format!("cell {cell}: {reason}"));

        if location < 0 || location as usize + 2 > bytes.len() {
            return Err(bad(format!("list location {location} outside the file")));
        }
        let start = location as usize;
        let count = be_i16(bytes, start);
        if count < 0 {
            return Err(bad(format!("negative offset count {count}")));
        }
        let list = &bytes[start + 2..];
        if list.len() < count as usize * 4 {
            return Err(bad("truncated offset list".to_string()));
        }

        let mut offsets = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            let offset = be_i32(list, i * 4);
            if offset < 0 {
                return Err(bad(format!("negative record offset {offset}")));
            }
            offsets.push(offset as u32);
        }
        offsets.sort_unstable();
        offsets.dedup();
        Ok(offsets.into_boxed_slice())
    }

    /// Offsets of records in one cell
    pub fn cell_offsets(&self, cell: usize) -> &[u32] {
        self.cells.get(cell).map_or(&[][..], |c| &c[..])
    }

    /// Sorted, de-duplicated record offsets over every cell of the area.
    pub fn query(&self, area: &EarthArea) -> Vec<u64> {
        let mut offsets: Vec<u64> = area
            .cell_indices()
            .flat_map(|cell| self.cell_offsets(cell).iter().map(|&o| o as u64))
            .collect();
        offsets.sort_unstable();
        offsets.dedup();
        offsets
    }

    /// Total record references across all cells
    pub fn record_refs(&self) -> usize {
        self.cells.iter().map(|c| c.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::cell_index;

    fn index_bytes(lists: &[(usize, Vec<i32>)]) -> Vec<u8> {
        let mut table = vec![-1i32; TOTAL_CELLS];
        let mut tail = Vec::new();
        for (cell, offsets) in lists {
            table[*cell] = (CELL_TABLE_LEN + tail.len()) as i32;
            tail.extend_from_slice(&(offsets.len() as i16).to_be_bytes());
            for &o in offsets {
                tail.extend_from_slice(&o.to_be_bytes());
            }
        }
        let mut bytes = Vec::new();
        for t in table {
            bytes.extend_from_slice(&t.to_be_bytes());
        }
        bytes.extend(tail);
        bytes
    }

    #[test]
    fn test_empty_cell_yields_nothing() {
        let bytes = index_bytes(&[(cell_index(0, 0).unwrap(), vec![0, 100])]);
        let index = SpatialIndex::from_bytes(&bytes).unwrap();

        let mut area = EarthArea::new();
        area.add_cell(10, 20);
        assert!(index.query(&area).is_empty());
    }

    #[test]
    fn test_query_unions_sorted_unique() {
        let a = cell_index(0, 0).unwrap();
        let b = cell_index(0, 1).unwrap();
        let bytes = index_bytes(&[(a, vec![500, 0, 100]), (b, vec![100, 900])]);
        let index = SpatialIndex::from_bytes(&bytes).unwrap();

        let mut area = EarthArea::new();
        area.add_cell(0, 0);
        area.add_cell(0, 1);
        assert_eq!(index.query(&area), vec![0, 100, 500, 900]);
        assert_eq!(index.record_refs(), 5);
    }

    #[test]
    fn test_short_file_is_malformed() {
        let err = SpatialIndex::from_bytes(&[0u8; 16]).unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));
    }

    #[test]
    fn test_dangling_list_is_malformed() {
        let mut bytes = index_bytes(&[]);
        // Point cell 0 past the end of the file
        bytes[..4].copy_from_slice(&(CELL_TABLE_LEN as i32 + 64).to_be_bytes());
        assert!(matches!(
            SpatialIndex::from_bytes(&bytes),
            Err(StoreError::Malformed { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = SpatialIndex::open(dir.path().join("nope.index")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
