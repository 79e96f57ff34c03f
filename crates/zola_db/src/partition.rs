use std::collections::HashMap;
use std::fs;
use std::path::Path;

use memmap2::Mmap;
use zerocopy::FromBytes;

use zola_db_core::{ColumnType, Result, ZolaError};

use crate::format::*;

/// A read-only, memory-mapped view of one partition directory: one mmap
/// per `<col>.col` file plus any `<col>.idx` secondary indexes built for
/// symbol columns.
pub struct Partition {
    columns: HashMap<String, Mmap>,
    indexes: HashMap<String, Mmap>,
}

impl Partition {
    pub fn open(dir: &Path) -> Result<Partition> {
        let mut columns = HashMap::new();
        let mut indexes = HashMap::new();

        for entry in fs::read_dir(dir).map_err(|e| ZolaError::io(dir, e))? {
            let entry = entry.map_err(|e| ZolaError::io(dir, e))?;
            let path = entry.path();
            let Some(ext) = path.extension().map(|e| e.to_string_lossy().to_string()) else {
                continue;
            };

            match ext.as_str() {
                "col" => {
                    let name = path.file_stem().unwrap().to_string_lossy().to_string();
                    let mmap = map_file(&path)?;
                    if mmap.len() < HEADER_SIZE {
                        return Err(ZolaError::invalid(&path, "file too small for header"));
                    }
                    let header = ColumnHeader::ref_from_bytes(&mmap[..HEADER_SIZE])
                        .map_err(|e| ZolaError::invalid(&path, format!("bad header: {e}")))?;
                    if header.magic != COLUMN_MAGIC {
                        return Err(ZolaError::invalid(&path, "bad magic"));
                    }
                    columns.insert(name, mmap);
                }
                "idx" => {
                    let name = path.file_stem().unwrap().to_string_lossy().to_string();
                    let mmap = map_file(&path)?;
                    if mmap.len() < INDEX_HEADER_SIZE {
                        return Err(ZolaError::invalid(&path, "index file too small for header"));
                    }
                    let header = IndexHeader::ref_from_bytes(&mmap[..INDEX_HEADER_SIZE])
                        .map_err(|e| ZolaError::invalid(&path, format!("bad index header: {e}")))?;
                    if header.magic != INDEX_MAGIC {
                        return Err(ZolaError::invalid(&path, "bad index magic"));
                    }
                    indexes.insert(name, mmap);
                }
                _ => {}
            }
        }

        Ok(Partition { columns, indexes })
    }

    pub fn row_count(&self, col: &str) -> Option<u64> {
        let mmap = self.columns.get(col)?;
        let header = ColumnHeader::ref_from_bytes(&mmap[..HEADER_SIZE]).ok()?;
        Some(header.row_count)
    }

    pub fn col_type(&self, col: &str) -> Option<ColumnType> {
        let mmap = self.columns.get(col)?;
        let header = ColumnHeader::ref_from_bytes(&mmap[..HEADER_SIZE]).ok()?;
        match header.col_type {
            1 => Some(ColumnType::Bool),
            2 => Some(ColumnType::I64),
            3 => Some(ColumnType::F64),
            4 => Some(ColumnType::Timestamp),
            5 => Some(ColumnType::Symbol),
            6 => Some(ColumnType::Str),
            _ => None,
        }
    }

    pub fn get_i64(&self, col: &str) -> Option<&[i64]> {
        let mmap = self.columns.get(col)?;
        <[i64]>::ref_from_bytes(&mmap[HEADER_SIZE..]).ok()
    }

    pub fn get_f64(&self, col: &str) -> Option<&[f64]> {
        let mmap = self.columns.get(col)?;
        <[f64]>::ref_from_bytes(&mmap[HEADER_SIZE..]).ok()
    }

    pub fn get_bool(&self, col: &str) -> Option<&[u8]> {
        let mmap = self.columns.get(col)?;
        Some(&mmap[HEADER_SIZE..])
    }

    pub fn get_symbol(&self, col: &str) -> Option<&[u32]> {
        let mmap = self.columns.get(col)?;
        <[u32]>::ref_from_bytes(&mmap[HEADER_SIZE..]).ok()
    }

    /// Row ids holding `key` in `col`'s secondary index, if one was built.
    /// Entries are sorted by `(key, row_id)`, so this binary-searches the
    /// `key` boundary and returns the contiguous slice within it.
    pub fn symbol_rows(&self, col: &str, key: u32) -> Option<&[IndexEntry]> {
        let mmap = self.indexes.get(col)?;
        let entries = <[IndexEntry]>::ref_from_bytes(&mmap[INDEX_HEADER_SIZE..]).ok()?;
        let lo = entries.partition_point(|e| e.key < key);
        let hi = entries.partition_point(|e| e.key <= key);
        Some(&entries[lo..hi])
    }
}

fn map_file(path: &Path) -> Result<Mmap> {
    let file = fs::File::open(path).map_err(|e| ZolaError::io(path, e))?;
    unsafe { Mmap::map(&file) }.map_err(|e| ZolaError::io(path, e))
}
