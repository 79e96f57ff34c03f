//! The 16-byte `(timestamp, file_offset)` pair C4 writes per row and C5
//! merges, kept in the teacher's zerocopy style (`format.rs`'s
//! `ColumnHeader`/`IndexEntry`) so index chunks can be memory-mapped and
//! read as a flat `&[IndexedRecord]` with no parsing step.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct IndexedRecord {
    pub timestamp: u64,
    pub file_offset: u64,
}

pub const INDEXED_RECORD_SIZE: usize = std::mem::size_of::<IndexedRecord>();

impl IndexedRecord {
    pub fn new(timestamp: i64, file_offset: u64) -> Self {
        IndexedRecord {
            timestamp: timestamp as u64,
            file_offset,
        }
    }

    pub fn timestamp_i64(&self) -> i64 {
        self.timestamp as i64
    }
}
