use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const COLUMN_MAGIC: u32 = 0x5A4F_4C41; // "ZOLA"
pub const INDEX_MAGIC: u32 = 0x5A49_4458; // "ZIDX"
pub const VERSION: u32 = 1;

/// Header of a mapped column file. The row data itself follows immediately
/// and is a flat array of fixed-width native values (`Bool` is stored one
/// byte per row, everything else 8 bytes per row) except `Str`, which is
/// never memory-mapped as fixed-width (see `ColumnType::is_fixed_width`).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct ColumnHeader {
    pub magic: u32,
    pub version: u32,
    pub col_type: u32,
    pub _pad: u32,
    pub row_count: u64,
}

pub const HEADER_SIZE: usize = std::mem::size_of::<ColumnHeader>();

/// One entry in a symbol column's secondary index: `(key, row_id)` pairs
/// sorted ascending by `(key, row_id)`. This generalizes a contiguous
/// `[start, end)` range per symbol (which only works when rows are
/// physically grouped by symbol) to an explicit posting list, since
/// CSV-imported rows are sorted by timestamp within a partition, not by
/// symbol.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, PartialEq, Eq, PartialOrd, Ord)]
#[repr(C)]
pub struct IndexEntry {
    pub key: u32,
    pub row_id: u32,
}

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct IndexHeader {
    pub magic: u32,
    pub version: u32,
    pub entry_count: u64,
}

pub const INDEX_HEADER_SIZE: usize = std::mem::size_of::<IndexHeader>();
