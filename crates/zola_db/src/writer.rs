use std::fs;
use std::path::Path;

use zerocopy::IntoBytes;

use zola_db_core::{ColumnType, Result, Schema, ZolaError};

use crate::format::IndexEntry;
use crate::io;

/// One column's data plus an optional secondary index, ready to be written
/// into a partition directory. `Str` columns are written as a plain
/// newline-delimited text file rather than a `.col` file, since they are
/// fixed neither in width nor indexed.
pub enum ColumnWrite<'a> {
    Bool(&'a [u8]),
    I64(&'a [i64]),
    F64(&'a [f64]),
    Timestamp(&'a [i64]),
    Symbol(&'a [u32], Option<&'a [IndexEntry]>),
    Str(&'a [String]),
}

impl<'a> ColumnWrite<'a> {
    fn col_type(&self) -> ColumnType {
        match self {
            ColumnWrite::Bool(_) => ColumnType::Bool,
            ColumnWrite::I64(_) => ColumnType::I64,
            ColumnWrite::F64(_) => ColumnType::F64,
            ColumnWrite::Timestamp(_) => ColumnType::Timestamp,
            ColumnWrite::Symbol(..) => ColumnType::Symbol,
            ColumnWrite::Str(_) => ColumnType::Str,
        }
    }

    fn row_count(&self) -> usize {
        match self {
            ColumnWrite::Bool(v) => v.len(),
            ColumnWrite::I64(v) => v.len(),
            ColumnWrite::F64(v) => v.len(),
            ColumnWrite::Timestamp(v) => v.len(),
            ColumnWrite::Symbol(v, _) => v.len(),
            ColumnWrite::Str(v) => v.len(),
        }
    }
}

/// Writes one partition's worth of columns into `final_dir`, atomically
/// (via `io::atomic_write_partition`). `final_dir`'s name is the caller's
/// responsibility: the partition indexer derives it from
/// `PartitionBy::format`; the attach step only ever renames whole staged
/// directories like this one into the target table.
pub fn write_partition(final_dir: &Path, schema: &Schema, columns: &[(String, ColumnWrite)]) -> Result<()> {
    if columns.is_empty() {
        return Err(ZolaError::invalid(final_dir, "partition has no columns"));
    }
    let row_count = columns[0].1.row_count();
    for (name, col) in columns {
        if col.row_count() != row_count {
            return Err(ZolaError::invalid(
                final_dir,
                format!("column {name} row count mismatch"),
            ));
        }
        let def = schema
            .columns
            .iter()
            .find(|c| &c.name == name)
            .ok_or_else(|| ZolaError::invalid(final_dir, format!("unknown column {name}")))?;
        if def.col_type != col.col_type() {
            return Err(ZolaError::invalid(
                final_dir,
                format!("column {name} type mismatch"),
            ));
        }
    }

    io::atomic_write_partition(final_dir, |tmp_dir| {
        for (name, col) in columns {
            write_one_column(tmp_dir, name, col)?;
        }
        Ok(())
    })
}

/// (Re)writes a symbol column's secondary index file, independent of a
/// full partition write. Used by the importer's index builder, which
/// runs after symbol keys have already been rewritten from shadow-local
/// to target dictionary keys (so the index reflects final keys).
pub fn write_symbol_index(partition_dir: &Path, column: &str, entries: &[IndexEntry]) -> Result<()> {
    io::write_index_file(&partition_dir.join(format!("{column}.idx")), entries)
}

fn write_one_column(dir: &Path, name: &str, col: &ColumnWrite) -> Result<()> {
    let row_count = col.row_count() as u64;
    match col {
        ColumnWrite::Bool(v) => {
            io::write_column_file(&dir.join(format!("{name}.col")), ColumnType::Bool, row_count, v)
        }
        ColumnWrite::I64(v) => io::write_column_file(
            &dir.join(format!("{name}.col")),
            ColumnType::I64,
            row_count,
            v.as_bytes(),
        ),
        ColumnWrite::F64(v) => io::write_column_file(
            &dir.join(format!("{name}.col")),
            ColumnType::F64,
            row_count,
            v.as_bytes(),
        ),
        ColumnWrite::Timestamp(v) => io::write_column_file(
            &dir.join(format!("{name}.col")),
            ColumnType::Timestamp,
            row_count,
            v.as_bytes(),
        ),
        ColumnWrite::Symbol(v, index) => {
            io::write_column_file(
                &dir.join(format!("{name}.col")),
                ColumnType::Symbol,
                row_count,
                v.as_bytes(),
            )?;
            if let Some(entries) = index {
                io::write_index_file(&dir.join(format!("{name}.idx")), entries)?;
            }
            Ok(())
        }
        ColumnWrite::Str(v) => {
            let path = dir.join(format!("{name}.str"));
            let content = v.join("\n");
            fs::write(&path, content).map_err(|e| ZolaError::io(&path, e))
        }
    }
}
