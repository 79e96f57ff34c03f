//! Builds secondary indexes over symbol columns in shadow tables. Runs
//! after shadow-local symbol keys have been rewritten to target keys, so
//! the index it builds reflects the final keys the attached partition
//! will carry.

use std::path::Path;

use zola_db::{write_symbol_index, IndexEntry, Partition};

use crate::error::Result;

/// Builds the `(key, row_id)` posting list for one symbol column in one
/// partition directory and writes it as `<column>.idx`. Entries are
/// sorted ascending by `(key, row_id)` so `Partition::symbol_rows` can
/// binary-search them.
pub fn build_index(partition_dir: &Path, column: &str) -> Result<()> {
    let part = Partition::open(partition_dir)?;
    let Some(keys) = part.get_symbol(column) else {
        return Ok(());
    };

    let mut entries: Vec<IndexEntry> = keys
        .iter()
        .enumerate()
        .map(|(row_id, &key)| IndexEntry {
            key,
            row_id: row_id as u32,
        })
        .collect();
    entries.sort();

    write_symbol_index(partition_dir, column, &entries)?;
    Ok(())
}

/// Builds indexes for every symbol column across every partition of a
/// shadow table. Runs in parallel across shadow tables at the driver
/// level (each shadow table's partitions are indexed by the worker
/// that owns it).
pub fn build_indexes_for_table(
    shadow_table_dir: &Path,
    partition_dirs: &[String],
    symbol_columns: &[String],
) -> Result<()> {
    for dir_name in partition_dirs {
        let partition_dir = shadow_table_dir.join(dir_name);
        for column in symbol_columns {
            build_index(&partition_dir, column)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use zola_db_core::{ColumnDef, ColumnType, PartitionBy, Schema};

    #[test]
    fn build_index_produces_sorted_posting_list() {
        let tmp = TempDir::new().unwrap();
        let schema = Schema {
            columns: vec![
                ColumnDef { name: "ts".into(), col_type: ColumnType::Timestamp },
                ColumnDef { name: "side".into(), col_type: ColumnType::Symbol },
            ],
            ts_column: 0,
            partition_by: PartitionBy::Day,
        };
        let part_dir = tmp.path().join("2024-01-01");
        zola_db::write_partition(
            &part_dir,
            &schema,
            &[
                ("ts".to_string(), zola_db::ColumnWrite::Timestamp(&[1, 2, 3, 4])),
                ("side".to_string(), zola_db::ColumnWrite::Symbol(&[1, 0, 1, 0], None)),
            ],
        )
        .unwrap();

        build_index(&part_dir, "side").unwrap();

        let part = Partition::open(&part_dir).unwrap();
        let rows0 = part.symbol_rows("side", 0).unwrap();
        let rows1 = part.symbol_rows("side", 1).unwrap();
        assert_eq!(rows0.iter().map(|e| e.row_id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(rows1.iter().map(|e| e.row_id).collect::<Vec<_>>(), vec![0, 2]);
    }
}
