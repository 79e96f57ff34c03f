mod attach;
mod dict;
mod format;
mod io;
mod partition;
mod table;
mod writer;

pub use dict::{dict_path, SymbolDictionary};
pub use format::{
    ColumnHeader, IndexEntry, IndexHeader, COLUMN_MAGIC, HEADER_SIZE, INDEX_HEADER_SIZE,
    INDEX_MAGIC, VERSION,
};
pub use partition::Partition;
pub use writer::{write_partition, write_symbol_index, ColumnWrite};

pub use zola_db_core::{
    ColumnDef, ColumnSlice, ColumnType, ColumnVec, PartitionBy, Result, Schema, ZolaError,
    NULL_BOOL, NULL_F64, NULL_I64, NULL_SYMBOL,
};

use std::path::Path;

pub use attach::attach_partition;
pub use table::{
    create_table, list_partition_dirs, read_schema, remove_table, row_count, table_dir,
    table_exists, truncate_table,
};

/// Sweeps every table under `root` for leftover `.tmp`/`.old` staging
/// directories from a crashed atomic write. Called once when an importer
/// run starts against a data directory.
pub fn recover(root: &Path) -> Result<()> {
    io::recover(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn schema() -> Schema {
        Schema {
            columns: vec![
                ColumnDef {
                    name: "ts".into(),
                    col_type: ColumnType::Timestamp,
                },
                ColumnDef {
                    name: "price".into(),
                    col_type: ColumnType::F64,
                },
                ColumnDef {
                    name: "side".into(),
                    col_type: ColumnType::Symbol,
                },
            ],
            ts_column: 0,
            partition_by: PartitionBy::Day,
        }
    }

    #[test]
    fn create_table_then_write_and_read_partition() {
        let dir = TempDir::new().unwrap();
        let schema = schema();
        create_table(dir.path(), "trades", &schema).unwrap();

        assert!(table_exists(dir.path(), "trades"));
        let reread = read_schema(dir.path(), "trades").unwrap().unwrap();
        assert_eq!(reread.ts_column, 0);
        assert_eq!(reread.partition_by.as_str(), "DAY");

        let ts = vec![1_700_000_000_000_000_i64, 1_700_000_001_000_000];
        let price = vec![100.0_f64, 101.5];
        let side = vec![0_u32, 1];
        let idx = vec![IndexEntry { key: 0, row_id: 0 }, IndexEntry { key: 1, row_id: 1 }];

        let table_root = table_dir(dir.path(), "trades");
        let part_dir = table_root.join("2023-11-14");
        write_partition(
            &part_dir,
            &schema,
            &[
                ("ts".to_string(), ColumnWrite::Timestamp(&ts)),
                ("price".to_string(), ColumnWrite::F64(&price)),
                ("side".to_string(), ColumnWrite::Symbol(&side, Some(&idx))),
            ],
        )
        .unwrap();

        let part = Partition::open(&part_dir).unwrap();
        assert_eq!(part.row_count("ts"), Some(2));
        assert_eq!(part.get_f64("price"), Some(&price[..]));
        assert_eq!(part.get_symbol("side"), Some(&side[..]));
        assert_eq!(part.symbol_rows("side", 1).unwrap().len(), 1);

        assert_eq!(row_count(dir.path(), "trades", "ts").unwrap(), 2);
    }

    #[test]
    fn attach_partition_moves_directory_into_target() {
        let dir = TempDir::new().unwrap();
        let schema = schema();
        create_table(dir.path(), "trades", &schema).unwrap();

        let shadow_part = dir.path().join("shadow-2023-11-14");
        std::fs::create_dir_all(&shadow_part).unwrap();
        write_partition(
            &shadow_part,
            &schema,
            &[
                ("ts".to_string(), ColumnWrite::Timestamp(&[1_700_000_000_000_000])),
                ("price".to_string(), ColumnWrite::F64(&[100.0])),
                ("side".to_string(), ColumnWrite::Symbol(&[0], None)),
            ],
        )
        .unwrap();

        attach_partition(dir.path(), "trades", "2023-11-14", &shadow_part).unwrap();
        assert!(!shadow_part.exists());
        assert_eq!(row_count(dir.path(), "trades", "ts").unwrap(), 1);
    }

    #[test]
    fn truncate_table_removes_partitions_but_keeps_schema() {
        let dir = TempDir::new().unwrap();
        let schema = schema();
        create_table(dir.path(), "trades", &schema).unwrap();

        let part_dir = table_dir(dir.path(), "trades").join("2023-11-14");
        write_partition(
            &part_dir,
            &schema,
            &[
                ("ts".to_string(), ColumnWrite::Timestamp(&[1_700_000_000_000_000])),
                ("price".to_string(), ColumnWrite::F64(&[100.0])),
                ("side".to_string(), ColumnWrite::Symbol(&[0], None)),
            ],
        )
        .unwrap();

        truncate_table(dir.path(), "trades").unwrap();
        assert!(table_exists(dir.path(), "trades"));
        assert_eq!(row_count(dir.path(), "trades", "ts").unwrap(), 0);
    }
}
