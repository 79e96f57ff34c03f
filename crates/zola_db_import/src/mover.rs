//! Moves finished shadow partitions into the target table and attaches
//! them. Attach has no two-phase commit: it relies on the precondition
//! that the target table is row-count zero before an import starts, so
//! a partial failure can only ever be cleaned up by truncating
//! (pre-existing target) or removing (target created by this import)
//! the whole table, never by reconciling partition-by-partition.

use std::path::Path;

use zola_db::attach_partition;

use crate::error::{ImportError, Phase, Result};
use crate::merge::PartitionInfo;

/// Whether the target table already existed before this import started,
/// which decides the cleanup strategy on partial failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOrigin {
    PreExisting,
    CreatedByImport,
}

/// Moves every partition with `imported_rows > 0` from `shadow_table_dir`
/// into `root/table`, attaching each one. On the first failure, every
/// partition already attached is rolled back per `origin`: the target is
/// truncated if it pre-existed, or removed entirely if this import
/// created it.
pub fn move_and_attach_partitions(
    root: &Path,
    table: &str,
    shadow_table_dir: &Path,
    partitions: &[PartitionInfo],
    origin: TargetOrigin,
) -> Result<usize> {
    let mut attached = 0usize;
    for part in partitions {
        if part.imported_rows == 0 {
            continue;
        }
        let src = shadow_table_dir.join(&part.dir_name);
        if let Err(e) = attach_partition(root, table, &part.dir_name, &src) {
            roll_back(root, table, origin);
            return Err(ImportError::failed(
                Phase::AttachPartitions,
                format!("attaching partition {} failed: {e}", part.dir_name),
            ));
        }
        attached += 1;
    }
    Ok(attached)
}

fn roll_back(root: &Path, table: &str, origin: TargetOrigin) {
    match origin {
        TargetOrigin::PreExisting => {
            let _ = zola_db::truncate_table(root, table);
        }
        TargetOrigin::CreatedByImport => {
            let _ = zola_db::remove_table(root, table);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use zola_db_core::{ColumnDef, ColumnType, PartitionBy, Schema};

    fn schema() -> Schema {
        Schema {
            columns: vec![
                ColumnDef { name: "ts".into(), col_type: ColumnType::Timestamp },
                ColumnDef { name: "price".into(), col_type: ColumnType::F64 },
            ],
            ts_column: 0,
            partition_by: PartitionBy::Day,
        }
    }

    fn write_shadow_partition(dir: &Path, schema: &Schema) {
        zola_db::write_partition(
            dir,
            schema,
            &[
                ("ts".to_string(), zola_db::ColumnWrite::Timestamp(&[1_700_000_000_000_000])),
                ("price".to_string(), zola_db::ColumnWrite::F64(&[1.0])),
            ],
        )
        .unwrap();
    }

    #[test]
    fn moves_only_non_empty_partitions_and_attaches_them() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let schema = schema();
        zola_db::create_table(root, "trades", &schema).unwrap();

        let shadow_dir = root.join("trades_0");
        write_shadow_partition(&shadow_dir.join("2023-11-14"), &schema);

        let partitions = vec![
            PartitionInfo {
                key: 0,
                dir_name: "2023-11-14".to_string(),
                bytes: 16,
                task_id: 0,
                imported_rows: 1,
            },
            PartitionInfo {
                key: 1,
                dir_name: "2023-11-15".to_string(),
                bytes: 0,
                task_id: 0,
                imported_rows: 0,
            },
        ];

        let attached = move_and_attach_partitions(
            root,
            "trades",
            &shadow_dir,
            &partitions,
            TargetOrigin::CreatedByImport,
        )
        .unwrap();

        assert_eq!(attached, 1);
        assert_eq!(zola_db::row_count(root, "trades", "ts").unwrap(), 1);
    }

    #[test]
    fn failed_attach_removes_table_created_by_import() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let schema = schema();
        zola_db::create_table(root, "trades", &schema).unwrap();

        let shadow_dir = root.join("trades_0");
        // intentionally do not create the shadow partition dir, so attach fails.
        let partitions = vec![PartitionInfo {
            key: 0,
            dir_name: "2023-11-14".to_string(),
            bytes: 16,
            task_id: 0,
            imported_rows: 1,
        }];

        let result = move_and_attach_partitions(
            root,
            "trades",
            &shadow_dir,
            &partitions,
            TargetOrigin::CreatedByImport,
        );

        assert!(result.is_err());
        assert!(!zola_db::table_exists(root, "trades"));
    }
}
