use std::path::Path;

use zola_db_core::{Result, ZolaError};

use crate::io;
use crate::table;

/// Moves a fully-written, staged partition directory into the target
/// table. The source is typically a shadow table's partition directory
/// built during import; since the shadow table partitions the same way
/// as the target, partition directory names never collide across
/// workers, so attaching is a plain rename rather than a merge.
///
/// Fails with `ZolaError::InvalidFile` if a partition with the same
/// directory name already exists in the target, since that would mean
/// two shadow tables (or two runs) produced overlapping partition keys,
/// which should never happen for a single import.
pub fn attach_partition(root: &Path, table_name: &str, partition_dir_name: &str, src: &Path) -> Result<()> {
    let dst = table::table_dir(root, table_name).join(partition_dir_name);
    if dst.exists() {
        return Err(ZolaError::invalid(
            &dst,
            "partition already exists in target table",
        ));
    }
    io::rename_or_copy_dir(src, &dst)?;
    if let Some(parent) = dst.parent() {
        io::fsync_dir(parent)?;
    }
    Ok(())
}
