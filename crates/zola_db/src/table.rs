use std::fs;
use std::path::{Path, PathBuf};

use zola_db_core::{Result, Schema, ZolaError};

use crate::io;
use crate::partition::Partition;

pub fn table_dir(root: &Path, name: &str) -> PathBuf {
    root.join(name)
}

pub fn table_exists(root: &Path, name: &str) -> bool {
    table_dir(root, name).join(".schema").exists()
}

pub fn read_schema(root: &Path, name: &str) -> Result<Option<Schema>> {
    io::read_schema_file(&table_dir(root, name))
}

/// Creates a table directory and writes its schema file. Fails if a table
/// with a different schema already exists there (callers that want
/// idempotent open-or-create should check `table_exists`/`read_schema`
/// first, as the importer's driver does when validating that a
/// pre-existing target is partitioned and agrees with the declared
/// `partition_by`.
pub fn create_table(root: &Path, name: &str, schema: &Schema) -> Result<()> {
    let dir = table_dir(root, name);
    fs::create_dir_all(&dir).map_err(|e| ZolaError::io(&dir, e))?;
    if !dir.join(".schema").exists() {
        io::write_schema_file(&dir, schema)?;
    }
    Ok(())
}

/// Sums `row_count` across every partition directory's timestamp column.
/// Used to enforce the "target must be empty" precondition before an
/// import into a pre-existing table is allowed to proceed.
pub fn row_count(root: &Path, name: &str, ts_col: &str) -> Result<u64> {
    let dir = table_dir(root, name);
    if !dir.exists() {
        return Ok(0);
    }
    let mut total = 0u64;
    for entry in fs::read_dir(&dir).map_err(|e| ZolaError::io(&dir, e))? {
        let entry = entry.map_err(|e| ZolaError::io(&dir, e))?;
        let path = entry.path();
        if path.is_dir() && is_partition_dir(&path) {
            let part = Partition::open(&path)?;
            total += part.row_count(ts_col).unwrap_or(0);
        }
    }
    Ok(total)
}

fn is_partition_dir(path: &Path) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy().to_string());
    match name {
        Some(n) => !n.starts_with('.') && !n.ends_with(".tmp") && !n.ends_with(".old"),
        None => false,
    }
}

pub fn list_partition_dirs(root: &Path, name: &str) -> Result<Vec<PathBuf>> {
    let dir = table_dir(root, name);
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut out = Vec::new();
    for entry in fs::read_dir(&dir).map_err(|e| ZolaError::io(&dir, e))? {
        let entry = entry.map_err(|e| ZolaError::io(&dir, e))?;
        let path = entry.path();
        if path.is_dir() && is_partition_dir(&path) {
            out.push(path);
        }
    }
    Ok(out)
}

/// Removes every partition directory but keeps the schema file, used when
/// a failed import must roll back a target table that pre-existed.
pub fn truncate_table(root: &Path, name: &str) -> Result<()> {
    for dir in list_partition_dirs(root, name)? {
        fs::remove_dir_all(&dir).map_err(|e| ZolaError::io(&dir, e))?;
    }
    Ok(())
}

/// Removes the whole table directory, used when a failed import must
/// undo creating a target that didn't exist before it started.
pub fn remove_table(root: &Path, name: &str) -> Result<()> {
    let dir = table_dir(root, name);
    if dir.exists() {
        fs::remove_dir_all(&dir).map_err(|e| ZolaError::io(&dir, e))?;
    }
    Ok(())
}
