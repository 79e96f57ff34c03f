//! Merges per-shadow symbol dictionaries into the target dictionary and
//! rewrites shadow column files' dictionary keys in place.

use std::fs;
use std::path::{Path, PathBuf};

use zola_db::{dict_path, SymbolDictionary, COLUMN_MAGIC, HEADER_SIZE};

use crate::error::{ImportError, Result};

/// Phase 6a: merges one symbol column's per-shadow dictionaries into the
/// target table's dictionary, in shadow order (worker id ascending).
/// Target dictionary lookups are the serialization point: dictionaries
/// are processed strictly sequentially here, which is what makes target
/// key assignment deterministic across runs given the same input.
///
/// Returns one remap (`local key -> target key`) per shadow directory, in
/// the same order as `shadow_dirs`, and persists the merged target
/// dictionary to disk.
pub fn merge_dictionaries(
    target_table_dir: &Path,
    shadow_dirs: &[PathBuf],
    column: &str,
) -> Result<Vec<Vec<u32>>> {
    let mut target = SymbolDictionary::open(dict_path(target_table_dir, column))?;
    let mut remaps = Vec::with_capacity(shadow_dirs.len());

    for shadow_dir in shadow_dirs {
        let shadow_dict = SymbolDictionary::open(dict_path(shadow_dir, column))?;
        let mut remap = Vec::with_capacity(shadow_dict.len());
        for local_key in 0..shadow_dict.len() as u32 {
            let value = shadow_dict
                .name_of(local_key)
                .expect("local_key in 0..len() must resolve");
            remap.push(target.get_or_insert(value));
        }
        remaps.push(remap);
    }

    target.save()?;
    Ok(remaps)
}

/// Path convention for a shadow symbol column's local-to-target remap
/// file: `<shadow_table_dir>/<col>.remap`.
pub fn remap_path(shadow_table_dir: &Path, column: &str) -> PathBuf {
    shadow_table_dir.join(format!("{column}.remap"))
}

pub fn write_remap_file(path: &Path, remap: &[u32]) -> Result<()> {
    let mut bytes = Vec::with_capacity(remap.len() * 4);
    for &k in remap {
        bytes.extend_from_slice(&k.to_ne_bytes());
    }
    fs::write(path, &bytes).map_err(|e| ImportError::io(path, e))
}

fn read_remap_file(path: &Path) -> Result<Vec<u32>> {
    let bytes = fs::read(path).map_err(|e| ImportError::io(path, e))?;
    if bytes.len() % 4 != 0 {
        return Err(ImportError::Corruption(format!(
            "remap file {} has misaligned length",
            path.display()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Phase 6b: rewrites one partition's symbol column keys in place, from
/// shadow-local keys to target keys, using the remap produced by
/// `merge_dictionaries`. An out-of-range local key signals corruption and
/// fails the import rather than writing a bogus key.
pub fn rewrite_column_keys(column_file: &Path, remap: &[u32]) -> Result<()> {
    let mut bytes = fs::read(column_file).map_err(|e| ImportError::io(column_file, e))?;
    if bytes.len() < HEADER_SIZE {
        return Err(ImportError::Corruption(format!(
            "column file {} too small for header",
            column_file.display()
        )));
    }
    let magic = u32::from_ne_bytes(bytes[0..4].try_into().unwrap());
    if magic != COLUMN_MAGIC {
        return Err(ImportError::Corruption(format!(
            "column file {} has bad magic",
            column_file.display()
        )));
    }

    let payload = &mut bytes[HEADER_SIZE..];
    if payload.len() % 4 != 0 {
        return Err(ImportError::Corruption(format!(
            "symbol column {} payload misaligned",
            column_file.display()
        )));
    }

    for chunk in payload.chunks_exact_mut(4) {
        let local_key = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        if local_key == zola_db_core::NULL_SYMBOL {
            continue;
        }
        let target_key = *remap.get(local_key as usize).ok_or_else(|| {
            ImportError::Corruption(format!(
                "symbol key {local_key} out of range (remap len {}) in {}",
                remap.len(),
                column_file.display()
            ))
        })?;
        chunk.copy_from_slice(&target_key.to_ne_bytes());
    }

    fs::write(column_file, &bytes).map_err(|e| ImportError::io(column_file, e))
}

/// Rewrites every partition's copy of `column` under `shadow_table_dir`
/// using the remap file already written for that shadow/column pair by
/// `write_remap_file`.
pub fn rewrite_all_partitions(
    shadow_table_dir: &Path,
    partition_dirs: &[String],
    column: &str,
) -> Result<()> {
    let remap = read_remap_file(&remap_path(shadow_table_dir, column))?;
    for dir_name in partition_dirs {
        let column_file = shadow_table_dir.join(dir_name).join(format!("{column}.col"));
        if column_file.exists() {
            rewrite_column_keys(&column_file, &remap)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn merge_dictionaries_is_deterministic_across_shadows() {
        let tmp = TempDir::new().unwrap();
        let target_dir = tmp.path().join("target");
        fs::create_dir_all(&target_dir).unwrap();

        let shadow0 = tmp.path().join("shadow_0");
        let shadow1 = tmp.path().join("shadow_1");
        fs::create_dir_all(&shadow0).unwrap();
        fs::create_dir_all(&shadow1).unwrap();

        let mut d0 = SymbolDictionary::new(dict_path(&shadow0, "side"));
        d0.get_or_insert("a");
        d0.save().unwrap();

        let mut d1 = SymbolDictionary::new(dict_path(&shadow1, "side"));
        d1.get_or_insert("b");
        d1.get_or_insert("c");
        d1.save().unwrap();

        let remaps =
            merge_dictionaries(&target_dir, &[shadow0.clone(), shadow1.clone()], "side").unwrap();

        assert_eq!(remaps[0], vec![0]);
        assert_eq!(remaps[1], vec![1, 2]);

        let target = SymbolDictionary::open(dict_path(&target_dir, "side")).unwrap();
        assert_eq!(target.name_of(0), Some("a"));
        assert_eq!(target.name_of(1), Some("b"));
        assert_eq!(target.name_of(2), Some("c"));
    }

    #[test]
    fn rewrite_column_keys_applies_remap_and_rejects_out_of_range() {
        let tmp = TempDir::new().unwrap();
        let schema = zola_db_core::Schema {
            columns: vec![
                zola_db_core::ColumnDef { name: "ts".into(), col_type: zola_db_core::ColumnType::Timestamp },
                zola_db_core::ColumnDef { name: "side".into(), col_type: zola_db_core::ColumnType::Symbol },
            ],
            ts_column: 0,
            partition_by: zola_db_core::PartitionBy::Day,
        };
        let part_dir = tmp.path().join("2024-01-01");
        zola_db::write_partition(
            &part_dir,
            &schema,
            &[
                ("ts".to_string(), zola_db::ColumnWrite::Timestamp(&[1, 2])),
                ("side".to_string(), zola_db::ColumnWrite::Symbol(&[0, 1], None)),
            ],
        )
        .unwrap();

        rewrite_column_keys(&part_dir.join("side.col"), &[10, 20]).unwrap();
        let part = zola_db::Partition::open(&part_dir).unwrap();
        assert_eq!(part.get_symbol("side"), Some(&[10u32, 20u32][..]));

        let err = rewrite_column_keys(&part_dir.join("side.col"), &[10]);
        assert!(err.is_err());
    }
}
