//! Sorts merged per-partition indexes and writes rows into per-worker
//! shadow tables.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use zerocopy::{FromBytes, IntoBytes};
use zola_db::{dict_path, ColumnWrite, SymbolDictionary};
use zola_db_core::{ColumnType, Schema};

use crate::detect::{parse_field, parse_timestamp_micros, FieldValue};
use crate::error::{AtomicityPolicy, ImportError, Phase, Result};
use crate::lexer::{Lexer, Options};
use crate::record::IndexedRecord;

/// A partition's aggregate size and location, tracked from indexing
/// through the attach step.
#[derive(Debug, Clone)]
pub struct PartitionInfo {
    pub key: i64,
    pub dir_name: String,
    pub bytes: u64,
    pub task_id: u32,
    pub imported_rows: u64,
}

/// Greedy longest-processing-time-first assignment: partitions sorted by
/// `bytes` descending are placed onto the least-loaded worker (ties: the
/// lowest worker index). Returns `task_id` (worker index) per partition,
/// in the same order as the input. Not provably optimal, but variance in
/// partition size dominates worker count in practice.
pub fn assign_partitions_lpt(partitions: &mut [PartitionInfo], worker_count: usize) {
    let worker_count = worker_count.max(1);
    let mut order: Vec<usize> = (0..partitions.len()).collect();
    order.sort_by(|&a, &b| partitions[b].bytes.cmp(&partitions[a].bytes));

    let mut load = vec![0u64; worker_count];
    for idx in order {
        let worker = load
            .iter()
            .enumerate()
            .min_by_key(|&(i, &l)| (l, i))
            .map(|(i, _)| i)
            .unwrap();
        load[worker] += partitions[idx].bytes;
        partitions[idx].task_id = worker as u32;
    }
}

/// Number of distinct workers actually carrying load after LPT assignment.
pub fn active_worker_count(partitions: &[PartitionInfo]) -> usize {
    partitions
        .iter()
        .map(|p| p.task_id)
        .collect::<std::collections::HashSet<_>>()
        .len()
}

/// Enumerates the `${worker}_${chunk}_${flush_seq}` index chunk files
/// under a partition's work directory (excludes the merged `index.m`, if
/// one already exists from a previous run). Each such file is a single
/// sorted run by construction (one per `indexer::flush_partition` call).
fn chunk_files(partition_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(partition_dir).map_err(|e| ImportError::io(partition_dir, e))? {
        let entry = entry.map_err(|e| ImportError::io(partition_dir, e))?;
        let path = entry.path();
        if path.is_file() && path.file_name().map(|n| n != "index.m").unwrap_or(false) {
            out.push(path);
        }
    }
    Ok(out)
}

/// K-way merges every chunk file in `partition_dir` into a single
/// ascending-by-`(timestamp, file_offset)` run, written to `index.m`
/// alongside the chunk files. Ties are broken by file offset, preserving
/// original file order for equal timestamps.
pub fn merge_partition_index(partition_dir: &Path) -> Result<Vec<IndexedRecord>> {
    let files = chunk_files(partition_dir)?;
    let mut runs: Vec<Vec<IndexedRecord>> = Vec::with_capacity(files.len());
    for path in &files {
        let bytes = fs::read(path).map_err(|e| ImportError::io(path, e))?;
        let records = <[IndexedRecord]>::ref_from_bytes(&bytes)
            .map_err(|_| ImportError::Corruption(format!("malformed index chunk {}", path.display())))?;
        runs.push(records.to_vec());
    }

    let mut heap: BinaryHeap<Reverse<(u64, u64, usize, usize)>> = BinaryHeap::new();
    for (run_idx, run) in runs.iter().enumerate() {
        if let Some(first) = run.first() {
            heap.push(Reverse((first.timestamp, first.file_offset, run_idx, 0)));
        }
    }

    let total: usize = runs.iter().map(|r| r.len()).sum();
    let mut merged = Vec::with_capacity(total);
    while let Some(Reverse((ts, offset, run_idx, rec_idx))) = heap.pop() {
        merged.push(IndexedRecord {
            timestamp: ts,
            file_offset: offset,
        });
        let next_idx = rec_idx + 1;
        if let Some(next) = runs[run_idx].get(next_idx) {
            heap.push(Reverse((next.timestamp, next.file_offset, run_idx, next_idx)));
        }
    }

    let merged_path = partition_dir.join("index.m");
    let mut f = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&merged_path)
        .map_err(|e| ImportError::io(&merged_path, e))?;
    f.write_all(merged.as_bytes())
        .map_err(|e| ImportError::io(&merged_path, e))?;

    Ok(merged)
}

/// Columns accumulated in memory while streaming one partition's merged
/// index; flushed into a `zola_db::write_partition` call once the whole
/// partition has been read.
enum ColumnBuilder {
    Bool(Vec<u8>),
    I64(Vec<i64>),
    F64(Vec<f64>),
    Timestamp(Vec<i64>),
    Symbol(Vec<u32>),
    Str(Vec<String>),
}

impl ColumnBuilder {
    fn new(col_type: ColumnType) -> Self {
        match col_type {
            ColumnType::Bool => ColumnBuilder::Bool(Vec::new()),
            ColumnType::I64 => ColumnBuilder::I64(Vec::new()),
            ColumnType::F64 => ColumnBuilder::F64(Vec::new()),
            ColumnType::Timestamp => ColumnBuilder::Timestamp(Vec::new()),
            ColumnType::Symbol => ColumnBuilder::Symbol(Vec::new()),
            ColumnType::Str => ColumnBuilder::Str(Vec::new()),
        }
    }

    fn push_null(&mut self) {
        match self {
            ColumnBuilder::Bool(v) => v.push(zola_db_core::NULL_BOOL),
            ColumnBuilder::I64(v) => v.push(zola_db_core::NULL_I64),
            ColumnBuilder::F64(v) => v.push(zola_db_core::NULL_F64),
            ColumnBuilder::Timestamp(v) => v.push(zola_db_core::NULL_I64),
            ColumnBuilder::Symbol(v) => v.push(zola_db_core::NULL_SYMBOL),
            ColumnBuilder::Str(v) => v.push(String::new()),
        }
    }

    fn push_value(&mut self, value: FieldValue) {
        match (self, value) {
            (ColumnBuilder::Bool(v), FieldValue::Bool(b)) => v.push(b as u8),
            (ColumnBuilder::I64(v), FieldValue::I64(n)) => v.push(n),
            (ColumnBuilder::F64(v), FieldValue::F64(n)) => v.push(n),
            (ColumnBuilder::Timestamp(v), FieldValue::Timestamp(n)) => v.push(n),
            (ColumnBuilder::Str(v), FieldValue::Str(s)) => v.push(s),
            (builder, _) => builder.push_null(),
        }
    }

    fn push_symbol(&mut self, key: u32) {
        if let ColumnBuilder::Symbol(v) = self {
            v.push(key);
        }
    }

    fn len(&self) -> usize {
        match self {
            ColumnBuilder::Bool(v) => v.len(),
            ColumnBuilder::I64(v) => v.len(),
            ColumnBuilder::F64(v) => v.len(),
            ColumnBuilder::Timestamp(v) => v.len(),
            ColumnBuilder::Symbol(v) => v.len(),
            ColumnBuilder::Str(v) => v.len(),
        }
    }

    fn truncate(&mut self, len: usize) {
        match self {
            ColumnBuilder::Bool(v) => v.truncate(len),
            ColumnBuilder::I64(v) => v.truncate(len),
            ColumnBuilder::F64(v) => v.truncate(len),
            ColumnBuilder::Timestamp(v) => v.truncate(len),
            ColumnBuilder::Symbol(v) => v.truncate(len),
            ColumnBuilder::Str(v) => v.truncate(len),
        }
    }
}

pub struct PartitionImportOutcome {
    pub imported_rows: u64,
    pub rows_skipped: u64,
}

/// Streams a partition's merged index, re-parsing each referenced CSV
/// record and writing the decoded rows into the shadow table's partition
/// directory. `dicts` holds one growable `SymbolDictionary` per symbol
/// column, owned by the caller so it persists across every partition
/// this worker imports.
pub fn import_partition(
    csv_path: &Path,
    merged: &[IndexedRecord],
    schema: &Schema,
    delimiter: u8,
    atomicity: AtomicityPolicy,
    read_buffer_size: usize,
    dicts: &mut HashMap<String, SymbolDictionary>,
    shadow_table_dir: &Path,
    partition_dir_name: &str,
) -> Result<PartitionImportOutcome> {
    let mut file = fs::File::open(csv_path).map_err(|e| ImportError::io(csv_path, e))?;
    let mut buf = vec![0u8; read_buffer_size.max(256)];

    let mut builders: Vec<ColumnBuilder> = schema
        .columns
        .iter()
        .map(|c| ColumnBuilder::new(c.col_type))
        .collect();

    let mut imported_rows = 0u64;
    let mut rows_skipped = 0u64;

    'rows: for rec in merged {
        file.seek(SeekFrom::Start(rec.file_offset))
            .map_err(|e| ImportError::io(csv_path, e))?;
        let n = file.read(&mut buf).map_err(|e| ImportError::io(csv_path, e))?;
        if n == 0 {
            continue;
        }

        let mut lexer = Lexer::new(
            &buf[..n],
            1,
            Options {
                column_delimiter: delimiter,
                skip_lines_with_extra_values: true,
                ignore_header: false,
            },
        );
        let record = match lexer.next_record().or_else(|| lexer.parse_last()) {
            Some(r) => r,
            None => continue,
        };

        let row_start_len: Vec<usize> = builders.iter().map(|b| b.len()).collect();

        for (col_idx, col) in schema.columns.iter().enumerate() {
            let raw = record
                .fields
                .get(col_idx)
                .map(|f| String::from_utf8_lossy(f).into_owned())
                .unwrap_or_default();

            if col_idx == schema.ts_column {
                let ts = if raw.is_empty() {
                    None
                } else {
                    parse_timestamp_micros(&raw)
                };
                match ts {
                    Some(ts) => builders[col_idx].push_value(FieldValue::Timestamp(ts)),
                    None => {
                        if !apply_atomicity_row(atomicity, &mut rows_skipped)? {
                            for (b, len) in builders.iter_mut().zip(&row_start_len) {
                                b.truncate(*len);
                            }
                            continue 'rows;
                        }
                        builders[col_idx].push_null();
                    }
                }
                continue;
            }

            if col.col_type == ColumnType::Symbol {
                if raw.is_empty() {
                    builders[col_idx].push_null();
                } else {
                    let dict = dicts
                        .entry(col.name.clone())
                        .or_insert_with(|| SymbolDictionary::new(dict_path(shadow_table_dir, &col.name)));
                    let key = dict.get_or_insert(&raw);
                    builders[col_idx].push_symbol(key);
                }
                continue;
            }

            match parse_field(col.col_type, &raw) {
                Some(v) => builders[col_idx].push_value(v),
                None => {
                    if raw.is_empty() {
                        builders[col_idx].push_null();
                    } else if !apply_atomicity_row(atomicity, &mut rows_skipped)? {
                        for (b, len) in builders.iter_mut().zip(&row_start_len) {
                            b.truncate(*len);
                        }
                        continue 'rows;
                    } else {
                        builders[col_idx].push_null();
                    }
                }
            }
        }

        imported_rows += 1;
    }

    for dict in dicts.values() {
        dict.save()?;
    }

    if imported_rows > 0 {
        let columns: Vec<(String, ColumnWrite)> = schema
            .columns
            .iter()
            .zip(builders.iter())
            .map(|(def, builder)| (def.name.clone(), column_write(builder)))
            .collect();
        let final_dir = shadow_table_dir.join(partition_dir_name);
        zola_db::write_partition(&final_dir, schema, &columns)?;
    }

    Ok(PartitionImportOutcome {
        imported_rows,
        rows_skipped,
    })
}

fn column_write(builder: &ColumnBuilder) -> ColumnWrite<'_> {
    match builder {
        ColumnBuilder::Bool(v) => ColumnWrite::Bool(v),
        ColumnBuilder::I64(v) => ColumnWrite::I64(v),
        ColumnBuilder::F64(v) => ColumnWrite::F64(v),
        ColumnBuilder::Timestamp(v) => ColumnWrite::Timestamp(v),
        ColumnBuilder::Symbol(v) => ColumnWrite::Symbol(v, None),
        ColumnBuilder::Str(v) => ColumnWrite::Str(v),
    }
}

/// Returns `Ok(true)` if the row should still be written with the failed
/// field left null (`SkipCol`), `Ok(false)` if the whole row must be
/// dropped (`SkipRow`), or an error that aborts the partition
/// (`SkipAll`).
fn apply_atomicity_row(atomicity: AtomicityPolicy, rows_skipped: &mut u64) -> Result<bool> {
    match atomicity {
        AtomicityPolicy::SkipCol => Ok(true),
        AtomicityPolicy::SkipRow => {
            *rows_skipped += 1;
            Ok(false)
        }
        AtomicityPolicy::SkipAll => Err(ImportError::parse(
            Phase::PartitionImport,
            "field failed to parse under SKIP_ALL atomicity",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lpt_assignment_balances_load_across_workers() {
        let mut partitions = vec![
            PartitionInfo { key: 1, dir_name: "a".into(), bytes: 100, task_id: 0, imported_rows: 0 },
            PartitionInfo { key: 2, dir_name: "b".into(), bytes: 80, task_id: 0, imported_rows: 0 },
            PartitionInfo { key: 3, dir_name: "c".into(), bytes: 60, task_id: 0, imported_rows: 0 },
            PartitionInfo { key: 4, dir_name: "d".into(), bytes: 10, task_id: 0, imported_rows: 0 },
        ];
        assign_partitions_lpt(&mut partitions, 2);
        let worker0: u64 = partitions.iter().filter(|p| p.task_id == 0).map(|p| p.bytes).sum();
        let worker1: u64 = partitions.iter().filter(|p| p.task_id == 1).map(|p| p.bytes).sum();
        assert_eq!(worker0 + worker1, 250);
        assert!((worker0 as i64 - worker1 as i64).abs() <= 40);
        assert_eq!(active_worker_count(&partitions), 2);
    }

    #[test]
    fn merge_partition_index_orders_by_timestamp_then_offset() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path();

        let chunk_a = vec![
            IndexedRecord { timestamp: 10, file_offset: 5 },
            IndexedRecord { timestamp: 30, file_offset: 50 },
        ];
        let chunk_b = vec![
            IndexedRecord { timestamp: 20, file_offset: 25 },
            IndexedRecord { timestamp: 30, file_offset: 40 },
        ];
        fs::write(dir.join("0_0"), chunk_a.as_bytes()).unwrap();
        fs::write(dir.join("0_1"), chunk_b.as_bytes()).unwrap();

        let merged = merge_partition_index(dir).unwrap();
        let timestamps: Vec<u64> = merged.iter().map(|r| r.timestamp).collect();
        assert_eq!(timestamps, vec![10, 20, 30, 30]);
        // tie broken by offset ascending
        assert_eq!(merged[2].file_offset, 40);
        assert_eq!(merged[3].file_offset, 50);
    }
}
