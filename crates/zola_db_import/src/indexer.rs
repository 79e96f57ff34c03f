//! For each chunk, emits per-partition files of `(timestamp, file-offset)`
//! pairs (spec.md §4.4, C4).

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use zerocopy::IntoBytes;
use zola_db_core::PartitionBy;

use crate::detect::parse_timestamp_micros;
use crate::error::{ImportError, Phase, Result};
use crate::error::AtomicityPolicy;
use crate::lexer::{Lexer, Options};
use crate::record::IndexedRecord;

pub struct IndexerConfig {
    pub work_root: PathBuf,
    pub table: String,
    pub ts_column: usize,
    pub delimiter: u8,
    pub partition_by: PartitionBy,
    pub atomicity: AtomicityPolicy,
    pub force_header: bool,
    pub flush_threshold: usize,
}

#[derive(Debug, Default)]
pub struct ChunkIndexResult {
    pub partition_bytes: Vec<(i64, u64)>,
    pub max_line_length: usize,
    pub rows_indexed: u64,
    pub rows_skipped: u64,
}

/// Indexes one `[lo, hi)` chunk of `path`, starting its line counter at
/// `start_line`. `worker_id`/`chunk_id` name the per-flush index files
/// (`$workRoot/$table/$partition_dir/${worker}_${chunk}_${flush_seq}`).
pub fn index_chunk(
    path: &Path,
    lo: u64,
    hi: u64,
    start_line: u64,
    worker_id: usize,
    chunk_id: usize,
    cfg: &IndexerConfig,
) -> Result<ChunkIndexResult> {
    let mut file = fs::File::open(path).map_err(|e| ImportError::io(path, e))?;
    file.seek(SeekFrom::Start(lo))
        .map_err(|e| ImportError::io(path, e))?;
    let mut buf = vec![0u8; (hi - lo) as usize];
    file.read_exact(&mut buf).map_err(|e| ImportError::io(path, e))?;

    let mut lexer = Lexer::new(
        &buf,
        start_line,
        Options {
            column_delimiter: cfg.delimiter,
            skip_lines_with_extra_values: true,
            ignore_header: false,
        },
    );

    if cfg.force_header && lo == 0 {
        lexer.next_record();
    }

    let mut buffers: HashMap<i64, Vec<IndexedRecord>> = HashMap::new();
    let mut partition_bytes: HashMap<i64, u64> = HashMap::new();
    let mut flush_seqs: HashMap<i64, u32> = HashMap::new();
    let mut max_line_length = 0usize;
    let mut rows_indexed = 0u64;
    let mut rows_skipped = 0u64;

    loop {
        let record_start = lo + lexer.pos() as u64;
        let record = match lexer.next_record() {
            Some(r) => r,
            None => break,
        };
        let record_end = lo + lexer.pos() as u64;
        max_line_length = max_line_length.max((record_end - record_start) as usize);

        process_record(
            cfg,
            worker_id,
            chunk_id,
            record_start,
            &record,
            &mut buffers,
            &mut partition_bytes,
            &mut flush_seqs,
            &mut rows_indexed,
            &mut rows_skipped,
        )?;
    }

    let record_start = lo + lexer.pos() as u64;
    if let Some(record) = lexer.parse_last() {
        process_record(
            cfg,
            worker_id,
            chunk_id,
            record_start,
            &record,
            &mut buffers,
            &mut partition_bytes,
            &mut flush_seqs,
            &mut rows_indexed,
            &mut rows_skipped,
        )?;
    }

    for (key, mut recs) in buffers {
        if recs.is_empty() {
            continue;
        }
        recs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        let flush_seq = flush_seqs.entry(key).or_insert(0);
        let bytes = flush_partition(
            &cfg.work_root,
            &cfg.table,
            cfg.partition_by,
            key,
            worker_id,
            chunk_id,
            *flush_seq,
            &recs,
        )?;
        *flush_seq += 1;
        *partition_bytes.entry(key).or_insert(0) += bytes;
    }

    Ok(ChunkIndexResult {
        partition_bytes: partition_bytes.into_iter().collect(),
        max_line_length,
        rows_indexed,
        rows_skipped,
    })
}

fn process_record(
    cfg: &IndexerConfig,
    worker_id: usize,
    chunk_id: usize,
    record_start: u64,
    record: &crate::lexer::Record,
    buffers: &mut HashMap<i64, Vec<IndexedRecord>>,
    partition_bytes: &mut HashMap<i64, u64>,
    flush_seqs: &mut HashMap<i64, u32>,
    rows_indexed: &mut u64,
    rows_skipped: &mut u64,
) -> Result<()> {
    let raw = record
        .fields
        .get(cfg.ts_column)
        .map(|f| String::from_utf8_lossy(f).into_owned())
        .unwrap_or_default();

    // Open Question 1 (spec.md §9): an empty timestamp field is always an
    // explicit parse failure, governed by the atomicity policy like any
    // other — never a silent "skip row" regardless of policy.
    let parsed = if raw.is_empty() {
        None
    } else {
        parse_timestamp_micros(&raw)
    };

    let ts = match parsed {
        Some(ts) => ts,
        None => {
            return handle_parse_failure(cfg, rows_skipped);
        }
    };

    let key = match cfg.partition_by.floor(ts) {
        Ok(k) => k,
        Err(_) => return handle_parse_failure(cfg, rows_skipped),
    };

    buffers
        .entry(key)
        .or_default()
        .push(IndexedRecord::new(ts, record_start));
    *rows_indexed += 1;

    if buffers[&key].len() >= cfg.flush_threshold {
        let mut recs = buffers.remove(&key).unwrap();
        recs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        let flush_seq = flush_seqs.entry(key).or_insert(0);
        let bytes = flush_partition(
            &cfg.work_root,
            &cfg.table,
            cfg.partition_by,
            key,
            worker_id,
            chunk_id,
            *flush_seq,
            &recs,
        )?;
        *flush_seq += 1;
        *partition_bytes.entry(key).or_insert(0) += bytes;
    }

    Ok(())
}

fn handle_parse_failure(cfg: &IndexerConfig, rows_skipped: &mut u64) -> Result<()> {
    match cfg.atomicity {
        AtomicityPolicy::SkipAll => Err(ImportError::parse(
            Phase::Indexing,
            "timestamp field failed to parse",
        )),
        AtomicityPolicy::SkipCol | AtomicityPolicy::SkipRow => {
            *rows_skipped += 1;
            Ok(())
        }
    }
}

/// Writes one flush's records to their own file, `${worker}_${chunk}_${flush_seq}`.
/// Each flush is already sorted ascending by timestamp (spec.md §4.4); keeping
/// every flush in a distinct file (rather than appending run after run into one
/// `${worker}_${chunk}` file) guarantees every chunk index file `merge::merge_partition_index`
/// later k-way-merges is itself a single sorted run, not several runs concatenated.
fn flush_partition(
    work_root: &Path,
    table: &str,
    partition_by: PartitionBy,
    key: i64,
    worker_id: usize,
    chunk_id: usize,
    flush_seq: u32,
    recs: &[IndexedRecord],
) -> Result<u64> {
    let dir_name = partition_by
        .format(key)
        .map_err(|e| ImportError::Config(e.to_string()))?;
    let partition_dir = work_root.join(table).join(&dir_name);
    fs::create_dir_all(&partition_dir).map_err(|e| ImportError::io(&partition_dir, e))?;
    let file_path = partition_dir.join(format!("{worker_id}_{chunk_id}_{flush_seq}"));

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&file_path)
        .map_err(|e| ImportError::io(&file_path, e))?;
    file.write_all(recs.as_bytes())
        .map_err(|e| ImportError::io(&file_path, e))?;
    Ok(recs.as_bytes().len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::TempDir;

    fn write_csv(dir: &Path, content: &[u8]) -> PathBuf {
        let path = dir.join("input.csv");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(content).unwrap();
        path
    }

    #[test]
    fn indexes_rows_into_a_single_day_partition() {
        let tmp = TempDir::new().unwrap();
        let content =
            b"ts,price\n2022-01-01T00:00:00Z,1\n2022-01-01T01:00:00Z,2\n2022-01-01T02:00:00Z,3\n";
        let path = write_csv(tmp.path(), content);

        let cfg = IndexerConfig {
            work_root: tmp.path().join("work"),
            table: "trades".into(),
            ts_column: 0,
            delimiter: b',',
            partition_by: PartitionBy::Day,
            atomicity: AtomicityPolicy::SkipCol,
            force_header: true,
            flush_threshold: 1000,
        };

        let result = index_chunk(&path, 0, content.len() as u64, 1, 0, 0, &cfg).unwrap();
        assert_eq!(result.rows_indexed, 3);
        assert_eq!(result.rows_skipped, 0);
        assert_eq!(result.partition_bytes.len(), 1);

        let (key, bytes) = result.partition_bytes[0];
        assert_eq!(bytes, 3 * crate::record::INDEXED_RECORD_SIZE as u64);
        let dir_name = PartitionBy::Day.format(key).unwrap();
        assert_eq!(dir_name, "2022-01-01");
    }

    #[test]
    fn skip_row_policy_drops_malformed_timestamp() {
        let tmp = TempDir::new().unwrap();
        let content = b"ts,price\n2022-01-01T00:00:00Z,1\nnot-a-timestamp,2\n";
        let path = write_csv(tmp.path(), content);

        let cfg = IndexerConfig {
            work_root: tmp.path().join("work"),
            table: "trades".into(),
            ts_column: 0,
            delimiter: b',',
            partition_by: PartitionBy::Day,
            atomicity: AtomicityPolicy::SkipRow,
            force_header: true,
            flush_threshold: 1000,
        };

        let result = index_chunk(&path, 0, content.len() as u64, 1, 0, 0, &cfg).unwrap();
        assert_eq!(result.rows_indexed, 1);
        assert_eq!(result.rows_skipped, 1);
    }

    #[test]
    fn skip_all_policy_fails_the_chunk() {
        let tmp = TempDir::new().unwrap();
        let content = b"ts,price\nnot-a-timestamp,2\n";
        let path = write_csv(tmp.path(), content);

        let cfg = IndexerConfig {
            work_root: tmp.path().join("work"),
            table: "trades".into(),
            ts_column: 0,
            delimiter: b',',
            partition_by: PartitionBy::Day,
            atomicity: AtomicityPolicy::SkipAll,
            force_header: true,
            flush_threshold: 1000,
        };

        let err = index_chunk(&path, 0, content.len() as u64, 1, 0, 0, &cfg).unwrap_err();
        assert_eq!(err.phase(), Some(Phase::Indexing));
    }
}
