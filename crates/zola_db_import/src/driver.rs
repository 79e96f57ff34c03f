//! Orchestrates boundary scanning, indexing, merge-and-load, symbol
//! reconciliation, index building and attach into one phase state
//! machine: `INIT -> BOUNDARY_CHECK -> INDEXING -> PARTITION_IMPORT ->
//! SYMBOL_TABLE_MERGE -> UPDATE_SYMBOL_KEYS -> BUILD_INDEX ->
//! MOVE_PARTITIONS -> ATTACH_PARTITIONS -> DONE`. This is the `Importer`
//! behind the `configure` / `set_min_chunk_size` / `run` driver API.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use zola_db_core::{ColumnDef, ColumnType, PartitionBy, Schema};

use crate::detect;
use crate::error::{AtomicityPolicy, ImportError, Phase, Result};
use crate::index_builder;
use crate::indexer::{self, IndexerConfig};
use crate::lexer::{self, Lexer, Options};
use crate::merge::{self, PartitionInfo};
use crate::mover::{self, TargetOrigin};
use crate::queue;
use crate::symbols;
use crate::chunker;

/// Caller-provided cancellation token, polled at every phase boundary and
/// at task dispatch. Cloning shares the same underlying flag, so a
/// caller can hold one end and flip it from another thread while
/// `run()` is in progress.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// The inputs to a single `configure()` call (spec.md §6 Driver API).
/// `ts_format` is accepted for API parity with the source driver but
/// unused: timestamp parsing always goes through `detect::parse_timestamp_micros`'s
/// RFC-3339/date auto-recognition rather than a caller-supplied format
/// string (recorded as a simplification in DESIGN.md).
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub table: String,
    pub input_file: PathBuf,
    pub partition_by: PartitionBy,
    pub delimiter: Option<u8>,
    pub ts_column: Option<usize>,
    pub ts_format: Option<String>,
    pub force_header: bool,
    pub atomicity: AtomicityPolicy,
}

/// Outcome of a successful `run()` (spec.md §6 "Exit status": `OK` maps to
/// `Ok(Stats)`, `CANCELLED`/`FAILED(phase, message)` map to the matching
/// `ImportError` variant via `Err`).
#[derive(Debug, Clone)]
pub struct Stats {
    pub imported_rows: u64,
    pub skipped_rows: u64,
    pub partitions_attached: usize,
    /// Number of shadow-table workers that actually carried load after
    /// the greedy LPT assignment (spec.md §4.5).
    pub active_workers: usize,
    pub phase_reached: Phase,
}

/// Process-wide advisory lock: "a single active parallel import; concurrent
/// attempts fail fast with BUSY" (spec.md §5).
static IMPORT_ACTIVE: AtomicBool = AtomicBool::new(false);

struct ActiveGuard;

impl ActiveGuard {
    fn acquire() -> Result<Self> {
        IMPORT_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ImportError::Busy)?;
        Ok(ActiveGuard)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        IMPORT_ACTIVE.store(false, Ordering::Release);
    }
}

fn shadow_name(table: &str, worker: usize) -> String {
    format!("{table}_{worker}")
}

fn paths_equal(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// The single-call driver (spec.md §6). One `Importer` runs at most one
/// import; build a new one per call to `run()`.
pub struct Importer {
    root: PathBuf,
    work_root: PathBuf,
    workers: usize,
    min_chunk_size: u64,
    scan_buffer_size: usize,
    flush_threshold: usize,
    text_analysis_max_lines: usize,
    protected_roots: Vec<PathBuf>,
    cancel: CancelToken,
    config: Option<ImportConfig>,
}

impl Importer {
    /// `root` is the database data directory holding (or to hold) the
    /// target table; `work_root` is where the importer's scratch
    /// directory and per-worker shadow tables are staged (spec.md §6
    /// on-disk layout).
    pub fn new(root: impl Into<PathBuf>, work_root: impl Into<PathBuf>, workers: usize) -> Self {
        Importer {
            root: root.into(),
            work_root: work_root.into(),
            workers: workers.max(1),
            min_chunk_size: 4 * 1024 * 1024,
            scan_buffer_size: 256 * 1024,
            flush_threshold: 50_000,
            text_analysis_max_lines: 200,
            protected_roots: Vec::new(),
            cancel: CancelToken::new(),
            config: None,
        }
    }

    pub fn configure(&mut self, cfg: ImportConfig) -> &mut Self {
        self.config = Some(cfg);
        self
    }

    pub fn set_min_chunk_size(&mut self, bytes: u64) -> &mut Self {
        self.min_chunk_size = bytes.max(1);
        self
    }

    /// Directories a work root must never alias, checked before the work
    /// directory is created (spec.md §3 "Ownership & lifecycle", §5
    /// "Resource scoping"). Defaults to none; callers wire in their
    /// installation's `db`/`conf`/`snapshot`/`root` directories.
    pub fn set_protected_roots(&mut self, roots: Vec<PathBuf>) -> &mut Self {
        self.protected_roots = roots;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn check_cancel(&self, phase: Phase) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(ImportError::Cancelled(phase))
        } else {
            Ok(())
        }
    }

    pub fn run(&mut self) -> Result<Stats> {
        let _guard = ActiveGuard::acquire()?;
        let cfg = self
            .config
            .clone()
            .ok_or_else(|| ImportError::Config("configure() must be called before run()".into()))?;

        if cfg.table.trim().is_empty() || cfg.table.contains(['/', '\\']) {
            return Err(ImportError::Config(format!("invalid table name {:?}", cfg.table)));
        }

        let work_dir = self.work_root.join(&cfg.table);
        if self
            .protected_roots
            .iter()
            .any(|p| paths_equal(p, &work_dir) || paths_equal(p, &self.work_root))
        {
            return Err(ImportError::Config(format!(
                "work directory {} aliases a protected root",
                work_dir.display()
            )));
        }

        zola_db::recover(&self.root)?;

        let pre_existing = zola_db::table_exists(&self.root, &cfg.table);
        let origin = if pre_existing {
            TargetOrigin::PreExisting
        } else {
            TargetOrigin::CreatedByImport
        };

        if pre_existing {
            let existing_schema = zola_db::read_schema(&self.root, &cfg.table)?
                .ok_or_else(|| ImportError::SchemaMismatch("target table has no schema file".into()))?;
            if existing_schema.partition_by.as_str() != cfg.partition_by.as_str() {
                return Err(ImportError::SchemaMismatch(format!(
                    "target partition_by {} does not match configured {}",
                    existing_schema.partition_by.as_str(),
                    cfg.partition_by.as_str()
                )));
            }
            let ts_col_name = existing_schema.ts_column_def().name.clone();
            let existing_rows = zola_db::row_count(&self.root, &cfg.table, &ts_col_name)?;
            if existing_rows != 0 {
                return Err(ImportError::Config(format!(
                    "target table {} is not empty",
                    cfg.table
                )));
            }
        }

        self.check_cancel(Phase::Init)?;

        let file_len = fs::metadata(&cfg.input_file)
            .map_err(|e| ImportError::io(&cfg.input_file, e))?
            .len();
        if file_len == 0 {
            return Err(ImportError::failed(Phase::BoundaryCheck, "input file is empty"));
        }

        let raw_sample = read_sample_bytes(&cfg.input_file, self.text_analysis_max_lines)?;
        let delimiter = cfg.delimiter.unwrap_or_else(|| lexer::detect_delimiter(&raw_sample));
        let sample_rows = lex_sample(&raw_sample, delimiter, self.text_analysis_max_lines);
        if sample_rows.is_empty() {
            return Err(ImportError::failed(Phase::BoundaryCheck, "no records found in input file"));
        }
        let detected = detect::detect_columns(&sample_rows, self.text_analysis_max_lines);
        let has_header = cfg.force_header || detected.has_header;

        let schema = if pre_existing {
            zola_db::read_schema(&self.root, &cfg.table)?.expect("checked above")
        } else {
            let ts_column = match cfg.ts_column {
                Some(c) => c,
                None => detected
                    .columns
                    .iter()
                    .position(|c| c.col_type == ColumnType::Timestamp)
                    .ok_or_else(|| {
                        ImportError::Config(
                            "could not detect a timestamp column; pass ts_column explicitly".into(),
                        )
                    })?,
            };
            Schema {
                columns: detected
                    .columns
                    .iter()
                    .map(|c| ColumnDef {
                        name: c.name.clone(),
                        col_type: c.col_type,
                    })
                    .collect(),
                ts_column,
                partition_by: cfg.partition_by,
            }
        };

        if !pre_existing {
            zola_db::create_table(&self.root, &cfg.table, &schema)?;
        }

        fs::create_dir_all(&work_dir).map_err(|e| ImportError::io(&work_dir, e))?;

        let result = self.run_phases(&cfg, &schema, has_header, delimiter, file_len, &work_dir, origin);

        if result.is_err() {
            match origin {
                TargetOrigin::PreExisting => {
                    let _ = zola_db::truncate_table(&self.root, &cfg.table);
                }
                TargetOrigin::CreatedByImport => {
                    let _ = zola_db::remove_table(&self.root, &cfg.table);
                }
            }
        }
        for w in 0..self.workers {
            let _ = zola_db::remove_table(&self.root, &shadow_name(&cfg.table, w));
        }
        let _ = fs::remove_dir_all(&work_dir);

        result
    }

    #[allow(clippy::too_many_arguments)]
    fn run_phases(
        &self,
        cfg: &ImportConfig,
        schema: &Schema,
        has_header: bool,
        delimiter: u8,
        file_len: u64,
        work_dir: &Path,
        origin: TargetOrigin,
    ) -> Result<Stats> {
        self.check_cancel(Phase::BoundaryCheck)?;

        let boundaries = chunker::split_chunks(
            &cfg.input_file,
            file_len,
            self.workers,
            self.min_chunk_size,
            self.scan_buffer_size,
        )?;
        let ranges = chunker::chunk_ranges(&boundaries);
        if ranges.is_empty() {
            return Err(ImportError::failed(Phase::BoundaryCheck, "no chunk boundaries derived from input"));
        }

        self.check_cancel(Phase::Indexing)?;

        struct IndexTask {
            lo: u64,
            hi: u64,
            start_line: u64,
            chunk_id: usize,
        }

        let indexer_cfg = IndexerConfig {
            work_root: self.work_root.clone(),
            table: cfg.table.clone(),
            ts_column: schema.ts_column,
            delimiter,
            partition_by: schema.partition_by,
            atomicity: cfg.atomicity,
            force_header: has_header,
            flush_threshold: self.flush_threshold,
        };

        let index_tasks: Vec<IndexTask> = ranges
            .iter()
            .enumerate()
            .map(|(i, &(lo, hi, line))| IndexTask {
                lo,
                hi,
                start_line: line,
                chunk_id: i,
            })
            .collect();

        let input_file = &cfg.input_file;
        let index_outcomes = queue::run_phase(index_tasks, self.workers, self.workers, |t: IndexTask| {
            indexer::index_chunk(input_file, t.lo, t.hi, t.start_line, t.chunk_id, t.chunk_id, &indexer_cfg)
        });

        let mut partition_bytes: HashMap<i64, u64> = HashMap::new();
        let mut max_line_length = 256usize;
        let mut rows_indexed = 0u64;
        let mut rows_skipped = 0u64;
        for outcome in index_outcomes {
            let r = outcome?;
            for (k, b) in r.partition_bytes {
                *partition_bytes.entry(k).or_insert(0) += b;
            }
            max_line_length = max_line_length.max(r.max_line_length);
            rows_indexed += r.rows_indexed;
            rows_skipped += r.rows_skipped;
        }

        let mut partitions = Vec::with_capacity(partition_bytes.len());
        for (key, bytes) in partition_bytes {
            let dir_name = schema.partition_by.format(key)?;
            partitions.push(PartitionInfo {
                key,
                dir_name,
                bytes,
                task_id: 0,
                imported_rows: 0,
            });
        }

        if partitions.is_empty() {
            return Ok(Stats {
                imported_rows: 0,
                skipped_rows: rows_skipped,
                partitions_attached: 0,
                active_workers: 0,
                phase_reached: Phase::Done,
            });
        }

        self.check_cancel(Phase::PartitionImport)?;

        merge::assign_partitions_lpt(&mut partitions, self.workers);
        let active_workers = merge::active_worker_count(&partitions);
        partitions.sort_by(|a, b| a.task_id.cmp(&b.task_id).then(a.key.cmp(&b.key)));

        let mut by_worker: Vec<Vec<PartitionInfo>> = vec![Vec::new(); self.workers];
        for p in &partitions {
            by_worker[p.task_id as usize].push(p.clone());
        }

        for (w, parts) in by_worker.iter().enumerate() {
            if parts.is_empty() {
                continue;
            }
            zola_db::create_table(&self.root, &shadow_name(&cfg.table, w), schema)?;
        }

        struct WorkerImportTask {
            worker: usize,
            shadow_dir: PathBuf,
            partitions: Vec<PartitionInfo>,
        }

        let worker_tasks: Vec<WorkerImportTask> = by_worker
            .iter()
            .enumerate()
            .filter(|(_, parts)| !parts.is_empty())
            .map(|(w, parts)| WorkerImportTask {
                worker: w,
                shadow_dir: zola_db::table_dir(&self.root, &shadow_name(&cfg.table, w)),
                partitions: parts.clone(),
            })
            .collect();

        let work_root = &self.work_root;
        let table = &cfg.table;
        let atomicity = cfg.atomicity;
        let read_buffer_size = max_line_length.max(256);

        let import_outcomes = queue::run_phase(worker_tasks, self.workers, self.workers, {
            move |t: WorkerImportTask| -> Result<(usize, Vec<(i64, u64, u64)>)> {
                let mut dicts = HashMap::new();
                let mut results = Vec::with_capacity(t.partitions.len());
                for part in &t.partitions {
                    let partition_dir = work_root.join(table).join(&part.dir_name);
                    let merged = merge::merge_partition_index(&partition_dir)?;
                    let outcome = merge::import_partition(
                        input_file,
                        &merged,
                        schema,
                        delimiter,
                        atomicity,
                        read_buffer_size,
                        &mut dicts,
                        &t.shadow_dir,
                        &part.dir_name,
                    )?;
                    results.push((part.key, outcome.imported_rows, outcome.rows_skipped));
                }
                Ok((t.worker, results))
            }
        });

        let mut per_partition: HashMap<(u32, i64), (u64, u64)> = HashMap::new();
        for outcome in import_outcomes {
            let (worker, results) = outcome?;
            for (key, imported, skipped) in results {
                per_partition.insert((worker as u32, key), (imported, skipped));
            }
        }

        let mut imported_rows_total = 0u64;
        let mut skipped_rows_total = rows_skipped;
        for worker_parts in by_worker.iter_mut() {
            for p in worker_parts.iter_mut() {
                if let Some(&(imported, skipped)) = per_partition.get(&(p.task_id, p.key)) {
                    p.imported_rows = imported;
                    imported_rows_total += imported;
                    skipped_rows_total += skipped;
                }
            }
        }

        let symbol_columns: Vec<String> = schema
            .symbol_columns()
            .map(|(_, c)| c.name.clone())
            .collect();

        if !symbol_columns.is_empty() {
            self.check_cancel(Phase::SymbolTableMerge)?;

            let target_table_dir = zola_db::table_dir(&self.root, &cfg.table);
            let shadow_dirs: Vec<PathBuf> = by_worker
                .iter()
                .enumerate()
                .filter(|(_, p)| !p.is_empty())
                .map(|(w, _)| zola_db::table_dir(&self.root, &shadow_name(&cfg.table, w)))
                .collect();

            if !shadow_dirs.is_empty() {
                let target_table_dir_ref = &target_table_dir;
                let shadow_dirs_ref = &shadow_dirs;
                let merge_outcomes = queue::run_phase(
                    symbol_columns.clone(),
                    self.workers,
                    self.workers,
                    move |column: String| -> Result<(String, Vec<Vec<u32>>)> {
                        let remaps = symbols::merge_dictionaries(target_table_dir_ref, shadow_dirs_ref, &column)?;
                        Ok((column, remaps))
                    },
                );
                for outcome in merge_outcomes {
                    let (column, remaps) = outcome?;
                    for (i, remap) in remaps.iter().enumerate() {
                        symbols::write_remap_file(&symbols::remap_path(&shadow_dirs[i], &column), remap)?;
                    }
                }
            }

            self.check_cancel(Phase::UpdateSymbolKeys)?;

            struct RewriteTask {
                shadow_dir: PathBuf,
                partition_dirs: Vec<String>,
                column: String,
            }

            let mut rewrite_tasks = Vec::new();
            for (w, parts) in by_worker.iter().enumerate() {
                if parts.is_empty() {
                    continue;
                }
                let shadow_dir = zola_db::table_dir(&self.root, &shadow_name(&cfg.table, w));
                let partition_dirs: Vec<String> = parts
                    .iter()
                    .filter(|p| p.imported_rows > 0)
                    .map(|p| p.dir_name.clone())
                    .collect();
                for column in &symbol_columns {
                    rewrite_tasks.push(RewriteTask {
                        shadow_dir: shadow_dir.clone(),
                        partition_dirs: partition_dirs.clone(),
                        column: column.clone(),
                    });
                }
            }

            let rewrite_outcomes = queue::run_phase(rewrite_tasks, self.workers, self.workers, |t: RewriteTask| {
                symbols::rewrite_all_partitions(&t.shadow_dir, &t.partition_dirs, &t.column)
            });
            for outcome in rewrite_outcomes {
                outcome?;
            }

            self.check_cancel(Phase::BuildIndex)?;

            struct IndexBuildTask {
                shadow_dir: PathBuf,
                partition_dirs: Vec<String>,
            }

            let build_tasks: Vec<IndexBuildTask> = by_worker
                .iter()
                .enumerate()
                .filter(|(_, p)| !p.is_empty())
                .map(|(w, parts)| IndexBuildTask {
                    shadow_dir: zola_db::table_dir(&self.root, &shadow_name(&cfg.table, w)),
                    partition_dirs: parts
                        .iter()
                        .filter(|p| p.imported_rows > 0)
                        .map(|p| p.dir_name.clone())
                        .collect(),
                })
                .collect();

            let symbol_columns_ref = &symbol_columns;
            let build_outcomes = queue::run_phase(build_tasks, self.workers, self.workers, move |t: IndexBuildTask| {
                index_builder::build_indexes_for_table(&t.shadow_dir, &t.partition_dirs, symbol_columns_ref)
            });
            for outcome in build_outcomes {
                outcome?;
            }
        }

        self.check_cancel(Phase::MovePartitions)?;
        self.check_cancel(Phase::AttachPartitions)?;

        struct MoveTask {
            shadow_dir: PathBuf,
            partitions: Vec<PartitionInfo>,
        }

        let move_tasks: Vec<MoveTask> = by_worker
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_empty())
            .map(|(w, parts)| MoveTask {
                shadow_dir: zola_db::table_dir(&self.root, &shadow_name(&cfg.table, w)),
                partitions: parts.clone(),
            })
            .collect();

        let root = &self.root;
        let move_outcomes = queue::run_phase(move_tasks, self.workers, self.workers, move |t: MoveTask| {
            mover::move_and_attach_partitions(root, table, &t.shadow_dir, &t.partitions, origin)
        });

        let mut partitions_attached = 0usize;
        for outcome in move_outcomes {
            partitions_attached += outcome?;
        }

        Ok(Stats {
            imported_rows: imported_rows_total,
            skipped_rows: skipped_rows_total,
            partitions_attached,
            active_workers,
            phase_reached: Phase::Done,
        })
    }
}

/// Reads from the start of `path` until at least `max_lines` newlines have
/// been seen (or the whole file, whichever comes first), bounded at 64 MiB
/// so a pathological single-line file can't blow up detection.
fn read_sample_bytes(path: &Path, max_lines: usize) -> Result<Vec<u8>> {
    use std::io::Read;
    const CAP: usize = 64 * 1024 * 1024;
    let mut file = fs::File::open(path).map_err(|e| ImportError::io(path, e))?;
    let mut buf = Vec::new();
    let mut chunk = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut chunk).map_err(|e| ImportError::io(path, e))?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let lines = buf.iter().filter(|&&b| b == b'\n').count();
        if lines > max_lines || buf.len() >= CAP {
            break;
        }
    }
    Ok(buf)
}

fn lex_sample(raw: &[u8], delimiter: u8, max_lines: usize) -> Vec<Vec<String>> {
    let mut lexer = Lexer::new(
        raw,
        1,
        Options {
            column_delimiter: delimiter,
            skip_lines_with_extra_values: true,
            ignore_header: false,
        },
    );
    let mut rows = Vec::new();
    while rows.len() < max_lines {
        match lexer.next_record() {
            Some(r) => rows.push(
                r.fields
                    .iter()
                    .map(|f| String::from_utf8_lossy(f).into_owned())
                    .collect(),
            ),
            None => break,
        }
    }
    if rows.len() < max_lines {
        if let Some(r) = lexer.parse_last() {
            rows.push(
                r.fields
                    .iter()
                    .map(|f| String::from_utf8_lossy(f).into_owned())
                    .collect(),
            );
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_csv(dir: &Path, content: &[u8]) -> PathBuf {
        let path = dir.join("input.csv");
        fs::write(&path, content).unwrap();
        path
    }

    fn base_cfg(input_file: PathBuf) -> ImportConfig {
        ImportConfig {
            table: "trades".to_string(),
            input_file,
            partition_by: PartitionBy::Day,
            delimiter: None,
            ts_column: None,
            ts_format: None,
            force_header: true,
            atomicity: AtomicityPolicy::SkipCol,
        }
    }

    #[test]
    fn s1_empty_file_fails_boundary_check_without_creating_table() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("db");
        let work = tmp.path().join("work");
        let input = write_csv(tmp.path(), b"");

        let mut importer = Importer::new(&root, &work, 2);
        importer.configure(base_cfg(input));
        let err = importer.run().unwrap_err();
        assert_eq!(err.phase(), Some(Phase::BoundaryCheck));
        assert!(!zola_db::table_exists(&root, "trades"));
    }

    #[test]
    fn s2_one_row_one_worker_lands_in_its_day_partition() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("db");
        let work = tmp.path().join("work");
        let input = write_csv(tmp.path(), b"ts,val\n2022-01-01T00:00:00Z,42\n");

        let mut importer = Importer::new(&root, &work, 1);
        importer.configure(base_cfg(input));
        let stats = importer.run().unwrap();

        assert_eq!(stats.imported_rows, 1);
        assert_eq!(stats.skipped_rows, 0);
        assert_eq!(stats.partitions_attached, 1);
        assert_eq!(zola_db::row_count(&root, "trades", "ts").unwrap(), 1);
        assert!(!work.join("trades").exists());
    }

    #[test]
    fn s6_skip_all_on_bad_row_leaves_target_empty() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("db");
        let work = tmp.path().join("work");
        let input = write_csv(
            tmp.path(),
            b"ts,val\n2022-01-01T00:00:00Z,1\nnot-a-timestamp,2\n",
        );

        let mut cfg = base_cfg(input);
        cfg.atomicity = AtomicityPolicy::SkipAll;

        let mut importer = Importer::new(&root, &work, 1);
        importer.configure(cfg);
        let err = importer.run().unwrap_err();
        assert_eq!(err.phase(), Some(Phase::Indexing));
        assert_eq!(zola_db::row_count(&root, "trades", "ts").unwrap(), 0);
        assert!(!work.join("trades").exists());
    }

    #[test]
    fn concurrent_run_fails_fast_with_busy() {
        let _guard = ActiveGuard::acquire().unwrap();
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("db");
        let work = tmp.path().join("work");
        let input = write_csv(tmp.path(), b"ts,val\n2022-01-01T00:00:00Z,1\n");

        let mut importer = Importer::new(&root, &work, 1);
        importer.configure(base_cfg(input));
        let err = importer.run().unwrap_err();
        assert!(matches!(err, ImportError::Busy));
    }

    #[test]
    fn cancellation_before_run_leaves_no_detritus() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("db");
        let work = tmp.path().join("work");
        let input = write_csv(
            tmp.path(),
            b"ts,val\n2022-01-01T00:00:00Z,1\n2022-01-02T00:00:00Z,2\n",
        );

        let mut importer = Importer::new(&root, &work, 2);
        importer.configure(base_cfg(input));
        importer.cancel_token().cancel();
        let err = importer.run().unwrap_err();
        assert!(matches!(err, ImportError::Cancelled(_)));
        assert!(!zola_db::table_exists(&root, "trades"));
        assert!(!work.join("trades").exists());
    }

    #[test]
    fn multi_row_multi_partition_import_with_symbol_column() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("db");
        let work = tmp.path().join("work");
        let mut content = String::from("ts,price,side\n");
        for day in 0..3 {
            for i in 0..6 {
                let side = if i % 2 == 0 { "buy" } else { "sell" };
                content.push_str(&format!(
                    "2022-01-0{}T0{}:00:00Z,{}.5,{}\n",
                    day + 1,
                    i,
                    100 + i,
                    side
                ));
            }
        }
        let input = write_csv(tmp.path(), content.as_bytes());

        let mut importer = Importer::new(&root, &work, 3);
        importer.configure(base_cfg(input));
        let stats = importer.run().unwrap();

        assert_eq!(stats.imported_rows, 18);
        assert_eq!(stats.partitions_attached, 3);
        assert_eq!(zola_db::row_count(&root, "trades", "ts").unwrap(), 18);
    }
}
