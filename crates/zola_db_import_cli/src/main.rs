use std::path::PathBuf;

use zola_db_core::PartitionBy;
use zola_db_import::{AtomicityPolicy, ImportConfig, Importer};

fn usage(argv0: &str) -> String {
    format!(
        "Usage: {argv0} <data_dir> <work_dir> <table> <input_csv> <partition_by> [workers] [atomicity]\n\
         \n\
         partition_by: YEAR | MONTH | DAY | HOUR\n\
         workers:      number of worker threads (default: number of CPUs)\n\
         atomicity:    SKIP_COL | SKIP_ROW | SKIP_ALL (default: SKIP_COL)"
    )
}

fn parse_atomicity(s: &str) -> Option<AtomicityPolicy> {
    match s {
        "SKIP_COL" => Some(AtomicityPolicy::SkipCol),
        "SKIP_ROW" => Some(AtomicityPolicy::SkipRow),
        "SKIP_ALL" => Some(AtomicityPolicy::SkipAll),
        _ => None,
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 6 {
        eprintln!("{}", usage(&args[0]));
        std::process::exit(1);
    }

    let root = PathBuf::from(&args[1]);
    let work_root = PathBuf::from(&args[2]);
    let table = args[3].clone();
    let input_file = PathBuf::from(&args[4]);

    let partition_by = match PartitionBy::parse(&args[5]) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("invalid partition_by {:?}: {e}", args[5]);
            std::process::exit(1);
        }
    };

    let workers = args
        .get(6)
        .map(|s| s.parse::<usize>())
        .transpose()
        .unwrap_or(None)
        .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4));

    let atomicity = args
        .get(7)
        .map(|s| {
            parse_atomicity(s).unwrap_or_else(|| {
                eprintln!("invalid atomicity {s:?}, expected SKIP_COL|SKIP_ROW|SKIP_ALL");
                std::process::exit(1);
            })
        })
        .unwrap_or_default();

    let mut importer = Importer::new(&root, &work_root, workers);
    importer.configure(ImportConfig {
        table: table.clone(),
        input_file,
        partition_by,
        delimiter: None,
        ts_column: None,
        ts_format: None,
        force_header: false,
        atomicity,
    });

    println!("importing into table {table:?} with {workers} workers...");
    match importer.run() {
        Ok(stats) => {
            println!("OK");
            println!("  imported_rows:      {}", stats.imported_rows);
            println!("  skipped_rows:       {}", stats.skipped_rows);
            println!("  partitions_attached: {}", stats.partitions_attached);
            println!("  active_workers:     {}", stats.active_workers);
        }
        Err(e) => {
            if let Some(phase) = e.phase() {
                eprintln!("FAILED in phase {phase}: {e}");
            } else {
                eprintln!("FAILED: {e}");
            }
            std::process::exit(1);
        }
    }
}
