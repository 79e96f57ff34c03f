//! Turns a file into disjoint byte ranges each starting on a true record
//! boundary.

use std::path::Path;
use std::thread;

use crate::boundary::{scan_chunk, ChunkStats};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkBoundary {
    pub offset: u64,
    /// 1-based line number of the first record starting at `offset`.
    pub line_number: u64,
}

/// Candidate chunk ranges used only to drive the parallel `scan_chunk`
/// pass; the boundaries returned by `split_chunks` are the *true* record
/// boundaries folded out of their stats.
fn candidate_ranges(file_len: u64, workers: usize, min_chunk_size: u64) -> Vec<(u64, u64)> {
    let workers = workers.max(1);
    let target = (file_len + workers as u64 - 1) / workers as u64;
    let chunk_size = target.max(min_chunk_size).max(1);
    let n = ((file_len + chunk_size - 1) / chunk_size).max(1);

    let mut ranges = Vec::with_capacity(n as usize);
    let mut lo = 0u64;
    for _ in 0..n {
        let hi = (lo + chunk_size).min(file_len);
        ranges.push((lo, hi));
        lo = hi;
        if lo >= file_len {
            break;
        }
    }
    ranges
}

/// Runs the boundary scanner on each candidate range in parallel, then
/// folds the results into true record boundaries.
pub fn split_chunks(
    path: &Path,
    file_len: u64,
    workers: usize,
    min_chunk_size: u64,
    buffer_size: usize,
) -> Result<Vec<ChunkBoundary>> {
    if file_len == 0 {
        return Ok(vec![]);
    }

    let ranges = candidate_ranges(file_len, workers, min_chunk_size);
    let n = ranges.len();

    let stats: Vec<ChunkStats> = thread::scope(|scope| -> Result<Vec<ChunkStats>> {
        let handles: Vec<_> = ranges
            .iter()
            .map(|&(lo, hi)| scope.spawn(move || scan_chunk(path, lo, hi, buffer_size)))
            .collect();
        let mut out = Vec::with_capacity(n);
        for h in handles {
            out.push(h.join().expect("boundary scan thread panicked")?);
        }
        Ok(out)
    })?;

    let mut boundaries = vec![ChunkBoundary {
        offset: 0,
        line_number: 1,
    }];

    let mut q = stats[0].quote_count;
    let mut total_lines = stats[0].nl_even_count + 1;

    for i in 1..n {
        let chunk = &stats[i];
        let odd = q % 2 == 1;
        let start = if odd {
            chunk.first_nl_odd_offset
        } else {
            chunk.first_nl_even_offset
        };
        let matching_nl_count = if odd {
            chunk.nl_odd_count
        } else {
            chunk.nl_even_count
        };

        if start >= 0 {
            boundaries.push(ChunkBoundary {
                offset: start as u64,
                line_number: total_lines,
            });
        }
        // else: this chunk's candidate range is entirely inside quoted
        // text (or one very long line) and merges into the previous one.

        q += chunk.quote_count;
        total_lines += matching_nl_count;
    }

    boundaries.push(ChunkBoundary {
        offset: file_len,
        line_number: total_lines,
    });

    Ok(boundaries)
}

/// Pairs consecutive boundaries into `[lo, hi)` ranges with each range's
/// starting line number, ready to hand to the partition indexer.
pub fn chunk_ranges(boundaries: &[ChunkBoundary]) -> Vec<(u64, u64, u64)> {
    boundaries
        .windows(2)
        .map(|w| (w[0].offset, w[1].offset, w[0].line_number))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_tmp(content: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn single_worker_yields_one_range_spanning_whole_file() {
        let content = b"a,b\nc,d\ne,f\n";
        let f = write_tmp(content);
        let boundaries =
            split_chunks(f.path(), content.len() as u64, 1, 1, 4096).unwrap();
        let ranges = chunk_ranges(&boundaries);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0], (0, content.len() as u64, 1));
    }

    #[test]
    fn quoted_newline_spanning_a_would_be_boundary_merges_chunks() {
        // Force small chunks so a boundary candidate lands inside the
        // quoted field; it must merge left rather than split mid-field.
        let mut content = Vec::new();
        content.extend_from_slice(b"a,b\n");
        content.extend_from_slice(b"c,\"quoted\nvalue\"\n");
        content.extend_from_slice(b"e,f\n");
        let f = write_tmp(&content);

        let boundaries =
            split_chunks(f.path(), content.len() as u64, 4, 4, 4096).unwrap();
        let ranges = chunk_ranges(&boundaries);

        // every range must start at a true record boundary: offset 0, 4, or 21
        let valid_starts = [0u64, 4, 21];
        for (lo, _hi, _line) in &ranges {
            assert!(valid_starts.contains(lo), "unexpected split at {lo}");
        }
    }

    #[test]
    fn empty_file_yields_no_ranges() {
        let f = write_tmp(b"");
        let boundaries = split_chunks(f.path(), 0, 4, 64, 4096).unwrap();
        assert!(boundaries.is_empty());
    }
}
