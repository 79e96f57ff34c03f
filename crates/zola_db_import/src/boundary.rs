//! Quote-parity scan used to locate true record boundaries inside an
//! arbitrary byte range without reading from the start of the file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{ImportError, Result};

pub const QUOTE: u8 = b'"';
pub const NEWLINE: u8 = b'\n';

/// Per-chunk quote/newline statistics. "Even"/"odd" refers to the parity
/// of the running quote count at the byte immediately after the newline —
/// a chunk that starts partway through a quoted field has unknown parity
/// until folded against the chunks before it (see `chunker`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkStats {
    pub quote_count: u64,
    pub nl_even_count: u64,
    pub nl_odd_count: u64,
    /// Absolute file offset of the byte following the first newline whose
    /// parity is even, or `-1` if none occurred in the range.
    pub first_nl_even_offset: i64,
    /// Same, for odd parity.
    pub first_nl_odd_offset: i64,
}

/// Streams `[lo, hi)` of `path` through a bounded buffer and computes its
/// `ChunkStats`. Never reads outside the given range.
pub fn scan_chunk(path: &Path, lo: u64, hi: u64, buffer_size: usize) -> Result<ChunkStats> {
    let mut file = File::open(path).map_err(|e| ImportError::io(path, e))?;
    file.seek(SeekFrom::Start(lo))
        .map_err(|e| ImportError::io(path, e))?;

    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut remaining = hi.saturating_sub(lo);
    let mut pos = lo;

    let mut quote_count = 0u64;
    let mut nl_even_count = 0u64;
    let mut nl_odd_count = 0u64;
    let mut first_nl_even_offset = -1i64;
    let mut first_nl_odd_offset = -1i64;

    while remaining > 0 {
        let want = buf.len().min(remaining as usize);
        let n = file
            .read(&mut buf[..want])
            .map_err(|e| ImportError::io(path, e))?;
        if n == 0 {
            break;
        }
        for &b in &buf[..n] {
            pos += 1;
            if b == QUOTE {
                quote_count += 1;
            } else if b == NEWLINE {
                if quote_count % 2 == 0 {
                    nl_even_count += 1;
                    if first_nl_even_offset < 0 {
                        first_nl_even_offset = pos as i64;
                    }
                } else {
                    nl_odd_count += 1;
                    if first_nl_odd_offset < 0 {
                        first_nl_odd_offset = pos as i64;
                    }
                }
            }
        }
        remaining -= n as u64;
    }

    Ok(ChunkStats {
        quote_count,
        nl_even_count,
        nl_odd_count,
        first_nl_even_offset,
        first_nl_odd_offset,
    })
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
    fn unquoted_lines_are_all_even_parity() {
        let f = write_tmp(b"a,b\nc,d\ne,f\n");
        let stats = scan_chunk(f.path(), 0, 12, 4096).unwrap();
        assert_eq!(stats.quote_count, 0);
        assert_eq!(stats.nl_even_count, 3);
        assert_eq!(stats.nl_odd_count, 0);
        assert_eq!(stats.first_nl_even_offset, 4);
        assert_eq!(stats.first_nl_odd_offset, -1);
    }

    #[test]
    fn newline_inside_quotes_is_odd_parity() {
        let content = b"a,\"b\nc\",d\ne,f\n";
        let f = write_tmp(content);
        let stats = scan_chunk(f.path(), 0, content.len() as u64, 4096).unwrap();
        assert_eq!(stats.quote_count, 2);
        // The newline inside the quoted field follows one quote (odd parity).
        assert_eq!(stats.nl_odd_count, 1);
        assert_eq!(stats.nl_even_count, 2);
    }

    #[test]
    fn respects_range_bounds() {
        let content = b"aaaa\nbbbb\ncccc\n";
        let f = write_tmp(content);
        let stats = scan_chunk(f.path(), 5, 10, 4096).unwrap();
        assert_eq!(stats.nl_even_count, 1);
        assert_eq!(stats.first_nl_even_offset, 10);
    }
}
