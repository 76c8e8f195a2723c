//! Byte-range resolution over a file's chunk list
//!
//! A chunk is sealed with a single AEAD tag, so it can only be decrypted as a
//! whole. Serving `[start, end)` therefore means fetching every chunk that
//! overlaps the window and trimming the first and last ones.

use crate::error::{Result, StoreError};
use crate::metadata::ChunkRecord;

use super::planner::ByteSpan;

/// A selected chunk and the part of its plaintext inside the requested window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSlice<'a> {
    pub chunk: &'a ChunkRecord,
    /// Offsets relative to the start of the chunk's plaintext
    pub inner: ByteSpan,
}

impl ChunkSlice<'_> {
    /// Cut the window out of the chunk's decrypted bytes
    pub fn trim<'b>(&self, plaintext: &'b [u8]) -> Result<&'b [u8]> {
        let (start, end) = (self.inner.start as usize, self.inner.end as usize);
        plaintext.get(start..end).ok_or_else(|| {
            StoreError::InvariantViolation(format!(
                "chunk {} decrypted to {} bytes, window needs [{}, {})",
                self.chunk.index,
                plaintext.len(),
                start,
                end
            ))
        })
    }
}

/// File size implied by an index-ordered chunk list
pub fn file_size(chunks: &[ChunkRecord]) -> u64 {
    chunks.last().map(|c| c.range.end).unwrap_or(0)
}

/// Select the chunks overlapping `[start, end)` and their inner windows
///
/// `chunks` must be sorted by index. Fails with `RangeNotSatisfiable` when
/// the window starts at or past the end of the file, ends past it, or is
/// inverted.
pub fn resolve(chunks: &[ChunkRecord], start: u64, end: u64) -> Result<Vec<ChunkSlice<'_>>> {
    let size = file_size(chunks);
    if start >= size || end > size || end < start {
        return Err(StoreError::RangeNotSatisfiable { start, end, size });
    }

    Ok(chunks
        .iter()
        .filter(|c| c.range.start < end && c.range.end > start)
        .map(|chunk| ChunkSlice {
            chunk,
            inner: ByteSpan {
                start: start.saturating_sub(chunk.range.start),
                end: chunk.range.end.min(end) - chunk.range.start,
            },
        })
        .collect())
}

/// Interpret an HTTP `Range` header against a file of `size` bytes
///
/// Returns the half-open window to serve, `None` when the header is not a
/// well-formed byte range (the whole file is served instead), or
/// `RangeNotSatisfiable`. Only the first range of a multi-range request is
/// honoured.
pub fn parse_range_header(value: &str, size: u64) -> Result<Option<ByteSpan>> {
    let unsatisfiable = |start: u64, end: u64| StoreError::RangeNotSatisfiable { start, end, size };

    let Some((unit, specs)) = value.trim().split_once('=') else {
        return Ok(None);
    };
    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return Ok(None);
    }
    let spec = specs.split(',').next().unwrap_or_default().trim();
    let Some((first, last)) = spec.split_once('-') else {
        return Ok(None);
    };
    let (first, last) = (first.trim(), last.trim());

    let parse = |s: &str| s.parse::<u64>().ok();

    match (first.is_empty(), last.is_empty()) {
        // bytes=-N: the final N bytes
        (true, false) => {
            let Some(suffix) = parse(last) else {
                return Ok(None);
            };
            if suffix == 0 || size == 0 {
                return Err(unsatisfiable(size, size));
            }
            Ok(Some(ByteSpan::new(size.saturating_sub(suffix), size)))
        }
        // bytes=A-
        (false, true) => {
            let Some(start) = parse(first) else {
                return Ok(None);
            };
            if start >= size {
                return Err(unsatisfiable(start, size));
            }
            Ok(Some(ByteSpan::new(start, size)))
        }
        // bytes=A-B, B inclusive
        (false, false) => {
            let (Some(start), Some(last)) = (parse(first), parse(last)) else {
                return Ok(None);
            };
            if last < start {
                return Ok(None);
            }
            if start >= size {
                return Err(unsatisfiable(start, last.saturating_add(1)));
            }
            Ok(Some(ByteSpan::new(start, last.min(size - 1) + 1)))
        }
        (true, true) => Ok(None),
    }
}
