//! Chunk planning
//!
//! Upload and range reads must agree on chunk boundaries without looking at
//! the source file again, so the plan is a pure function of the file size
//! and the chunk size.

use serde::{Deserialize, Serialize};

/// Default chunk size: 24 MiB (fits a 25 MiB attachment after encryption)
pub const DEFAULT_CHUNK_SIZE: u64 = 24 * 1024 * 1024;

/// Half-open byte range `[start, end)` of the plaintext file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteSpan {
    pub start: u64,
    pub end: u64,
}

impl ByteSpan {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One planned chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub index: u32,
    pub range: ByteSpan,
}

/// Number of chunks needed for `file_size` bytes: `ceil(file_size / chunk_size)`
pub fn chunk_count(file_size: u64, chunk_size: u64) -> u64 {
    assert!(chunk_size > 0, "chunk size must be positive");
    file_size.div_ceil(chunk_size)
}

/// Split `[0, file_size)` into consecutive chunks of at most `chunk_size` bytes
///
/// # Panics
///
/// Panics if `chunk_size` is zero or the plan would need more than `u32::MAX`
/// chunks.
pub fn plan(file_size: u64, chunk_size: u64) -> Vec<ChunkSpan> {
    let count = chunk_count(file_size, chunk_size);
    assert!(count <= u32::MAX as u64, "too many chunks for one file");

    (0..count)
        .map(|i| {
            let start = i * chunk_size;
            let end = (start + chunk_size).min(file_size);
            ChunkSpan {
                index: i as u32,
                range: ByteSpan { start, end },
            }
        })
        .collect()
}
