//! Chunk planning and byte-range resolution

pub mod planner;
pub mod range;

pub use planner::{chunk_count, plan, ByteSpan, ChunkSpan, DEFAULT_CHUNK_SIZE};
pub use range::{file_size, parse_range_header, resolve, ChunkSlice};
