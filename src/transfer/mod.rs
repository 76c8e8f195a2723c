//! Chunk transfer scheduling and progress reporting

mod progress;
mod scheduler;

pub use progress::{
    ChunkStats, LoggingObserver, NoopObserver, ProgressObserver, ThroughputTracker,
    TransferDirection, TransferEvent,
};
pub use scheduler::{ChunkJob, ChunkOutput, TransferScheduler};
