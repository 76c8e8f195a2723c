//! Transfer progress events and observers

use std::sync::Mutex;
use std::time::Duration;

use crate::util::{format_duration, format_size};

/// Which way chunks are moving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Upload,
    Download,
}

/// Timing of one finished chunk job
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkStats {
    pub index: u32,
    pub bytes: u64,
    pub elapsed: Duration,
    /// Bytes per second for this chunk alone
    pub throughput: f64,
}

impl ChunkStats {
    pub fn new(index: u32, bytes: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let throughput = if secs > 0.0 { bytes as f64 / secs } else { 0.0 };
        Self {
            index,
            bytes,
            elapsed,
            throughput,
        }
    }
}

/// Progress event emitted by the scheduler
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    Start { chunk_count: usize },
    ChunkUpload { index: u32 },
    ChunkUploaded(ChunkStats),
    ChunkDownload { index: u32 },
    ChunkDownloaded(ChunkStats),
    End,
}

impl TransferEvent {
    pub(crate) fn chunk_started(direction: TransferDirection, index: u32) -> Self {
        match direction {
            TransferDirection::Upload => TransferEvent::ChunkUpload { index },
            TransferDirection::Download => TransferEvent::ChunkDownload { index },
        }
    }

    pub(crate) fn chunk_finished(direction: TransferDirection, stats: ChunkStats) -> Self {
        match direction {
            TransferDirection::Upload => TransferEvent::ChunkUploaded(stats),
            TransferDirection::Download => TransferEvent::ChunkDownloaded(stats),
        }
    }
}

/// Receives progress events; never affects the outcome of a transfer
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: &TransferEvent);
}

impl<F> ProgressObserver for F
where
    F: Fn(&TransferEvent) + Send + Sync,
{
    fn on_event(&self, event: &TransferEvent) {
        self(event)
    }
}

/// Observer that ignores everything
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_event(&self, _event: &TransferEvent) {}
}

/// Running average of per-chunk throughput
#[derive(Debug, Default, Clone)]
pub struct ThroughputTracker {
    chunks: u32,
    bytes: u64,
    throughput_sum: f64,
}

impl ThroughputTracker {
    /// Record a finished chunk and return the average throughput so far
    pub fn record(&mut self, stats: &ChunkStats) -> f64 {
        self.chunks += 1;
        self.bytes += stats.bytes;
        self.throughput_sum += stats.throughput;
        self.average()
    }

    pub fn average(&self) -> f64 {
        if self.chunks == 0 {
            0.0
        } else {
            self.throughput_sum / self.chunks as f64
        }
    }

    pub fn chunks(&self) -> u32 {
        self.chunks
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

/// Observer that reports progress through `tracing`
#[derive(Default)]
pub struct LoggingObserver {
    label: String,
    state: Mutex<LogState>,
}

#[derive(Default)]
struct LogState {
    chunk_count: usize,
    tracker: ThroughputTracker,
}

impl LoggingObserver {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: Mutex::new(LogState::default()),
        }
    }

    fn finished(&self, verb: &str, stats: &ChunkStats) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let average = state.tracker.record(stats) as u64;
        tracing::info!(
            "{} {}: chunk {} ({}) in {} [{}/{}, avg {}/s]",
            verb,
            self.label,
            stats.index,
            format_size(stats.bytes),
            format_duration(stats.elapsed),
            state.tracker.chunks(),
            state.chunk_count,
            format_size(average),
        );
    }
}

impl ProgressObserver for LoggingObserver {
    fn on_event(&self, event: &TransferEvent) {
        match event {
            TransferEvent::Start { chunk_count } => {
                if let Ok(mut state) = self.state.lock() {
                    *state = LogState {
                        chunk_count: *chunk_count,
                        ..Default::default()
                    };
                }
                tracing::info!("{}: {} chunk(s)", self.label, chunk_count);
            }
            TransferEvent::ChunkUpload { index } => {
                tracing::debug!("Uploading chunk {} of {}", index, self.label);
            }
            TransferEvent::ChunkDownload { index } => {
                tracing::debug!("Downloading chunk {} of {}", index, self.label);
            }
            TransferEvent::ChunkUploaded(stats) => self.finished("Uploaded", stats),
            TransferEvent::ChunkDownloaded(stats) => self.finished("Downloaded", stats),
            TransferEvent::End => {
                if let Ok(state) = self.state.lock() {
                    tracing::info!(
                        "{}: done, {} in {} chunk(s)",
                        self.label,
                        format_size(state.tracker.bytes()),
                        state.tracker.chunks()
                    );
                }
            }
        }
    }
}
