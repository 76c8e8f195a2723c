//! Batch-barrier chunk scheduler
//!
//! Jobs are admitted `parallelism` at a time. A batch is awaited in full,
//! sorted by chunk index and committed before the next batch is admitted, so
//! commit order always follows chunk order even when jobs inside a batch
//! finish out of order.

use std::time::Instant;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};

use crate::error::{Result, StoreError};

use super::progress::{ChunkStats, ProgressObserver, TransferDirection, TransferEvent};

/// Result of one finished chunk job
#[derive(Debug)]
pub struct ChunkOutput<T> {
    pub index: u32,
    /// Plaintext bytes moved by the job
    pub bytes: u64,
    pub value: T,
}

/// The per-chunk work of one transfer
#[async_trait]
pub trait ChunkJob: Send + Sync {
    type Output: Send;

    fn direction(&self) -> TransferDirection;

    /// Move one chunk, returning the plaintext byte count and a value
    async fn run(&self, index: u32) -> Result<(u64, Self::Output)>;

    /// Consume a finished batch, sorted by index
    async fn commit(&mut self, _batch: Vec<ChunkOutput<Self::Output>>) -> Result<()> {
        Ok(())
    }
}

/// Runs chunk jobs with bounded parallelism
#[derive(Debug, Clone, Copy)]
pub struct TransferScheduler {
    parallelism: usize,
}

impl TransferScheduler {
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism: parallelism.max(1),
        }
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Run `job` for every index in `indices`
    ///
    /// The first failing chunk aborts its batch; its siblings are dropped and
    /// no later batch is admitted. Batches already committed stay committed.
    pub async fn run<J: ChunkJob>(
        &self,
        job: &mut J,
        indices: &[u32],
        observer: &dyn ProgressObserver,
    ) -> Result<()> {
        let direction = job.direction();
        let total = indices.len();
        let mut completed = 0usize;

        observer.on_event(&TransferEvent::Start { chunk_count: total });

        for batch in indices.chunks(self.parallelism) {
            let mut finished = Vec::with_capacity(batch.len());
            {
                let job: &J = job;
                let mut in_flight = FuturesUnordered::new();
                for &index in batch {
                    observer.on_event(&TransferEvent::chunk_started(direction, index));
                    in_flight.push(async move {
                        let started = Instant::now();
                        let result = job.run(index).await;
                        (index, started.elapsed(), result)
                    });
                }

                while let Some((index, elapsed, result)) = in_flight.next().await {
                    let (bytes, value) = result.map_err(|e| e.in_chunk(index, None))?;
                    completed += 1;
                    observer.on_event(&TransferEvent::chunk_finished(
                        direction,
                        ChunkStats::new(index, bytes, elapsed),
                    ));
                    finished.push(ChunkOutput { index, bytes, value });
                }
            }

            finished.sort_by_key(|output| output.index);
            job.commit(finished).await?;
        }

        if completed != total {
            return Err(StoreError::InvariantViolation(format!(
                "{} of {} chunk jobs completed",
                completed, total
            )));
        }

        observer.on_event(&TransferEvent::End);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::NoopObserver;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Later indices inside a batch finish first
    struct ReversingJob {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        fail_on: Option<u32>,
        committed: Vec<u32>,
        runs: Mutex<Vec<u32>>,
    }

    impl ReversingJob {
        fn new(fail_on: Option<u32>) -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                fail_on,
                committed: Vec::new(),
                runs: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChunkJob for ReversingJob {
        type Output = u32;

        fn direction(&self) -> TransferDirection {
            TransferDirection::Download
        }

        async fn run(&self, index: u32) -> Result<(u64, u32)> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.runs.lock().unwrap().push(index);

            let delay = 40 - (index % 4) as u64 * 10;
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_on == Some(index) {
                return Err(StoreError::Authentication("bad tag".into()));
            }
            Ok((index as u64 + 1, index))
        }

        async fn commit(&mut self, batch: Vec<ChunkOutput<u32>>) -> Result<()> {
            self.committed.extend(batch.into_iter().map(|o| o.value));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_commits_in_index_order_within_bound() {
        let mut job = ReversingJob::new(None);
        let indices: Vec<u32> = (0..10).collect();

        TransferScheduler::new(4)
            .run(&mut job, &indices, &NoopObserver)
            .await
            .unwrap();

        assert_eq!(job.committed, indices);
        assert!(job.peak.load(Ordering::SeqCst) <= 4);
        assert_eq!(job.runs.lock().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_batches() {
        let mut job = ReversingJob::new(Some(5));
        let indices: Vec<u32> = (0..12).collect();

        let err = TransferScheduler::new(3)
            .run(&mut job, &indices, &NoopObserver)
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Chunk { index: 5, .. }));
        assert!(matches!(err.root(), StoreError::Authentication(_)));
        // Batches [0..3) and [3..6) were admitted; only the first committed
        assert_eq!(job.committed, vec![0, 1, 2]);
        assert!(job.runs.lock().unwrap().iter().all(|&i| i < 6));
    }

    #[tokio::test]
    async fn test_event_sequence() {
        let events = Mutex::new(Vec::new());
        let observer = |e: &TransferEvent| events.lock().unwrap().push(e.clone());
        let mut job = ReversingJob::new(None);

        TransferScheduler::new(2)
            .run(&mut job, &[0, 1, 2], &observer)
            .await
            .unwrap();

        let events = events.into_inner().unwrap();
        assert_eq!(events.first(), Some(&TransferEvent::Start { chunk_count: 3 }));
        assert_eq!(events.last(), Some(&TransferEvent::End));

        let started: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                TransferEvent::ChunkDownload { index } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec![0, 1, 2]);

        let mut finished: Vec<(u32, u64)> = events
            .iter()
            .filter_map(|e| match e {
                TransferEvent::ChunkDownloaded(stats) => Some((stats.index, stats.bytes)),
                _ => None,
            })
            .collect();
        // Within the first batch, index 1 finishes before index 0
        assert_eq!(finished[0].0, 1);
        finished.sort();
        assert_eq!(finished, vec![(0, 1), (1, 2), (2, 3)]);
    }

    #[tokio::test]
    async fn test_empty_job_list() {
        let mut job = ReversingJob::new(None);
        TransferScheduler::new(3)
            .run(&mut job, &[], &NoopObserver)
            .await
            .unwrap();
        assert!(job.committed.is_empty());
    }
}
