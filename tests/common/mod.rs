//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use distore::config::TransferConfig;
use distore::crypto::EncryptionKey;
use distore::metadata::MemoryMetadataStore;
use distore::storage::{BlobStore, MemoryBlobStore};
use distore::{FileManager, Result, StoreError};

pub const MIB: u64 = 1024 * 1024;

pub fn test_key() -> EncryptionKey {
    EncryptionKey::from_bytes([7u8; 32])
}

/// Deterministic pseudo-random bytes
pub fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut data = vec![0u8; len];
    StdRng::seed_from_u64(seed).fill_bytes(&mut data);
    data
}

pub fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

pub fn transfer(chunk_size: u64, parallelism: usize) -> TransferConfig {
    TransferConfig {
        chunk_size,
        upload_parallelism: parallelism,
        download_parallelism: parallelism,
    }
}

pub fn manager(
    blob: Arc<dyn BlobStore>,
    metadata: MemoryMetadataStore,
    config: TransferConfig,
) -> FileManager {
    FileManager::new(blob, Arc::new(metadata), test_key(), config)
}

/// Blob store that records concurrency and can delay or fail chunk calls
///
/// Delays are keyed on the chunk index parsed from the attachment name, so a
/// `reverse_width` of `w` makes later indices finish first inside each group
/// of `w` consecutive chunks.
#[derive(Default)]
pub struct InstrumentedBlobStore {
    pub inner: MemoryBlobStore,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    puts: AtomicUsize,
    gets: AtomicUsize,
    names: Mutex<HashMap<String, String>>,
    pub reverse_width: Option<u32>,
    pub fail_put_index: Option<u32>,
    pub fail_get_index: Option<u32>,
}

impl InstrumentedBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reversing(width: u32) -> Self {
        Self {
            reverse_width: Some(width),
            ..Default::default()
        }
    }

    /// Fail the put of chunk `index` with an HTTP 500
    pub fn failing_put(index: u32) -> Self {
        Self {
            fail_put_index: Some(index),
            ..Default::default()
        }
    }

    /// Fail the get of chunk `index` as if its tag did not verify
    pub fn failing_get(index: u32) -> Self {
        Self {
            fail_get_index: Some(index),
            ..Default::default()
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    fn chunk_index(name: &str) -> u32 {
        name.rsplit_once(".chunk")
            .and_then(|(_, index)| index.parse().ok())
            .unwrap_or(0)
    }

    fn delay(&self, index: u32) -> Duration {
        match self.reverse_width {
            Some(width) => Duration::from_millis(1 + (width - 1 - index % width) as u64 * 15),
            None => Duration::from_millis(5),
        }
    }

    async fn tracked<T>(&self, index: u32, call: impl std::future::Future<Output = T>) -> T {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay(index)).await;
        let result = call.await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl BlobStore for InstrumentedBlobStore {
    async fn put(&self, name: &str, payload: Vec<u8>, plaintext_size: u64) -> Result<String> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let index = Self::chunk_index(name);
        if self.fail_put_index == Some(index) {
            return Err(StoreError::UnexpectedRemoteResponse {
                service: "webhook",
                status: 500,
                body: "boom".to_string(),
            });
        }

        let reference = self
            .tracked(index, self.inner.put(name, payload, plaintext_size))
            .await?;
        self.names
            .lock()
            .unwrap()
            .insert(reference.clone(), name.to_string());
        Ok(reference)
    }

    async fn get(&self, reference: &str) -> Result<Vec<u8>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let index = self
            .names
            .lock()
            .unwrap()
            .get(reference)
            .map(|name| Self::chunk_index(name))
            .unwrap_or(0);
        if self.fail_get_index == Some(index) {
            return Err(StoreError::Authentication("injected".to_string()));
        }
        self.tracked(index, self.inner.get(reference)).await
    }

    async fn delete(&self, reference: &str) -> Result<()> {
        self.inner.delete(reference).await
    }
}
