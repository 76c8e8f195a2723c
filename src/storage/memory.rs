//! In-process blob store

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};

use super::BlobStore;

/// Blob store held in memory, with optional size ceiling
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    blobs: RwLock<HashMap<String, StoredBlob>>,
    next_id: AtomicU64,
    max_payload_size: Option<u64>,
}

#[derive(Clone)]
struct StoredBlob {
    name: String,
    payload: Vec<u8>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject payloads larger than `max` bytes, like the webhook host does
    pub fn with_max_payload_size(max: u64) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                max_payload_size: Some(max),
                ..Default::default()
            }),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Attachment names currently stored, sorted
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .blobs
            .read()
            .await
            .values()
            .map(|b| b.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Overwrite a stored payload in place
    pub async fn replace(&self, reference: &str, payload: Vec<u8>) -> Result<()> {
        let mut blobs = self.inner.blobs.write().await;
        let blob = blobs
            .get_mut(reference)
            .ok_or_else(|| StoreError::NotFound(format!("message {}", reference)))?;
        blob.payload = payload;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, name: &str, payload: Vec<u8>, _plaintext_size: u64) -> Result<String> {
        if let Some(max) = self.inner.max_payload_size {
            if payload.len() as u64 > max {
                return Err(StoreError::UnexpectedRemoteResponse {
                    service: "memory blob store",
                    status: 413,
                    body: format!("payload of {} bytes exceeds {}", payload.len(), max),
                });
            }
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        self.inner.blobs.write().await.insert(
            id.clone(),
            StoredBlob {
                name: name.to_string(),
                payload,
            },
        );
        Ok(id)
    }

    async fn get(&self, reference: &str) -> Result<Vec<u8>> {
        self.inner
            .blobs
            .read()
            .await
            .get(reference)
            .map(|b| b.payload.clone())
            .ok_or_else(|| StoreError::NotFound(format!("message {}", reference)))
    }

    async fn delete(&self, reference: &str) -> Result<()> {
        self.inner
            .blobs
            .write()
            .await
            .remove(reference)
            .map(|_| ())
            .ok_or_else(|| StoreError::UnexpectedRemoteResponse {
                service: "memory blob store",
                status: 404,
                body: format!("no message {}", reference),
            })
    }

    fn max_payload_size(&self) -> Option<u64> {
        self.inner.max_payload_size
    }
}
