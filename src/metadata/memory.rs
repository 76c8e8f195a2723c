//! In-process metadata store
//!
//! Keeps records in ordered maps and pages through them by key, the same
//! way the document database does, so pagination-following code paths are
//! exercised without a remote service.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;

use super::{ChunkRecord, FileQuery, FileRecord, MetadataStore, NewChunk, Page};

const DEFAULT_PAGE_SIZE: usize = 1000;

/// Metadata store held in memory
#[derive(Clone)]
pub struct MemoryMetadataStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    files: RwLock<BTreeMap<String, FileRecord>>,
    chunks: RwLock<BTreeMap<String, ChunkRecord>>,
    page_size: usize,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Create a store that returns at most `page_size` items per fetch
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                files: RwLock::new(BTreeMap::new()),
                chunks: RwLock::new(BTreeMap::new()),
                page_size: page_size.max(1),
            }),
        }
    }

    pub async fn file_count(&self) -> usize {
        self.inner.files.read().await.len()
    }

    pub async fn chunk_count(&self) -> usize {
        self.inner.chunks.read().await.len()
    }
}

impl Default for MemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Scan `map` after `last`, keep matches, stop at `page_size` scanned items
fn page_of<T: Clone>(
    map: &BTreeMap<String, T>,
    last: Option<&str>,
    page_size: usize,
    keep: impl Fn(&T) -> bool,
) -> Page<T> {
    let lower = match last {
        Some(key) => Bound::Excluded(key.to_string()),
        None => Bound::Unbounded,
    };

    // Like the remote store, the limit applies before filtering
    let scanned: Vec<(&String, &T)> = map
        .range((lower, Bound::Unbounded))
        .take(page_size + 1)
        .collect();
    let more = scanned.len() > page_size;
    let scanned = &scanned[..scanned.len().min(page_size)];

    Page {
        items: scanned
            .iter()
            .filter(|(_, v)| keep(v))
            .map(|(_, v)| (*v).clone())
            .collect(),
        last: if more {
            scanned.last().map(|(k, _)| (*k).clone())
        } else {
            None
        },
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn add_file(&self, name: &str, dir_path: &str, size: u64) -> Result<FileRecord> {
        let record = FileRecord {
            id: Uuid::new_v4().simple().to_string(),
            name: name.to_string(),
            dir_path: dir_path.to_string(),
            size,
        };
        self.inner
            .files
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn add_chunk(&self, file_id: &str, chunk: NewChunk) -> Result<ChunkRecord> {
        let record = ChunkRecord {
            id: Uuid::new_v4().simple().to_string(),
            file_id: file_id.to_string(),
            index: chunk.index,
            range: chunk.range,
            message_id: chunk.message_id,
        };
        self.inner
            .chunks
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get_file(&self, id: &str) -> Result<Option<FileRecord>> {
        Ok(self.inner.files.read().await.get(id).cloned())
    }

    async fn fetch_files(&self, query: &FileQuery, last: Option<&str>) -> Result<Page<FileRecord>> {
        let files = self.inner.files.read().await;
        Ok(page_of(&files, last, self.inner.page_size, |f| query.matches(f)))
    }

    async fn fetch_chunks(&self, file_id: &str, last: Option<&str>) -> Result<Page<ChunkRecord>> {
        let chunks = self.inner.chunks.read().await;
        Ok(page_of(&chunks, last, self.inner.page_size, |c| {
            c.file_id == file_id
        }))
    }

    async fn delete_file(&self, id: &str) -> Result<()> {
        self.inner.files.write().await.remove(id);
        Ok(())
    }

    async fn delete_chunk(&self, id: &str) -> Result<()> {
        self.inner.chunks.write().await.remove(id);
        Ok(())
    }
}
