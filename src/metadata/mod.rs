//! Metadata store
//!
//! File and chunk records live in a schemaless document database that only
//! offers put / get / cursor-paginated fetch / delete. Backends implement the
//! primitives; pagination-following and path lookup are built on top.

mod memory;
mod remote;
mod types;

pub use memory::MemoryMetadataStore;
pub use remote::{BaseClient, RemoteMetadataStore};
pub use types::*;

use async_trait::async_trait;

use crate::error::Result;
use crate::util;

/// Trait for metadata backends
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Register a file; the store assigns the id
    async fn add_file(&self, name: &str, dir_path: &str, size: u64) -> Result<FileRecord>;

    /// Register one chunk of a file
    async fn add_chunk(&self, file_id: &str, chunk: NewChunk) -> Result<ChunkRecord>;

    /// Fetch a file record, `None` if absent
    async fn get_file(&self, id: &str) -> Result<Option<FileRecord>>;

    /// One page of files matching `query`, continuing after `last`
    async fn fetch_files(&self, query: &FileQuery, last: Option<&str>) -> Result<Page<FileRecord>>;

    /// One page of a file's chunks in server order, continuing after `last`
    async fn fetch_chunks(&self, file_id: &str, last: Option<&str>) -> Result<Page<ChunkRecord>>;

    async fn delete_file(&self, id: &str) -> Result<()>;

    async fn delete_chunk(&self, id: &str) -> Result<()>;

    /// All chunks of a file, sorted by index
    async fn get_chunks(&self, file_id: &str) -> Result<Vec<ChunkRecord>> {
        let mut chunks = Vec::new();
        let mut last: Option<String> = None;

        loop {
            let page = self.fetch_chunks(file_id, last.as_deref()).await?;
            chunks.extend(page.items);

            match page.last {
                Some(cursor) => last = Some(cursor),
                None => break,
            }
        }

        chunks.sort_by_key(|c| c.index);
        Ok(chunks)
    }

    /// All files matching `query`
    async fn list_files(&self, query: &FileQuery) -> Result<Vec<FileRecord>> {
        let mut files = Vec::new();
        let mut last: Option<String> = None;

        loop {
            let page = self.fetch_files(query, last.as_deref()).await?;
            files.extend(page.items);

            match page.last {
                Some(cursor) => last = Some(cursor),
                None => break,
            }
        }

        Ok(files)
    }

    /// Look a file up by virtual path; with duplicates the first match wins
    async fn get_file_from_path(&self, path: &str) -> Result<Option<FileRecord>> {
        let Some((dir_path, name)) = util::split_virtual_path(path) else {
            return Ok(None);
        };

        let query = FileQuery::new().with_dir(dir_path).with_name(name);
        let mut last: Option<String> = None;

        // Filtered pages may come back empty while a cursor remains
        loop {
            let page = self.fetch_files(&query, last.as_deref()).await?;
            if let Some(file) = page.items.into_iter().next() {
                return Ok(Some(file));
            }
            match page.last {
                Some(cursor) => last = Some(cursor),
                None => return Ok(None),
            }
        }
    }
}
