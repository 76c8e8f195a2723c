//! File manager
//!
//! Drives whole-file uploads and downloads through the scheduler, and serves
//! byte ranges by fetching only the chunks that overlap them.

use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufWriter};

use crate::chunk::{self, ByteSpan, ChunkSlice, ChunkSpan};
use crate::config::TransferConfig;
use crate::crypto::{self, EncryptionKey, OVERHEAD};
use crate::error::{Result, StoreError};
use crate::metadata::{ChunkRecord, FileQuery, FileRecord, MetadataStore, NewChunk};
use crate::storage::BlobStore;
use crate::transfer::{ChunkJob, ChunkOutput, ProgressObserver, TransferDirection, TransferScheduler};
use crate::util;

/// Stream of plaintext pieces, in file order
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>>>;

/// Coordinates the blob store, the metadata store and the cipher
#[derive(Clone)]
pub struct FileManager {
    blob: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    key: EncryptionKey,
    transfer: TransferConfig,
}

impl FileManager {
    pub fn new(
        blob: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        key: EncryptionKey,
        transfer: TransferConfig,
    ) -> Self {
        Self {
            blob,
            metadata,
            key,
            transfer,
        }
    }

    pub fn transfer_config(&self) -> TransferConfig {
        self.transfer
    }

    /// Fail if the chunk size is zero, or a full chunk would not fit in one
    /// blob once sealed
    pub fn check_chunk_size(&self) -> Result<()> {
        if self.transfer.chunk_size == 0 {
            return Err(StoreError::InvalidInput(
                "chunk size must be positive".to_string(),
            ));
        }
        if let Some(max) = self.blob.max_payload_size() {
            let sealed = self.transfer.chunk_size.saturating_add(OVERHEAD as u64);
            if sealed > max {
                return Err(StoreError::InvalidInput(format!(
                    "chunk size {} seals to {} bytes, above the blob store limit of {}",
                    self.transfer.chunk_size, sealed, max
                )));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    pub async fn get_file(&self, id: &str) -> Result<FileRecord> {
        self.metadata
            .get_file(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("file {}", id)))
    }

    pub async fn get_file_from_path(&self, path: &str) -> Result<FileRecord> {
        self.metadata
            .get_file_from_path(path)
            .await?
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    /// Resolve a virtual path (leading `/`) or a file id
    pub async fn find_file(&self, id_or_path: &str) -> Result<FileRecord> {
        if id_or_path.starts_with('/') {
            self.get_file_from_path(id_or_path).await
        } else {
            self.get_file(id_or_path).await
        }
    }

    /// Chunks of a file, sorted by index
    pub async fn get_chunks(&self, file_id: &str) -> Result<Vec<ChunkRecord>> {
        self.metadata.get_chunks(file_id).await
    }

    pub async fn list_files(&self, query: &FileQuery) -> Result<Vec<FileRecord>> {
        self.metadata.list_files(query).await
    }

    // ========================================================================
    // Upload
    // ========================================================================

    /// Upload a local file into virtual directory `dir`
    ///
    /// Fails with `AlreadyExists` if the virtual path is taken when the upload
    /// starts. The check and the file record write are separate calls, so two
    /// concurrent uploads of the same path can both get through.
    pub async fn upload_file(
        &self,
        local_path: &Path,
        dir: &str,
        observer: &dyn ProgressObserver,
    ) -> Result<FileRecord> {
        self.check_chunk_size()?;

        let stat = tokio::fs::metadata(local_path).await?;
        if !stat.is_file() {
            return Err(StoreError::InvalidInput(format!(
                "{} is not a regular file",
                local_path.display()
            )));
        }
        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                StoreError::InvalidInput(format!("{} has no usable file name", local_path.display()))
            })?;
        let dir = util::normalize_dir(dir);

        let virtual_path = util::join_virtual_path(&dir, name);
        if self.metadata.get_file_from_path(&virtual_path).await?.is_some() {
            return Err(StoreError::AlreadyExists(virtual_path));
        }

        let size = stat.len();
        let spans = if size == 0 {
            vec![ChunkSpan {
                index: 0,
                range: ByteSpan::new(0, 0),
            }]
        } else {
            chunk::plan(size, self.transfer.chunk_size)
        };

        let file = self.metadata.add_file(name, &dir, size).await?;
        tracing::info!(
            file_id = %file.id,
            path = %virtual_path,
            size,
            chunks = spans.len(),
            "Uploading file"
        );

        let indices: Vec<u32> = spans.iter().map(|s| s.index).collect();
        let mut job = UploadJob {
            manager: self,
            file: &file,
            source: local_path,
            spans: &spans,
        };

        if let Err(e) = TransferScheduler::new(self.transfer.upload_parallelism)
            .run(&mut job, &indices, observer)
            .await
        {
            tracing::warn!(file_id = %file.id, "Upload aborted, file left incomplete: {}", e);
            return Err(e);
        }

        Ok(file)
    }

    // ========================================================================
    // Download
    // ========================================================================

    /// Download a whole file into `dest`, replacing anything there
    pub async fn download_file(
        &self,
        file_id: &str,
        dest: &Path,
        observer: &dyn ProgressObserver,
    ) -> Result<FileRecord> {
        let file = self.get_file(file_id).await?;
        let chunks = self.metadata.get_chunks(file_id).await?;
        validate_chunks(&file, &chunks)?;

        tracing::info!(
            file_id = %file.id,
            dest = %dest.display(),
            chunks = chunks.len(),
            "Downloading file"
        );

        let indices: Vec<u32> = chunks.iter().map(|c| c.index).collect();
        let mut job = DownloadJob {
            manager: self,
            chunks: &chunks,
            writer: BufWriter::new(File::create(dest).await?),
            written: 0,
        };

        TransferScheduler::new(self.transfer.download_parallelism)
            .run(&mut job, &indices, observer)
            .await?;
        job.writer.flush().await?;

        if job.written != file.size {
            return Err(StoreError::InvariantViolation(format!(
                "wrote {} bytes for file {} of {} bytes",
                job.written, file.id, file.size
            )));
        }
        Ok(file)
    }

    /// Fetch one chunk and decrypt it in full
    pub async fn fetch_chunk(&self, chunk: &ChunkRecord) -> Result<Vec<u8>> {
        let context = |e: StoreError| e.in_chunk(chunk.index, Some(chunk.message_id.as_str()));

        let sealed = self.blob.get(&chunk.message_id).await.map_err(context)?;
        let key = self.key.clone();
        let plaintext = blocking(move || crypto::decrypt(&key, &sealed))
            .await
            .map_err(context)?;

        if plaintext.len() as u64 != chunk.range.len() {
            return Err(context(StoreError::InvariantViolation(format!(
                "decrypted {} bytes, range [{}, {}) needs {}",
                plaintext.len(),
                chunk.range.start,
                chunk.range.end,
                chunk.range.len()
            ))));
        }
        Ok(plaintext)
    }

    // ========================================================================
    // Range reads
    // ========================================================================

    /// Stream the plaintext of `[start, end)` of a file
    ///
    /// Up to `download_parallelism` chunks are fetched ahead; pieces are still
    /// yielded in file order.
    pub async fn read_range(&self, file: &FileRecord, start: u64, end: u64) -> Result<ChunkStream> {
        let chunks = self.metadata.get_chunks(&file.id).await?;
        validate_chunks(file, &chunks)?;

        let selected: Vec<(ChunkRecord, ByteSpan)> = chunk::resolve(&chunks, start, end)?
            .into_iter()
            .map(|slice| (slice.chunk.clone(), slice.inner))
            .collect();
        tracing::debug!(
            file_id = %file.id,
            start,
            end,
            chunks = selected.len(),
            "Serving range"
        );

        let manager = self.clone();
        let pieces = stream::iter(selected)
            .map(move |(chunk, inner)| {
                let manager = manager.clone();
                async move {
                    let plaintext = manager.fetch_chunk(&chunk).await?;
                    let slice = ChunkSlice {
                        chunk: &chunk,
                        inner,
                    };
                    Ok::<_, StoreError>(slice.trim(&plaintext)?.to_vec())
                }
            })
            .buffered(self.transfer.download_parallelism.max(1));

        Ok(pieces.boxed())
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Delete a file's blobs, then its chunk records, then the file record
    ///
    /// Any failed blob delete aborts before metadata is touched.
    pub async fn delete_file(&self, file_id: &str) -> Result<()> {
        let file = self.get_file(file_id).await?;
        let chunks = self.metadata.get_chunks(file_id).await?;
        if chunks.is_empty() {
            return Err(StoreError::InvariantViolation(format!(
                "file {} has no chunks",
                file.id
            )));
        }

        stream::iter(chunks.clone())
            .map(|chunk| {
                let blob = self.blob.clone();
                async move {
                    blob.delete(&chunk.message_id)
                        .await
                        .map_err(|e| e.in_chunk(chunk.index, Some(chunk.message_id.as_str())))
                }
            })
            .buffer_unordered(self.transfer.upload_parallelism.max(1))
            .try_collect::<Vec<()>>()
            .await?;

        for chunk in &chunks {
            self.metadata
                .delete_chunk(&chunk.id)
                .await
                .map_err(|e| e.in_chunk(chunk.index, Some(chunk.message_id.as_str())))?;
        }
        self.metadata.delete_file(&file.id).await?;

        tracing::info!(file_id = %file.id, path = %file.virtual_path(), "Deleted file");
        Ok(())
    }
}

/// Check that `chunks` (sorted by index) exactly partition the file
pub fn validate_chunks(file: &FileRecord, chunks: &[ChunkRecord]) -> Result<()> {
    if chunks.is_empty() {
        return Err(StoreError::InvariantViolation(format!(
            "file {} has no chunks",
            file.id
        )));
    }

    let mut expected_start = 0;
    for (position, chunk) in chunks.iter().enumerate() {
        if chunk.index as usize != position {
            return Err(StoreError::InvariantViolation(format!(
                "file {}: expected chunk {}, found {}",
                file.id, position, chunk.index
            )));
        }
        if chunk.range.start != expected_start || chunk.range.end < chunk.range.start {
            return Err(StoreError::InvariantViolation(format!(
                "file {}: chunk {} covers [{}, {}), expected start {}",
                file.id, chunk.index, chunk.range.start, chunk.range.end, expected_start
            )));
        }
        expected_start = chunk.range.end;
    }

    if expected_start != file.size {
        return Err(StoreError::InvariantViolation(format!(
            "file {}: chunks cover {} of {} bytes",
            file.id, expected_start, file.size
        )));
    }
    Ok(())
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
}

struct UploadJob<'a> {
    manager: &'a FileManager,
    file: &'a FileRecord,
    source: &'a Path,
    spans: &'a [ChunkSpan],
}

impl UploadJob<'_> {
    async fn read_span(&self, span: ByteSpan) -> Result<Vec<u8>> {
        let mut source = File::open(self.source).await?;
        source.seek(SeekFrom::Start(span.start)).await?;
        let mut buf = vec![0u8; span.len() as usize];
        source.read_exact(&mut buf).await?;
        Ok(buf)
    }
}

#[async_trait]
impl<'a> ChunkJob for UploadJob<'a> {
    type Output = ();

    fn direction(&self) -> TransferDirection {
        TransferDirection::Upload
    }

    async fn run(&self, index: u32) -> Result<(u64, ())> {
        let span = self
            .spans
            .get(index as usize)
            .ok_or_else(|| StoreError::InvariantViolation(format!("no plan for chunk {}", index)))?
            .range;

        let plaintext = self.read_span(span).await?;
        let key = self.manager.key.clone();
        let sealed = blocking(move || crypto::encrypt(&key, &plaintext)).await?;

        let name = format!("{}.chunk{}", self.file.name, index);
        let message_id = self.manager.blob.put(&name, sealed, span.len()).await?;

        self.manager
            .metadata
            .add_chunk(
                &self.file.id,
                NewChunk {
                    index,
                    range: span,
                    message_id: message_id.clone(),
                },
            )
            .await
            .map_err(|e| e.in_chunk(index, Some(message_id.as_str())))?;

        Ok((span.len(), ()))
    }
}

struct DownloadJob<'a> {
    manager: &'a FileManager,
    chunks: &'a [ChunkRecord],
    writer: BufWriter<File>,
    written: u64,
}

#[async_trait]
impl<'a> ChunkJob for DownloadJob<'a> {
    type Output = Vec<u8>;

    fn direction(&self) -> TransferDirection {
        TransferDirection::Download
    }

    async fn run(&self, index: u32) -> Result<(u64, Vec<u8>)> {
        let chunk = self
            .chunks
            .get(index as usize)
            .ok_or_else(|| StoreError::InvariantViolation(format!("no record for chunk {}", index)))?;
        let plaintext = self.manager.fetch_chunk(chunk).await?;
        Ok((plaintext.len() as u64, plaintext))
    }

    async fn commit(&mut self, batch: Vec<ChunkOutput<Vec<u8>>>) -> Result<()> {
        for output in batch {
            self.writer.write_all(&output.value).await?;
            self.written += output.bytes;
        }
        Ok(())
    }
}
