//! Blob storage
//!
//! Encrypted chunk payloads are handed to a remote host that returns an
//! opaque reference (the webhook host's message id) used to fetch or delete
//! them later.

mod memory;
mod webhook;

pub use memory::MemoryBlobStore;
pub use webhook::WebhookBlobStore;

use async_trait::async_trait;

use crate::error::Result;

/// Trait for blob storage backends
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store one payload under an attachment `name`, returning its reference
    ///
    /// `plaintext_size` is recorded alongside the attachment for humans
    /// browsing the host; it is never read back.
    async fn put(&self, name: &str, payload: Vec<u8>, plaintext_size: u64) -> Result<String>;

    /// Fetch the payload stored under `reference`
    async fn get(&self, reference: &str) -> Result<Vec<u8>>;

    /// Remove the payload stored under `reference`
    async fn delete(&self, reference: &str) -> Result<()>;

    /// Largest payload the host accepts, if it has a limit
    fn max_payload_size(&self) -> Option<u64> {
        None
    }
}
