//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::manager::FileManager;
use crate::metadata::RemoteMetadataStore;
use crate::storage::WebhookBlobStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    manager: FileManager,
}

impl AppState {
    pub fn new(manager: FileManager) -> Self {
        Self {
            inner: Arc::new(AppStateInner { manager }),
        }
    }

    /// Wire the webhook host and the document database from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let manager = FileManager::new(
            Arc::new(WebhookBlobStore::new(&config.webhook)),
            Arc::new(RemoteMetadataStore::new(&config.database)),
            config.encryption_key.clone(),
            config.transfer,
        );
        manager.check_chunk_size()?;
        Ok(Self::new(manager))
    }

    pub fn manager(&self) -> &FileManager {
        &self.inner.manager
    }
}
