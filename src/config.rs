//! Configuration management for Distore
//!
//! Everything is read once from the environment (optionally seeded from a
//! `.env` file by the binary). The webhook URL, the database key and the
//! encryption key are required; the process refuses to start without them.

use std::env;

use serde::Deserialize;
use thiserror::Error;

use crate::chunk::DEFAULT_CHUNK_SIZE;
use crate::crypto::EncryptionKey;

/// Default attachment ceiling of the webhook host: 25 MiB
pub const DEFAULT_MAX_ATTACHMENT_SIZE: u64 = 25 * 1024 * 1024;

/// Default number of chunk jobs in flight per transfer
pub const DEFAULT_PARALLELISM: usize = 3;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub webhook: WebhookConfig,
    pub database: DatabaseConfig,
    pub transfer: TransferConfig,
    pub encryption_key: EncryptionKey,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    pub max_attachment_size: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub endpoint: String,
    pub api_key: String,
    pub files_base: String,
    pub chunks_base: String,
    pub page_size: usize,
}

impl DatabaseConfig {
    /// Project id encoded in the collection key (the part before the first `_`)
    pub fn project_id(&self) -> &str {
        self.api_key.split('_').next().unwrap_or_default()
    }
}

/// Chunking and scheduling parameters
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TransferConfig {
    pub chunk_size: u64,
    pub upload_parallelism: usize,
    pub download_parallelism: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        TransferConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            upload_parallelism: DEFAULT_PARALLELISM,
            download_parallelism: DEFAULT_PARALLELISM,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |var: &'static str| -> Result<String, ConfigError> {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(var))
        };
        let optional = |var: &str, default: &str| -> String {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let encryption_key = EncryptionKey::from_hex(&required("DISTORE_ENCRYPTION_KEY")?)
            .map_err(|e| ConfigError::Invalid {
                var: "DISTORE_ENCRYPTION_KEY",
                reason: e.to_string(),
            })?;

        let database = DatabaseConfig {
            endpoint: optional("DISTORE_DB_ENDPOINT", "https://database.deta.sh/v1")
                .trim_end_matches('/')
                .to_string(),
            api_key: required("DISTORE_DB_KEY")?,
            files_base: optional("DISTORE_FILES_BASE", "files"),
            chunks_base: optional("DISTORE_CHUNKS_BASE", "file_chunks"),
            page_size: parse_var(&lookup, "DISTORE_PAGE_SIZE", 1000)?,
        };
        if !database.api_key.contains('_') {
            return Err(ConfigError::Invalid {
                var: "DISTORE_DB_KEY",
                reason: "expected <project>_<secret>".to_string(),
            });
        }

        let transfer = TransferConfig {
            chunk_size: parse_var(&lookup, "DISTORE_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            upload_parallelism: parse_var(&lookup, "DISTORE_UPLOAD_PARALLELISM", DEFAULT_PARALLELISM)?,
            download_parallelism: parse_var(
                &lookup,
                "DISTORE_DOWNLOAD_PARALLELISM",
                DEFAULT_PARALLELISM,
            )?,
        };
        if transfer.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                var: "DISTORE_CHUNK_SIZE",
                reason: "must be greater than zero".to_string(),
            });
        }
        if transfer.upload_parallelism == 0 || transfer.download_parallelism == 0 {
            return Err(ConfigError::Invalid {
                var: "DISTORE_*_PARALLELISM",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Config {
            server: ServerConfig {
                host: optional("SERVER_HOST", "0.0.0.0"),
                port: parse_var(&lookup, "SERVER_PORT", 3000)?,
            },
            webhook: WebhookConfig {
                url: required("DISTORE_WEBHOOK_URL")?
                    .trim_end_matches('/')
                    .to_string(),
                max_attachment_size: parse_var(
                    &lookup,
                    "DISTORE_MAX_ATTACHMENT_SIZE",
                    DEFAULT_MAX_ATTACHMENT_SIZE,
                )?,
            },
            database,
            transfer,
            encryption_key,
        })
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var).filter(|v| !v.trim().is_empty()) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
    }
}
