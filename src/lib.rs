//! Distore
//!
//! An encrypted, chunked file store. File contents are split into chunks,
//! sealed with AES-256-GCM and posted as webhook attachments; file and chunk
//! records live in a document database. Files can be downloaded whole or
//! served over HTTP by byte range.
//!
//! # Modules
//!
//! - `chunk`: chunk planning and byte-range resolution
//! - `crypto`: per-chunk authenticated encryption
//! - `storage`: blob stores holding the sealed chunks
//! - `metadata`: file and chunk records
//! - `transfer`: bounded-parallelism chunk scheduling and progress events
//! - `manager`: upload, download, range reads and deletion
//! - `routes`: the HTTP surface

pub mod chunk;
pub mod config;
pub mod crypto;
pub mod error;
pub mod manager;
pub mod metadata;
pub mod routes;
pub mod state;
pub mod storage;
pub mod transfer;
pub mod util;

pub use config::Config;
pub use error::{AppError, Result, StoreError};
pub use manager::FileManager;
pub use state::AppState;
