//! Metadata record types
//!
//! Field names on the wire follow the document layout already used by
//! existing stores: files carry `key`, `name`, `path`, `size`; chunks carry
//! `key`, `file`, `index`, `range`, `message_id`.

use serde::{Deserialize, Serialize};

use crate::chunk::ByteSpan;
use crate::util;

/// A stored file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    #[serde(rename = "key")]
    pub id: String,
    pub name: String,
    /// Virtual directory, `""` for the root
    #[serde(rename = "path")]
    pub dir_path: String,
    pub size: u64,
}

impl FileRecord {
    /// Virtual path: `dir_path + "/" + name`
    pub fn virtual_path(&self) -> String {
        util::join_virtual_path(&self.dir_path, &self.name)
    }
}

/// One encrypted chunk of a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    #[serde(rename = "key")]
    pub id: String,
    #[serde(rename = "file")]
    pub file_id: String,
    pub index: u32,
    pub range: ByteSpan,
    /// Reference into the blob store
    pub message_id: String,
}

/// Chunk registration data
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub index: u32,
    pub range: ByteSpan,
    pub message_id: String,
}

/// One page of a cursor-paginated fetch
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Present iff more pages remain
    pub last: Option<String>,
}

/// Filter for file listing and search
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FileQuery {
    #[serde(rename = "dir")]
    pub dir_path: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "prefix")]
    pub name_prefix: Option<String>,
}

impl FileQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dir(mut self, dir_path: impl Into<String>) -> Self {
        self.dir_path = Some(dir_path.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    pub fn matches(&self, file: &FileRecord) -> bool {
        self.dir_path.as_ref().map_or(true, |d| *d == file.dir_path)
            && self.name.as_ref().map_or(true, |n| *n == file.name)
            && self
                .name_prefix
                .as_ref()
                .map_or(true, |p| file.name.starts_with(p.as_str()))
    }
}
