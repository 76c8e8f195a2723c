//! Document-database metadata backend
//!
//! Talks to a Deta-Base-compatible HTTP API: one collection ("base") for file
//! records, one for chunk records.
//!
//! - `PUT    {endpoint}/{project}/{base}/items`       body `{"items": [..]}`
//! - `GET    {endpoint}/{project}/{base}/items/{key}` 404 when absent
//! - `POST   {endpoint}/{project}/{base}/query`       body `{"query": [..], "limit", "last"}`
//! - `DELETE {endpoint}/{project}/{base}/items/{key}`

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::{Result, StoreError};

use super::{ChunkRecord, FileQuery, FileRecord, MetadataStore, NewChunk, Page};

const SERVICE: &str = "metadata store";

/// Client for one document collection
#[derive(Clone)]
pub struct BaseClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct QueryResponse<T> {
    #[serde(default)]
    paging: Paging,
    items: Vec<T>,
}

#[derive(Deserialize, Default)]
struct Paging {
    last: Option<String>,
}

impl BaseClient {
    pub fn new(http: reqwest::Client, config: &DatabaseConfig, base: &str) -> Self {
        Self {
            http,
            url: format!("{}/{}/{}", config.endpoint, config.project_id(), base),
            api_key: config.api_key.clone(),
        }
    }

    /// Insert or replace one item under its `key`
    pub async fn put<T: Serialize>(&self, item: &T) -> Result<()> {
        let response = self
            .http
            .put(format!("{}/items", self.url))
            .header("X-API-Key", &self.api_key)
            .json(&json!({ "items": [item] }))
            .send()
            .await?;

        expect_success(response).await?;
        Ok(())
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let response = self
            .http
            .get(format!("{}/items/{}", self.url, urlencoding::encode(key)))
            .header("X-API-Key", &self.api_key)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = expect_success(response).await?;
        Ok(Some(serde_json::from_slice(&body)?))
    }

    /// Fetch one page of items matching `filter`
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        filter: Value,
        limit: usize,
        last: Option<&str>,
    ) -> Result<Page<T>> {
        let mut body = json!({ "query": [filter], "limit": limit });
        if let Some(last) = last {
            body["last"] = Value::String(last.to_string());
        }

        let response = self
            .http
            .post(format!("{}/query", self.url))
            .header("X-API-Key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let body = expect_success(response).await?;
        let parsed: QueryResponse<T> = serde_json::from_slice(&body)?;
        Ok(Page {
            items: parsed.items,
            last: parsed.paging.last.filter(|l| !l.is_empty()),
        })
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let response = self
            .http
            .delete(format!("{}/items/{}", self.url, urlencoding::encode(key)))
            .header("X-API-Key", &self.api_key)
            .send()
            .await?;

        expect_success(response).await?;
        Ok(())
    }
}

async fn expect_success(response: reqwest::Response) -> Result<Vec<u8>> {
    let status = response.status();
    let body = response.bytes().await?;
    if !status.is_success() {
        return Err(StoreError::UnexpectedRemoteResponse {
            service: SERVICE,
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }
    Ok(body.to_vec())
}

/// Query filter for a file listing
fn file_filter(query: &FileQuery) -> Value {
    let mut filter = Map::new();
    if let Some(dir) = &query.dir_path {
        filter.insert("path".to_string(), Value::String(dir.clone()));
    }
    if let Some(name) = &query.name {
        filter.insert("name".to_string(), Value::String(name.clone()));
    }
    if let Some(prefix) = &query.name_prefix {
        filter.insert("name?pfx".to_string(), Value::String(prefix.clone()));
    }
    Value::Object(filter)
}

/// Metadata store backed by two remote collections
#[derive(Clone)]
pub struct RemoteMetadataStore {
    files: BaseClient,
    chunks: BaseClient,
    page_size: usize,
}

impl RemoteMetadataStore {
    pub fn new(config: &DatabaseConfig) -> Self {
        let http = reqwest::Client::new();
        Self {
            files: BaseClient::new(http.clone(), config, &config.files_base),
            chunks: BaseClient::new(http, config, &config.chunks_base),
            page_size: config.page_size.max(1),
        }
    }
}

fn new_key() -> String {
    Uuid::new_v4().simple().to_string()
}

#[async_trait]
impl MetadataStore for RemoteMetadataStore {
    async fn add_file(&self, name: &str, dir_path: &str, size: u64) -> Result<FileRecord> {
        let record = FileRecord {
            id: new_key(),
            name: name.to_string(),
            dir_path: dir_path.to_string(),
            size,
        };
        self.files.put(&record).await?;
        tracing::debug!(file_id = %record.id, name = %record.name, "Registered file");
        Ok(record)
    }

    async fn add_chunk(&self, file_id: &str, chunk: NewChunk) -> Result<ChunkRecord> {
        let record = ChunkRecord {
            id: new_key(),
            file_id: file_id.to_string(),
            index: chunk.index,
            range: chunk.range,
            message_id: chunk.message_id,
        };
        self.chunks.put(&record).await?;
        Ok(record)
    }

    async fn get_file(&self, id: &str) -> Result<Option<FileRecord>> {
        self.files.get(id).await
    }

    async fn fetch_files(&self, query: &FileQuery, last: Option<&str>) -> Result<Page<FileRecord>> {
        self.files.fetch(file_filter(query), self.page_size, last).await
    }

    async fn fetch_chunks(&self, file_id: &str, last: Option<&str>) -> Result<Page<ChunkRecord>> {
        self.chunks
            .fetch(json!({ "file": file_id }), self.page_size, last)
            .await
    }

    async fn delete_file(&self, id: &str) -> Result<()> {
        self.files.delete(id).await
    }

    async fn delete_chunk(&self, id: &str) -> Result<()> {
        self.chunks.delete(id).await
    }
}
