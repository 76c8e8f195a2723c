//! File record API
//!
//! Listing, inspection and deletion of stored files.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::error::AppError;
use crate::metadata::{ChunkRecord, FileQuery, FileRecord};
use crate::state::AppState;
use crate::util;

/// Create the file API router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_files))
        .route("/:id", get(get_file).delete(delete_file))
}

#[derive(Debug, Serialize)]
pub struct FileSummary {
    pub id: String,
    pub name: String,
    pub dir_path: String,
    pub path: String,
    pub size: u64,
}

impl From<FileRecord> for FileSummary {
    fn from(file: FileRecord) -> Self {
        Self {
            path: file.virtual_path(),
            id: file.id,
            name: file.name,
            dir_path: file.dir_path,
            size: file.size,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub files: Vec<FileSummary>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct ChunkSummary {
    pub index: u32,
    pub start: u64,
    pub end: u64,
    pub message_id: String,
}

impl From<ChunkRecord> for ChunkSummary {
    fn from(chunk: ChunkRecord) -> Self {
        Self {
            index: chunk.index,
            start: chunk.range.start,
            end: chunk.range.end,
            message_id: chunk.message_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FileDetailResponse {
    #[serde(flatten)]
    pub file: FileSummary,
    pub chunks: Vec<ChunkSummary>,
}

/// List files, optionally filtered by directory, exact name or name prefix
async fn list_files(
    State(state): State<AppState>,
    Query(mut query): Query<FileQuery>,
) -> Result<Json<FileListResponse>, AppError> {
    query.dir_path = query.dir_path.map(|d| util::normalize_dir(&d));

    let files: Vec<FileSummary> = state
        .manager()
        .list_files(&query)
        .await?
        .into_iter()
        .map(FileSummary::from)
        .collect();
    let total = files.len();

    Ok(Json(FileListResponse { files, total }))
}

async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FileDetailResponse>, AppError> {
    let manager = state.manager();
    let file = manager.get_file(&id).await?;
    let chunks = manager.get_chunks(&file.id).await?;

    Ok(Json(FileDetailResponse {
        file: file.into(),
        chunks: chunks.into_iter().map(ChunkSummary::from).collect(),
    }))
}

async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.manager().delete_file(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
