//! File serving routes
//!
//! `GET /files/<virtual path>` streams a stored file, honouring a single
//! byte range from the `Range` header.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use futures::TryStreamExt;

use crate::chunk::{self, ByteSpan};
use crate::error::{AppError, StoreError};
use crate::state::AppState;

/// Create the files router
pub fn router() -> Router<AppState> {
    Router::new().route("/*path", get(serve_file))
}

/// Serve a file, or one byte range of it
async fn serve_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let manager = state.manager();
    let file = manager.get_file_from_path(&format!("/{}", path)).await?;

    let requested = match headers.get(header::RANGE).and_then(|v| v.to_str().ok()) {
        Some(value) => chunk::parse_range_header(value, file.size)?,
        None => None,
    };
    let (status, span) = match requested {
        Some(span) => (StatusCode::PARTIAL_CONTENT, span),
        None => (StatusCode::OK, ByteSpan::new(0, file.size)),
    };

    let body = if span.is_empty() {
        Body::empty()
    } else {
        let file_id = file.id.clone();
        let pieces = manager
            .read_range(&file, span.start, span.end)
            .await?
            .inspect_err(move |e| tracing::error!(file_id = %file_id, "Range stream failed: {}", e));
        Body::from_stream(pieces)
    };

    let mut response = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, span.len())
        .header(header::CONTENT_DISPOSITION, content_disposition(&file.name))
        .header(header::ACCEPT_RANGES, "bytes");
    if status == StatusCode::PARTIAL_CONTENT {
        response = response.header(
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{}", span.start, span.end - 1, file.size),
        );
    }

    response
        .body(body)
        .map_err(|e| AppError(StoreError::InvariantViolation(e.to_string())))
}

/// `attachment` disposition carrying the UTF-8 file name
fn content_disposition(name: &str) -> String {
    format!(
        "attachment; filename*=UTF-8''{}",
        urlencoding::encode(name)
    )
}
