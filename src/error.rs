//! Error types for Distore

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors produced by the transfer engine and its remote collaborators
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("unexpected response from {service}: HTTP {status}: {body}")]
    UnexpectedRemoteResponse {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("range not satisfiable: [{start}, {end}) of {size} bytes")]
    RangeNotSatisfiable { start: u64, end: u64, size: u64 },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("malformed remote payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunk {index} (message {}): {source}", .message_id.as_deref().unwrap_or("-"))]
    Chunk {
        index: u32,
        message_id: Option<String>,
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    /// Attach the chunk index and remote message id to an error
    pub fn in_chunk(self, index: u32, message_id: Option<&str>) -> Self {
        match self {
            // Keep the innermost context
            e @ StoreError::Chunk { .. } => e,
            e => StoreError::Chunk {
                index,
                message_id: message_id.map(str::to_string),
                source: Box::new(e),
            },
        }
    }

    /// The error with any chunk context stripped
    pub fn root(&self) -> &StoreError {
        match self {
            StoreError::Chunk { source, .. } => source.root(),
            e => e,
        }
    }
}

/// HTTP-facing error wrapper
#[derive(Error, Debug)]
#[error(transparent)]
pub struct AppError(#[from] pub StoreError);

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut content_range = None;
        let (status, error_type, message) = match self.0.root() {
            StoreError::NotFound(what) => (StatusCode::NOT_FOUND, "not_found", what.clone()),
            StoreError::RangeNotSatisfiable { size, .. } => {
                content_range = Some(format!("bytes */{}", size));
                (
                    StatusCode::RANGE_NOT_SATISFIABLE,
                    "range_not_satisfiable",
                    self.0.root().to_string(),
                )
            }
            StoreError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            StoreError::AlreadyExists(what) => (StatusCode::CONFLICT, "conflict", what.clone()),
            StoreError::Network(_) | StoreError::UnexpectedRemoteResponse { .. } => {
                tracing::error!("Remote service error: {}", self.0);
                (
                    StatusCode::BAD_GATEWAY,
                    "remote_error",
                    "A remote service failed".to_string(),
                )
            }
            _ => {
                tracing::error!("Internal error: {}", self.0);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details: if cfg!(debug_assertions) {
                Some(self.0.to_string())
            } else {
                None
            },
        });

        let mut response = (status, body).into_response();
        if let Some(value) = content_range.and_then(|v| v.parse().ok()) {
            response.headers_mut().insert(header::CONTENT_RANGE, value);
        }
        response
    }
}
