//! Integration tests for the HTTP surface

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use common::{manager, transfer, write_file};
use distore::metadata::{FileRecord, MemoryMetadataStore};
use distore::routes;
use distore::storage::MemoryBlobStore;
use distore::transfer::NoopObserver;
use distore::AppState;

struct TestApp {
    router: Router,
    report: FileRecord,
    empty: FileRecord,
    data: Vec<u8>,
    _dir: tempfile::TempDir,
}

async fn setup() -> TestApp {
    let manager = manager(
        Arc::new(MemoryBlobStore::new()),
        MemoryMetadataStore::new(),
        transfer(16, 3),
    );

    let dir = tempfile::tempdir().unwrap();
    let data: Vec<u8> = (0..100u8).collect();
    let report = manager
        .upload_file(
            &write_file(dir.path(), "my report.bin", &data),
            "/docs",
            &NoopObserver,
        )
        .await
        .unwrap();
    let empty = manager
        .upload_file(&write_file(dir.path(), "empty.txt", b""), "/docs", &NoopObserver)
        .await
        .unwrap();
    manager
        .upload_file(&write_file(dir.path(), "other.bin", b"xyz"), "", &NoopObserver)
        .await
        .unwrap();

    TestApp {
        router: routes::router(AppState::new(manager)),
        report,
        empty,
        data,
        _dir: dir,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body.to_vec())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn get_range(uri: &str, range: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::RANGE, range)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = setup().await;
    let (status, _, body) = send(&app.router, get("/api/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn test_whole_file() {
    let app = setup().await;
    let (status, headers, body) = send(&app.router, get("/files/docs/my%20report.bin")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, app.data);
    assert_eq!(headers[header::CONTENT_LENGTH], "100");
    assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename*=UTF-8''my%20report.bin"
    );
    assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
}

#[tokio::test]
async fn test_byte_range() {
    let app = setup().await;
    let uri = "/files/docs/my%20report.bin";

    let (status, headers, body) = send(&app.router, get_range(uri, "bytes=5-24")).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(body, app.data[5..25].to_vec());
    assert_eq!(headers[header::CONTENT_RANGE], "bytes 5-24/100");
    assert_eq!(headers[header::CONTENT_LENGTH], "20");

    let (status, headers, body) = send(&app.router, get_range(uri, "bytes=-10")).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(body, app.data[90..].to_vec());
    assert_eq!(headers[header::CONTENT_RANGE], "bytes 90-99/100");

    let (status, _, body) = send(&app.router, get_range(uri, "bytes=30-")).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(body, app.data[30..].to_vec());
}

#[tokio::test]
async fn test_unsatisfiable_and_malformed_ranges() {
    let app = setup().await;
    let uri = "/files/docs/my%20report.bin";

    let (status, headers, _) = send(&app.router, get_range(uri, "bytes=100-")).await;
    assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(headers[header::CONTENT_RANGE], "bytes */100");

    let (status, _, body) = send(&app.router, get_range(uri, "bytes=oops")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.len(), 100);
}

#[tokio::test]
async fn test_empty_file_and_missing_file() {
    let app = setup().await;

    let (status, headers, body) = send(&app.router, get("/files/docs/empty.txt")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
    assert_eq!(headers[header::CONTENT_LENGTH], "0");

    let (status, _, body) = send(&app.router, get("/files/docs/nope.bin")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "not_found");
}

#[tokio::test]
async fn test_list_files() {
    let app = setup().await;

    let (status, _, body) = send(&app.router, get("/api/v1/files")).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total"], 3);

    let (_, _, body) = send(&app.router, get("/api/v1/files?dir=docs")).await;
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total"], 2);

    let (_, _, body) = send(&app.router, get("/api/v1/files?prefix=my")).await;
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total"], 1);
    assert_eq!(json["files"][0]["path"], "/docs/my report.bin");
    assert_eq!(json["files"][0]["id"], app.report.id.as_str());
}

#[tokio::test]
async fn test_get_and_delete_file() {
    let app = setup().await;
    let uri = format!("/api/v1/files/{}", app.report.id);

    let (status, _, body) = send(&app.router, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["size"], 100);
    assert_eq!(json["chunks"].as_array().unwrap().len(), 7);
    assert_eq!(json["chunks"][6]["start"], 96);
    assert_eq!(json["chunks"][6]["end"], 100);

    let delete = Request::builder()
        .method("DELETE")
        .uri(&uri)
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app.router, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, _) = send(&app.router, get(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = send(&app.router, get("/files/docs/my%20report.bin")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The empty file is still served
    let (status, _, _) = send(&app.router, get(&format!("/api/v1/files/{}", app.empty.id))).await;
    assert_eq!(status, StatusCode::OK);
}
