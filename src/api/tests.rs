use super::*;
use crate::downloader::format_selector::AUDIO_FORMAT;
use crate::downloader::test_helpers::{wait_for_terminal, Outcome, ScriptedExtractor};
use crate::downloader::{DownloadSettings, Task, TaskRegistry, TaskStatus};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use super::error_response::ErrorBody;
use super::routes::{HealthResponse, StartDownloadResponse};

fn test_downloader(extractor: ScriptedExtractor) -> (Downloader, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let settings = DownloadSettings {
        download_dir: dir.path().to_path_buf(),
        ..DownloadSettings::default()
    };
    let downloader = Downloader::new(Arc::new(extractor), TaskRegistry::new(), settings);
    (downloader, dir)
}

async fn send(downloader: &Downloader, method: &str, uri: &str) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    create_router(downloader.clone()).oneshot(request).await.unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn json<T: serde::de::DeserializeOwned>(response: Response) -> T {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

async fn start(downloader: &Downloader, query: &str) -> String {
    let response = send(downloader, "POST", &format!("/api/download?{}", query)).await;
    assert_eq!(response.status(), StatusCode::OK);
    json::<StartDownloadResponse>(response).await.task_id
}

#[tokio::test]
async fn health_reports_running() {
    let (downloader, _dir) = test_downloader(ScriptedExtractor::new());
    let response = send(&downloader, "GET", "/").await;
    assert_eq!(response.status(), StatusCode::OK);

    let health: HealthResponse = json(response).await;
    assert_eq!(health.status, "running");
    assert!(health.api.contains(env!("CARGO_PKG_VERSION")));
}

#[tokio::test]
async fn cors_headers_present() {
    let (downloader, _dir) = test_downloader(ScriptedExtractor::new());
    let request = Request::builder()
        .uri("/")
        .header(header::ORIGIN, "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = create_router(downloader).oneshot(request).await.unwrap();

    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn start_returns_pollable_task() {
    let extractor = ScriptedExtractor::new().on(AUDIO_FORMAT, Outcome::hang());
    let (downloader, _dir) = test_downloader(extractor);

    let task_id = start(&downloader, "url=https%3A%2F%2Fyoutu.be%2Fabc").await;
    assert_eq!(task_id.len(), 8);

    let response = send(&downloader, "GET", &format!("/api/progress/{}", task_id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let task: Task = json(response).await;
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.progress, 0);
    assert!(task.file_path.is_none());
    assert!(task.filename.is_none());
    assert!(task.error.is_none());

    downloader.shutdown().await;
}

#[tokio::test]
async fn rejects_bad_queries() {
    let (downloader, _dir) = test_downloader(ScriptedExtractor::new());

    let missing_url = send(&downloader, "POST", "/api/download").await;
    assert_eq!(missing_url.status(), StatusCode::BAD_REQUEST);

    let bad_kind = send(&downloader, "POST", "/api/download?url=x&format_type=flac").await;
    assert_eq!(bad_kind.status(), StatusCode::BAD_REQUEST);

    assert!(downloader.registry().is_empty());
}

#[tokio::test]
async fn unknown_task() {
    let (downloader, _dir) = test_downloader(ScriptedExtractor::new());

    let progress = send(&downloader, "GET", "/api/progress/deadbeef").await;
    assert_eq!(progress.status(), StatusCode::NOT_FOUND);
    assert_eq!(json::<ErrorBody>(progress).await.detail, "Task not found");

    let file = send(&downloader, "GET", "/api/download/deadbeef").await;
    assert_eq!(file.status(), StatusCode::NOT_FOUND);
    assert_eq!(json::<ErrorBody>(file).await.detail, "Not found");
}

#[tokio::test]
async fn file_not_ready_while_running() {
    let extractor = ScriptedExtractor::new().on(AUDIO_FORMAT, Outcome::hang());
    let (downloader, _dir) = test_downloader(extractor);
    let task_id = start(&downloader, "url=x").await;

    let response = send(&downloader, "GET", &format!("/api/download/{}", task_id)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json::<ErrorBody>(response).await.detail, "Not ready");

    downloader.shutdown().await;
}

#[tokio::test]
async fn failed_task_is_not_downloadable() {
    let extractor = ScriptedExtractor::new().on(AUDIO_FORMAT, Outcome::fail("ERROR: Video unavailable"));
    let (downloader, _dir) = test_downloader(extractor);
    let task_id = start(&downloader, "url=x").await;

    let task = wait_for_terminal(downloader.registry(), &task_id).await;
    assert_eq!(task.status, TaskStatus::Error);

    let progress: Task = json(send(&downloader, "GET", &format!("/api/progress/{}", task_id)).await).await;
    assert_eq!(progress.error.as_deref(), Some("ERROR: Video unavailable"));

    let response = send(&downloader, "GET", &format!("/api/download/{}", task_id)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn completed_audio_is_streamed() {
    let extractor = ScriptedExtractor::new().on(AUDIO_FORMAT, Outcome::succeed("m4a"));
    let (downloader, _dir) = test_downloader(extractor);
    let task_id = start(&downloader, "url=x&format_type=audio").await;

    let task = wait_for_terminal(downloader.registry(), &task_id).await;
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.progress, 100);
    let expected_name = format!("{}.m4a", task_id);
    assert_eq!(task.filename.as_deref(), Some(expected_name.as_str()));

    let response = send(&downloader, "GET", &format!("/api/download/{}", task_id)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "audio/mp4");
    assert_eq!(headers.get(header::CONTENT_LENGTH).unwrap(), "5");
    assert_eq!(
        headers.get(header::CONTENT_DISPOSITION).unwrap().to_str().unwrap(),
        format!("attachment; filename=\"{}\"", expected_name)
    );
    assert_eq!(body_bytes(response).await, b"media");
}

#[tokio::test]
async fn deleted_file_is_missing() {
    let extractor = ScriptedExtractor::new().on(AUDIO_FORMAT, Outcome::succeed("m4a"));
    let (downloader, _dir) = test_downloader(extractor);
    let task_id = start(&downloader, "url=x").await;

    let task = wait_for_terminal(downloader.registry(), &task_id).await;
    std::fs::remove_file(task.file_path.unwrap()).unwrap();

    let response = send(&downloader, "GET", &format!("/api/download/{}", task_id)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json::<ErrorBody>(response).await.detail, "File missing");
}

#[tokio::test]
async fn server_stops_on_shutdown_signal() {
    let (downloader, _dir) = test_downloader(ScriptedExtractor::new());
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(start_api_server(
        downloader,
        "127.0.0.1:0".parse().unwrap(),
        async {
            let _ = rx.await;
        },
    ));
    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(()).unwrap();

    tokio::time::timeout(Duration::from_secs(2), server)
        .await
        .expect("server should stop")
        .unwrap()
        .unwrap();
}
