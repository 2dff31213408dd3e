//! Route handlers

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
        HeaderMap, HeaderValue,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use super::error_response::ApiError;
use super::state::AppState;
use crate::downloader::utils::content_type_for;
use crate::downloader::{FormatKind, Task, TaskStatus};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub api: String,
}

/// Query string of `POST /api/download`
#[derive(Debug, Deserialize)]
pub struct StartDownloadParams {
    pub url: String,
    #[serde(default)]
    pub format_type: FormatKind,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartDownloadResponse {
    pub task_id: String,
}

/// GET /
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "running".to_string(),
        api: format!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
    })
}

/// POST /api/download
///
/// Answers immediately; the download runs in the background.
pub async fn start_download(
    State(state): State<AppState>,
    Query(params): Query<StartDownloadParams>,
) -> Json<StartDownloadResponse> {
    let task_id = state.downloader.submit(params.url, params.format_type);
    Json(StartDownloadResponse { task_id })
}

/// GET /api/progress/{task_id}
pub async fn get_progress(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    state
        .registry()
        .get(&task_id)
        .map(Json)
        .ok_or(ApiError::NotFound("Task not found"))
}

/// GET /api/download/{task_id}
///
/// Streams the produced file as an attachment.
pub async fn download_file(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Response, ApiError> {
    let task = state
        .registry()
        .get(&task_id)
        .ok_or(ApiError::NotFound("Not found"))?;

    let (TaskStatus::Completed, Some(file_path)) = (task.status, task.file_path) else {
        return Err(ApiError::InvalidState("Not ready"));
    };

    let file = match tokio::fs::File::open(&file_path).await {
        Ok(file) => file,
        Err(e) => {
            tracing::warn!(task_id = %task_id, path = %file_path, "produced file unavailable: {}", e);
            return Err(ApiError::NotFound("File missing"));
        }
    };
    let length = file
        .metadata()
        .await
        .map_err(|_| ApiError::NotFound("File missing"))?
        .len();

    let filename = task.filename.unwrap_or_else(|| {
        std::path::Path::new(&file_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| task_id.clone())
    });

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type_for(&filename)));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&content_disposition(&filename))
            .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
    );

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((headers, body).into_response())
}

/// `attachment; filename="..."` with anything outside printable ASCII replaced
fn content_disposition(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}
