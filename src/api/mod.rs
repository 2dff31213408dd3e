//! HTTP facade
//!
//! Thin layer over the downloader: accepts download requests, exposes the
//! task registry for polling and streams finished files back.

use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::downloader::Downloader;

pub mod error_response;
pub mod routes;
pub mod state;

pub use error_response::ApiError;
pub use state::AppState;

/// Create the API router
///
/// # Routes
///
/// - `GET /` - Health check
/// - `POST /api/download?url=..&format_type=audio|video` - Start a download
/// - `GET /api/progress/{task_id}` - Task status record
/// - `GET /api/download/{task_id}` - Fetch the produced file
pub fn create_router(downloader: Downloader) -> Router {
    let state = AppState::new(downloader);

    Router::new()
        .route("/", get(routes::health_check))
        .route("/api/download", post(routes::start_download))
        .route("/api/progress/{task_id}", get(routes::get_progress))
        .route("/api/download/{task_id}", get(routes::download_file))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Serve the API on `bind` until `shutdown` resolves.
///
/// In-flight requests are allowed to finish; running downloads are not
/// touched here.
pub async fn start_api_server<F>(
    downloader: Downloader,
    bind: SocketAddr,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(bind).await?;
    tracing::info!(address = %listener.local_addr()?, "API server listening");

    axum::serve(listener, create_router(downloader))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("API server stopped");
    Ok(())
}

#[cfg(test)]
mod tests;
