pub mod api;
pub mod config;
pub mod downloader;
pub mod ytdlp;

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

use config::Config;
use downloader::{Downloader, TaskRegistry};
use ytdlp::YtDlp;

/// How often finished tasks are checked against the retention window
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Start the service and block until a shutdown signal arrives.
pub async fn run(config: Config) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&config.download_dir)
        .await
        .with_context(|| {
            format!(
                "cannot create download directory {}",
                config.download_dir.display()
            )
        })?;

    let cookie_file = config.resolve_cookies();

    let ytdlp = YtDlp::new(config.ytdlp_bin.clone());
    match ytdlp.version().await {
        Some(version) => tracing::info!(binary = ytdlp.binary(), %version, "found yt-dlp"),
        None => tracing::warn!(
            binary = ytdlp.binary(),
            "yt-dlp is not runnable, downloads will fail until it is installed"
        ),
    }

    let registry = TaskRegistry::new();
    let downloader = Downloader::new(
        Arc::new(ytdlp),
        registry.clone(),
        config.download_settings(cookie_file),
    );

    let sweeper = config
        .task_retention()
        .map(|retention| registry.spawn_sweeper(retention, SWEEP_INTERVAL.min(retention)));

    api::start_api_server(downloader.clone(), config.bind, shutdown_signal())
        .await
        .with_context(|| format!("API server on {} failed", config.bind))?;

    tracing::info!(running = downloader.running(), "cancelling running downloads");
    downloader.shutdown().await;
    if let Some(sweeper) = sweeper {
        let _ = sweeper.await;
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
