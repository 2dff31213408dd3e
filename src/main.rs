use clap::Parser;
use tracing_subscriber::EnvFilter;

use youtube_downloader_lib::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    youtube_downloader_lib::run(config).await
}
