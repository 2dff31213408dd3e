// Error types for the download core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    /// The extractor reported a failure for one attempt
    #[error("{0}")]
    ExternalLibrary(String),

    /// Every entry of the video fallback list failed
    #[error("All video formats failed")]
    AllFormatsExhausted,

    /// yt-dlp could not be started
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// The task was cancelled while running
    #[error("Download cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Cookie source could not be materialized; callers fall back to no cookies
#[derive(Debug, Error)]
pub enum CookieError {
    #[error("invalid base64 cookie blob: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("failed to write cookie file: {0}")]
    Io(#[from] std::io::Error),
}
