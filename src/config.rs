//! Service configuration
//!
//! Every setting can be given as a command-line flag or through the
//! environment. Cookie sources are resolved once at startup into a single
//! optional cookie file that every download attempt reuses.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use clap::Parser;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::downloader::{CookieError, DownloadSettings};

#[derive(Debug, Clone, Parser)]
#[command(name = "youtube-downloader-api", version, about)]
pub struct Config {
    /// Address the HTTP API listens on
    #[arg(long, env = "YTDL_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// Directory produced files are written to (created if missing)
    #[arg(long, env = "YTDL_DOWNLOAD_DIR", default_value = "downloads")]
    pub download_dir: PathBuf,

    /// Path to the yt-dlp executable; discovered when omitted
    #[arg(long, env = "YTDLP_BIN")]
    pub ytdlp_bin: Option<String>,

    /// Netscape cookies.txt passed to every download
    #[arg(long, env = "YTDL_COOKIES_FILE")]
    pub cookies_file: Option<PathBuf>,

    /// Base64-encoded cookies.txt, used when no cookie file is available
    #[arg(long, env = "YTDL_COOKIES_B64", hide_env_values = true)]
    pub cookies_b64: Option<String>,

    /// Downloads running at the same time; further tasks wait as pending
    #[arg(long, env = "YTDL_MAX_CONCURRENT_DOWNLOADS", default_value_t = 4)]
    pub max_concurrent_downloads: usize,

    /// Seconds finished tasks stay queryable (0 keeps them forever)
    #[arg(long, env = "YTDL_TASK_RETENTION_SECS", default_value_t = 86_400)]
    pub task_retention_secs: u64,

    /// yt-dlp socket timeout in seconds
    #[arg(long, env = "YTDL_SOCKET_TIMEOUT", default_value_t = 120)]
    pub socket_timeout: u32,

    /// yt-dlp retries per media fragment
    #[arg(long, env = "YTDL_FRAGMENT_RETRIES", default_value_t = 30)]
    pub fragment_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        let settings = DownloadSettings::default();
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            download_dir: settings.download_dir,
            ytdlp_bin: None,
            cookies_file: None,
            cookies_b64: None,
            max_concurrent_downloads: settings.max_concurrent_downloads,
            task_retention_secs: 86_400,
            socket_timeout: settings.socket_timeout_secs,
            fragment_retries: settings.fragment_retries,
        }
    }
}

impl Config {
    /// Resolve the configured cookie source into a usable file
    pub fn resolve_cookies(&self) -> Option<PathBuf> {
        let target = std::env::temp_dir().join(format!(
            "yt-downloader-cookies-{}.txt",
            std::process::id()
        ));
        resolve_cookie_source(
            self.cookies_file.as_deref(),
            self.cookies_b64.as_deref(),
            &target,
        )
    }

    pub fn download_settings(&self, cookie_file: Option<PathBuf>) -> DownloadSettings {
        DownloadSettings {
            download_dir: self.download_dir.clone(),
            cookie_file,
            socket_timeout_secs: self.socket_timeout,
            fragment_retries: self.fragment_retries,
            max_concurrent_downloads: self.max_concurrent_downloads,
        }
    }

    /// `None` disables eviction
    pub fn task_retention(&self) -> Option<Duration> {
        (self.task_retention_secs > 0).then(|| Duration::from_secs(self.task_retention_secs))
    }
}

/// File path wins if it exists; otherwise the base64 blob is written to
/// `target`. Failures degrade to no cookies.
pub fn resolve_cookie_source(
    file: Option<&Path>,
    blob: Option<&str>,
    target: &Path,
) -> Option<PathBuf> {
    if let Some(path) = file {
        if path.exists() {
            tracing::info!(path = %path.display(), "using cookie file");
            return Some(path.to_path_buf());
        }
        tracing::warn!(path = %path.display(), "cookie file does not exist, ignoring it");
    }

    let blob = blob.map(str::trim).filter(|b| !b.is_empty())?;
    match materialize_cookie_blob(blob, target) {
        Ok(path) => {
            tracing::info!(path = %path.display(), "decoded cookies from base64");
            Some(path)
        }
        Err(e) => {
            tracing::warn!("continuing without cookies: {}", e);
            None
        }
    }
}

/// Decode a base64 cookies.txt (line breaks allowed) into `target`
pub fn materialize_cookie_blob(blob: &str, target: &Path) -> Result<PathBuf, CookieError> {
    let compact: String = blob.split_whitespace().collect();
    let bytes = STANDARD.decode(compact)?;
    std::fs::write(target, bytes)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(target, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(target.to_path_buf())
}
