// Common data models for the download service

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Registered, waiting for its first attempt
    Pending,
    /// Bytes are flowing for the current stream
    Downloading,
    /// Stream fetch done, merging/post-processing in progress
    Processing,
    /// File is on disk and can be fetched
    Completed,
    /// Terminal failure, see `Task::error`
    Error,
}

impl TaskStatus {
    /// Completed and error are final: nothing moves a task out of them
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Downloading => write!(f, "downloading"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Status record returned by the progress endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub status: TaskStatus,
    /// Percentage 0..=100, only meaningful while downloading
    pub progress: u8,
    pub file_path: Option<String>,
    pub error: Option<String>,
    pub filename: Option<String>,
}

impl Task {
    pub fn pending() -> Self {
        Self {
            status: TaskStatus::Pending,
            progress: 0,
            file_path: None,
            error: None,
            filename: None,
        }
    }
}

/// What the client asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    #[default]
    Audio,
    Video,
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// Progress notification raised by an extractor during an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    Downloading {
        downloaded_bytes: u64,
        /// Exact size if known, otherwise the extractor's estimate
        total_bytes: Option<u64>,
    },
    /// Stream fetch finished; merging or post-processing follows
    Finished,
}

impl ProgressEvent {
    /// floor(downloaded / total * 100), capped at 100.
    /// `None` when the total is unknown or zero.
    pub fn percent(&self) -> Option<u8> {
        match *self {
            Self::Downloading {
                downloaded_bytes,
                total_bytes: Some(total),
            } if total > 0 => {
                let pct = (downloaded_bytes as u128 * 100) / total as u128;
                Some(pct.min(100) as u8)
            }
            _ => None,
        }
    }
}

/// Declarative options for one extractor attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOptions {
    /// Output template, e.g. `downloads/ab12cd34.%(ext)s`
    pub output_template: String,
    /// Format selector handed to the extractor
    pub format: String,
    pub socket_timeout_secs: u32,
    pub fragment_retries: u32,
    pub skip_unavailable_fragments: bool,
    pub no_playlist: bool,
    pub cookie_file: Option<PathBuf>,
    /// Forced container for merged video+audio output
    pub merge_output_format: Option<String>,
    /// YouTube player client
    pub player_client: Option<String>,
    pub http_headers: Vec<(String, String)>,
}

/// Settings shared by every attempt of every task
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub download_dir: PathBuf,
    pub cookie_file: Option<PathBuf>,
    pub socket_timeout_secs: u32,
    pub fragment_retries: u32,
    pub max_concurrent_downloads: usize,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            cookie_file: None,
            socket_timeout_secs: 120,
            fragment_retries: 30,
            max_concurrent_downloads: 4,
        }
    }
}

impl DownloadSettings {
    /// Base options for a task; the format policy fills in the selector
    pub fn attempt_options(&self, task_id: &str, format: &str) -> AttemptOptions {
        AttemptOptions {
            output_template: self
                .download_dir
                .join(format!("{}.%(ext)s", task_id))
                .to_string_lossy()
                .to_string(),
            format: format.to_string(),
            socket_timeout_secs: self.socket_timeout_secs,
            fragment_retries: self.fragment_retries,
            skip_unavailable_fragments: true,
            no_playlist: true,
            cookie_file: self.cookie_file.clone(),
            merge_output_format: None,
            player_client: Some("web".to_string()),
            http_headers: vec![
                (
                    "User-Agent".to_string(),
                    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
                ),
                ("Accept-Language".to_string(), "en-US,en;q=0.9".to_string()),
                (
                    "Accept".to_string(),
                    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"
                        .to_string(),
                ),
            ],
        }
    }
}
