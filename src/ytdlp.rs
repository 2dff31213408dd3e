use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::downloader::diagnostics::summarize_stderr;
use crate::downloader::utils::{find_output_file, run_output_with_timeout};
use crate::downloader::{AttemptOptions, DownloadError, Extractor, ProgressEmitter, ProgressEvent};

/// Machine-readable progress line requested from yt-dlp
const PROGRESS_TEMPLATE: &str = "download:[progress] %(progress.status)s %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s";

/// Final path, printed once post-processing has moved the file into place
const FILEPATH_TEMPLATE: &str = "after_move:[filepath] %(filepath)s";

/// Lines of stderr kept for the failure description
const STDERR_TAIL: usize = 40;

lazy_static! {
    static ref PROGRESS_RE: Regex =
        Regex::new(r"^\[progress\]\s+(\S+)\s+(\S+)\s+(\S+)\s+(\S+)").unwrap();
    static ref FILEPATH_RE: Regex = Regex::new(r"^\[filepath\]\s+(.+)$").unwrap();
    static ref POSTPROCESS_RE: Regex = Regex::new(
        r"^\[(Merger|ExtractAudio|VideoConvertor|VideoRemuxer|Fixup\w*)\]"
    )
    .unwrap();
}

/// What a single line of yt-dlp output means to us
#[derive(Debug, Clone, PartialEq, Eq)]
enum OutputLine {
    Progress(ProgressEvent),
    PostProcessing,
    FinalPath(PathBuf),
}

/// yt-dlp prints `NA` for missing fields and floats for estimates
fn parse_bytes(field: &str) -> Option<u64> {
    if field == "NA" || field == "None" {
        return None;
    }
    field
        .parse::<u64>()
        .ok()
        .or_else(|| field.parse::<f64>().ok().filter(|v| *v >= 0.0).map(|v| v as u64))
}

fn parse_output_line(line: &str) -> Option<OutputLine> {
    let line = line.trim();

    if let Some(caps) = PROGRESS_RE.captures(line) {
        return match &caps[1] {
            "downloading" => {
                let downloaded_bytes = parse_bytes(&caps[2])?;
                let total_bytes = parse_bytes(&caps[3]).or_else(|| parse_bytes(&caps[4]));
                Some(OutputLine::Progress(ProgressEvent::Downloading {
                    downloaded_bytes,
                    total_bytes,
                }))
            }
            "finished" => Some(OutputLine::Progress(ProgressEvent::Finished)),
            _ => None,
        };
    }

    if let Some(caps) = FILEPATH_RE.captures(line) {
        let path = caps[1].trim();
        if !path.is_empty() && path != "NA" {
            return Some(OutputLine::FinalPath(PathBuf::from(path)));
        }
        return None;
    }

    if POSTPROCESS_RE.is_match(line) {
        return Some(OutputLine::PostProcessing);
    }

    None
}

/// Find yt-dlp executable in common paths
pub fn find_ytdlp() -> String {
    let common_paths = [
        "/opt/homebrew/bin/yt-dlp", // Homebrew on Apple Silicon
        "/usr/local/bin/yt-dlp",    // Homebrew on Intel Mac
        "/usr/bin/yt-dlp",          // System installation
    ];

    for path in common_paths {
        if Path::new(path).exists() {
            return path.to_string();
        }
    }

    match which::which("yt-dlp") {
        Ok(path) => path.to_string_lossy().to_string(),
        // Last resort: hope it's in PATH at spawn time
        Err(_) => "yt-dlp".to_string(),
    }
}

/// Translate attempt options into yt-dlp flags
pub fn build_args(url: &str, options: &AttemptOptions) -> Vec<String> {
    let mut args = vec![
        "-f".to_string(),
        options.format.clone(),
        "-o".to_string(),
        options.output_template.clone(),
        "--newline".to_string(),
        "--no-update".to_string(),
        "--no-simulate".to_string(),
        "--progress".to_string(),
        "--progress-template".to_string(),
        PROGRESS_TEMPLATE.to_string(),
        "--print".to_string(),
        FILEPATH_TEMPLATE.to_string(),
        "--socket-timeout".to_string(),
        options.socket_timeout_secs.to_string(),
        "--fragment-retries".to_string(),
        options.fragment_retries.to_string(),
    ];

    if options.no_playlist {
        args.push("--no-playlist".to_string());
    }
    if options.skip_unavailable_fragments {
        args.push("--skip-unavailable-fragments".to_string());
    }

    if let Some(client) = &options.player_client {
        args.push("--extractor-args".to_string());
        args.push(format!("youtube:player_client={}", client));
    }

    for (name, value) in &options.http_headers {
        if name.eq_ignore_ascii_case("user-agent") {
            args.push("--user-agent".to_string());
            args.push(value.clone());
        } else {
            args.push("--add-header".to_string());
            args.push(format!("{}:{}", name, value));
        }
    }

    if let Some(path) = &options.cookie_file {
        args.push("--cookies".to_string());
        args.push(path.to_string_lossy().to_string());
    }

    if let Some(container) = &options.merge_output_format {
        args.push("--merge-output-format".to_string());
        args.push(container.clone());
    }

    // end of options: a URL starting with '-' must not be read as a flag
    args.push("--".to_string());
    args.push(url.to_string());
    args
}

/// Directory and file stem from an output template like `dir/<id>.%(ext)s`
fn template_parts(template: &str) -> (PathBuf, String) {
    let path = Path::new(template);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = name.trim_end_matches(".%(ext)s").to_string();
    (dir, stem)
}

#[derive(Default)]
struct StreamSummary {
    final_path: Option<PathBuf>,
    tail: Vec<String>,
}

/// Read one output stream line by line, forwarding progress as it arrives
async fn pump<R>(reader: R, emitter: ProgressEmitter) -> StreamSummary
where
    R: AsyncRead + Unpin,
{
    let mut summary = StreamSummary::default();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(task_id = emitter.task_id(), "stopped reading yt-dlp output: {}", e);
                break;
            }
        };

        match parse_output_line(&line) {
            Some(OutputLine::Progress(event)) => emitter.emit(event),
            Some(OutputLine::PostProcessing) => {
                tracing::debug!(task_id = emitter.task_id(), "[yt-dlp] {}", line);
                emitter.emit(ProgressEvent::Finished);
            }
            Some(OutputLine::FinalPath(path)) => summary.final_path = Some(path),
            None => {
                if !line.trim().is_empty() {
                    tracing::trace!(task_id = emitter.task_id(), "[yt-dlp] {}", line);
                    if summary.tail.len() == STDERR_TAIL {
                        summary.tail.remove(0);
                    }
                    summary.tail.push(line);
                }
            }
        }
    }

    summary
}

/// Extractor backed by the yt-dlp executable
pub struct YtDlp {
    binary: String,
}

impl YtDlp {
    pub fn new(binary: Option<String>) -> Self {
        Self {
            binary: binary.unwrap_or_else(find_ytdlp),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// `yt-dlp --version`, or None if it cannot be run
    pub async fn version(&self) -> Option<String> {
        let output = run_output_with_timeout(&self.binary, vec!["--version".to_string()], 15)
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!version.is_empty()).then_some(version)
    }
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl Extractor for YtDlp {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn fetch(
        &self,
        url: &str,
        options: &AttemptOptions,
        progress: &ProgressEmitter,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        let args = build_args(url, options);
        tracing::debug!(
            task_id = progress.task_id(),
            "running {} {}",
            self.binary,
            args.join(" ")
        );

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DownloadError::ToolNotFound(format!("failed to start {}: {}", self.binary, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::ExternalLibrary("failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::ExternalLibrary("failed to capture stderr".to_string()))?;

        // Progress can land on either stream depending on quiet mode
        let stdout_task = tokio::spawn(pump(stdout, progress.clone()));
        let stderr_task = tokio::spawn(pump(stderr, progress.clone()));

        let waited = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };
        let status = match waited {
            Some(status) => status?,
            None => {
                let _ = child.kill().await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(DownloadError::Cancelled);
            }
        };

        let out = stdout_task.await.unwrap_or_default();
        let err = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let stderr_text = err.tail.join("\n");
            let message = summarize_stderr(&stderr_text)
                .unwrap_or_else(|| format!("yt-dlp exited with {}", status));
            return Err(DownloadError::ExternalLibrary(message));
        }

        let (dir, stem) = template_parts(&options.output_template);
        let path = out
            .final_path
            .or(err.final_path)
            .or_else(|| find_output_file(&dir, &stem))
            .ok_or_else(|| {
                DownloadError::ExternalLibrary("yt-dlp finished without producing a file".to_string())
            })?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::DownloadSettings;

    #[test]
    fn parses_downloading_line() {
        let line = "[progress] downloading 1048576 4194304 NA";
        assert_eq!(
            parse_output_line(line),
            Some(OutputLine::Progress(ProgressEvent::Downloading {
                downloaded_bytes: 1_048_576,
                total_bytes: Some(4_194_304),
            }))
        );
    }

    #[test]
    fn falls_back_to_estimate() {
        let line = "[progress] downloading 2048 NA 8192.5";
        assert_eq!(
            parse_output_line(line),
            Some(OutputLine::Progress(ProgressEvent::Downloading {
                downloaded_bytes: 2048,
                total_bytes: Some(8192),
            }))
        );

        let unknown = "[progress] downloading 2048 NA NA";
        assert_eq!(
            parse_output_line(unknown),
            Some(OutputLine::Progress(ProgressEvent::Downloading {
                downloaded_bytes: 2048,
                total_bytes: None,
            }))
        );
    }

    #[test]
    fn parses_finished_and_post_processing() {
        assert_eq!(
            parse_output_line("[progress] finished 4194304 4194304 NA"),
            Some(OutputLine::Progress(ProgressEvent::Finished))
        );
        assert_eq!(
            parse_output_line("[Merger] Merging formats into \"downloads/ab12cd34.mp4\""),
            Some(OutputLine::PostProcessing)
        );
        assert_eq!(
            parse_output_line("[FixupM4a] Correcting container of \"downloads/x.m4a\""),
            Some(OutputLine::PostProcessing)
        );
    }

    #[test]
    fn parses_final_path() {
        assert_eq!(
            parse_output_line("[filepath] /srv/downloads/ab12cd34.mp4"),
            Some(OutputLine::FinalPath(PathBuf::from("/srv/downloads/ab12cd34.mp4")))
        );
        assert_eq!(parse_output_line("[filepath] NA"), None);
    }

    #[test]
    fn ignores_regular_output() {
        assert_eq!(parse_output_line("[youtube] abc: Downloading webpage"), None);
        assert_eq!(parse_output_line("[download]  12.5% of 3.00MiB"), None);
        assert_eq!(parse_output_line(""), None);
    }

    #[test]
    fn args_follow_options() {
        let settings = DownloadSettings {
            cookie_file: Some(PathBuf::from("/tmp/cookies.txt")),
            ..DownloadSettings::default()
        };
        let mut options = settings.attempt_options("ab12cd34", "best");
        options.merge_output_format = Some("mp4".to_string());

        let args = build_args("https://example.com/v", &options);
        let pair = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .map(|i| args[i + 1].as_str())
        };

        assert_eq!(pair("-f"), Some("best"));
        assert_eq!(pair("--socket-timeout"), Some("120"));
        assert_eq!(pair("--fragment-retries"), Some("30"));
        assert_eq!(pair("--cookies"), Some("/tmp/cookies.txt"));
        assert_eq!(pair("--merge-output-format"), Some("mp4"));
        assert_eq!(pair("--extractor-args"), Some("youtube:player_client=web"));
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(args.contains(&"--skip-unavailable-fragments".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("https://example.com/v"));
    }

    #[test]
    fn args_omit_optional_flags() {
        let options = DownloadSettings::default().attempt_options("ab12cd34", "bestaudio");
        let args = build_args("https://example.com/a", &options);
        assert!(!args.contains(&"--cookies".to_string()));
        assert!(!args.contains(&"--merge-output-format".to_string()));
    }

    #[test]
    fn template_parts_split_dir_and_stem() {
        assert_eq!(
            template_parts("downloads/ab12cd34.%(ext)s"),
            (PathBuf::from("downloads"), "ab12cd34".to_string())
        );
        assert_eq!(
            template_parts("ab12cd34.%(ext)s"),
            (PathBuf::from("."), "ab12cd34".to_string())
        );
    }

    #[tokio::test]
    async fn missing_binary_is_reported() {
        let ytdlp = YtDlp::new(Some("definitely-not-a-real-binary-xyz".to_string()));
        assert_eq!(ytdlp.version().await, None);

        let registry = crate::downloader::TaskRegistry::new();
        let id = registry.create();
        let emitter = ProgressEmitter::new(registry, id.clone());
        let options = DownloadSettings::default().attempt_options(&id, "best");
        let err = ytdlp
            .fetch("https://example.com", &options, &emitter, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::ToolNotFound(_)));
    }
}
