// Orchestrator with format fallback logic

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::diagnostics::diagnose;
use super::errors::DownloadError;
use super::format_selector::FormatPolicy;
use super::models::{AttemptOptions, DownloadSettings, FormatKind};
use super::registry::{TaskRegistry, TaskUpdate};
use super::traits::{Extractor, ProgressEmitter};

/// Result of a successful attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedFile {
    pub file_path: String,
    pub filename: String,
}

/// Drives the extractor for every accepted task.
///
/// Cloning is cheap; all clones share the registry, the concurrency limit
/// and the set of running tasks.
#[derive(Clone)]
pub struct Downloader {
    extractor: Arc<dyn Extractor>,
    registry: TaskRegistry,
    settings: Arc<DownloadSettings>,
    concurrent_limit: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl Downloader {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        registry: TaskRegistry,
        settings: DownloadSettings,
    ) -> Self {
        let permits = settings.max_concurrent_downloads.max(1);
        Self {
            extractor,
            registry,
            settings: Arc::new(settings),
            concurrent_limit: Arc::new(Semaphore::new(permits)),
            tracker: TaskTracker::new(),
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &DownloadSettings {
        &self.settings
    }

    /// Register a pending task and run it in the background.
    /// Returns the task id immediately.
    pub fn submit(&self, url: String, kind: FormatKind) -> String {
        let task_id = self.registry.create();
        tracing::info!(task_id = %task_id, %kind, %url, "download accepted");

        let this = self.clone();
        let id = task_id.clone();
        self.tracker.spawn(async move {
            this.process(&id, &url, kind).await;
        });

        task_id
    }

    /// Full lifecycle of one task; never panics the caller, every outcome
    /// ends up in the registry.
    async fn process(&self, task_id: &str, url: &str, kind: FormatKind) {
        let Some(cancel) = self.registry.cancellation_token(task_id) else {
            return;
        };

        let permit = tokio::select! {
            permit = self.concurrent_limit.clone().acquire_owned() => permit,
            _ = cancel.cancelled() => {
                self.fail(task_id, DownloadError::Cancelled);
                return;
            }
        };
        let Ok(_permit) = permit else {
            self.fail(task_id, DownloadError::Cancelled);
            return;
        };

        let policy = FormatPolicy::for_kind(kind);
        match self.run_policy(task_id, url, &policy, &cancel).await {
            Ok(file) => {
                tracing::info!(task_id, file = %file.file_path, "download completed");
                self.registry.update(
                    task_id,
                    TaskUpdate::Completed {
                        file_path: file.file_path,
                        filename: file.filename,
                    },
                );
            }
            Err(e) => self.fail(task_id, e),
        }
    }

    fn fail(&self, task_id: &str, error: DownloadError) {
        tracing::error!(task_id, "download failed: {}", error);
        self.registry
            .update(task_id, TaskUpdate::Failed(error.to_string()));
    }

    /// Try the policy's selectors in order and commit to the first success.
    ///
    /// A single-selector policy surfaces its failure as is; a fallback list
    /// only reports `AllFormatsExhausted` once every entry failed.
    pub async fn run_policy(
        &self,
        task_id: &str,
        url: &str,
        policy: &FormatPolicy,
        cancel: &CancellationToken,
    ) -> Result<CompletedFile, DownloadError> {
        let emitter = ProgressEmitter::new(self.registry.clone(), task_id);

        if !policy.has_fallback() {
            let format = policy.formats.first().ok_or(DownloadError::AllFormatsExhausted)?;
            tracing::info!(task_id, %format, "downloading {}", policy.kind);
            let options = self.options_for(task_id, format, policy);
            return self.attempt(url, &options, &emitter, cancel).await;
        }

        let total = policy.formats.len();
        for (idx, format) in policy.formats.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }

            tracing::info!(task_id, attempt = idx + 1, total, %format, "downloading {}", policy.kind);
            let options = self.options_for(task_id, format, policy);

            match self.attempt(url, &options, &emitter, cancel).await {
                Ok(file) => return Ok(file),
                Err(DownloadError::Cancelled) => return Err(DownloadError::Cancelled),
                Err(e) => {
                    let message = e.to_string();
                    let reason = diagnose(&message);
                    tracing::warn!(
                        task_id,
                        attempt = idx + 1,
                        %format,
                        %reason,
                        permanent = reason.is_permanent(),
                        "format failed: {}",
                        message
                    );
                }
            }
        }

        Err(DownloadError::AllFormatsExhausted)
    }

    fn options_for(&self, task_id: &str, format: &str, policy: &FormatPolicy) -> AttemptOptions {
        let mut options = self.settings.attempt_options(task_id, format);
        options.merge_output_format = policy.merge_output_format.clone();
        options
    }

    /// One extractor call; the returned path must exist on disk
    async fn attempt(
        &self,
        url: &str,
        options: &AttemptOptions,
        emitter: &ProgressEmitter,
        cancel: &CancellationToken,
    ) -> Result<CompletedFile, DownloadError> {
        let path: PathBuf = self
            .extractor
            .fetch(url, options, emitter, cancel)
            .await?;

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(DownloadError::ExternalLibrary(format!(
                "{} reported {} but the file does not exist",
                self.extractor.name(),
                path.display()
            )));
        }

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                DownloadError::ExternalLibrary(format!("invalid output path {}", path.display()))
            })?;

        Ok(CompletedFile {
            file_path: path.to_string_lossy().to_string(),
            filename,
        })
    }

    /// Number of task runs not yet finished
    pub fn running(&self) -> usize {
        self.tracker.len()
    }

    /// Cancel everything in flight and wait for the runs to record their
    /// terminal state
    pub async fn shutdown(&self) {
        self.registry.cancel_all();
        self.tracker.close();
        self.tracker.wait().await;
    }
}
