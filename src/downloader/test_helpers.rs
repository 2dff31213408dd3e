//! Shared test helpers: a scripted extractor standing in for yt-dlp.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::errors::DownloadError;
use super::models::{AttemptOptions, ProgressEvent, Task};
use super::registry::TaskRegistry;
use super::traits::{Extractor, ProgressEmitter};

#[derive(Debug, Clone)]
enum Behaviour {
    /// Write `<task_id>.<ext>` and report it
    Succeed(String),
    /// Report `<task_id>.<ext>` without writing it
    Phantom(String),
    Fail(String),
    /// Block until cancelled
    Hang,
}

/// Scripted result for one format selector
#[derive(Debug, Clone)]
pub(crate) struct Outcome {
    behaviour: Behaviour,
    hold: Option<Duration>,
}

impl Outcome {
    pub(crate) fn succeed(ext: &str) -> Self {
        Self {
            behaviour: Behaviour::Succeed(ext.to_string()),
            hold: None,
        }
    }

    pub(crate) fn phantom(ext: &str) -> Self {
        Self {
            behaviour: Behaviour::Phantom(ext.to_string()),
            hold: None,
        }
    }

    pub(crate) fn fail(message: &str) -> Self {
        Self {
            behaviour: Behaviour::Fail(message.to_string()),
            hold: None,
        }
    }

    pub(crate) fn hang() -> Self {
        Self {
            behaviour: Behaviour::Hang,
            hold: None,
        }
    }

    /// Pause after the "finished" event so tests can observe `processing`
    pub(crate) fn hold_after_progress(mut self, hold: Duration) -> Self {
        self.hold = Some(hold);
        self
    }
}

/// Extractor whose result per format selector is fixed up front.
/// Unscripted selectors fail.
#[derive(Default)]
pub(crate) struct ScriptedExtractor {
    script: HashMap<String, Outcome>,
    calls: Mutex<Vec<String>>,
    attempts: Mutex<Vec<AttemptOptions>>,
}

impl ScriptedExtractor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on(mut self, format: &str, outcome: Outcome) -> Self {
        self.script.insert(format.to_string(), outcome);
        self
    }

    /// Format selectors requested so far, in order
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Options of every attempt, in order
    pub(crate) fn attempts(&self) -> Vec<AttemptOptions> {
        self.attempts.lock().unwrap().clone()
    }

    pub(crate) fn last_options(&self) -> Option<AttemptOptions> {
        self.attempts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch(
        &self,
        _url: &str,
        options: &AttemptOptions,
        progress: &ProgressEmitter,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        self.calls.lock().unwrap().push(options.format.clone());
        self.attempts.lock().unwrap().push(options.clone());

        let Some(outcome) = self.script.get(&options.format).cloned() else {
            return Err(DownloadError::ExternalLibrary(format!(
                "ERROR: no script for {}",
                options.format
            )));
        };

        let ext = match &outcome.behaviour {
            Behaviour::Fail(message) => {
                return Err(DownloadError::ExternalLibrary(message.clone()))
            }
            Behaviour::Hang => {
                cancel.cancelled().await;
                return Err(DownloadError::Cancelled);
            }
            Behaviour::Succeed(ext) | Behaviour::Phantom(ext) => ext.clone(),
        };

        for downloaded in [256u64, 512] {
            progress.emit(ProgressEvent::Downloading {
                downloaded_bytes: downloaded,
                total_bytes: Some(1024),
            });
        }
        progress.emit(ProgressEvent::Finished);

        if let Some(hold) = outcome.hold {
            tokio::select! {
                _ = tokio::time::sleep(hold) => {}
                _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            }
        }

        let path = PathBuf::from(options.output_template.replace("%(ext)s", &ext));
        if matches!(outcome.behaviour, Behaviour::Succeed(_)) {
            tokio::fs::write(&path, b"media").await?;
        }
        Ok(path)
    }
}

/// Poll the registry until the task is completed or errored
pub(crate) async fn wait_for_terminal(registry: &TaskRegistry, id: &str) -> Task {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let task = registry.get(id).expect("task should exist");
        if task.status.is_terminal() {
            return task;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {} did not finish, last state {:?}",
            id,
            task
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
