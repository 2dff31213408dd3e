// Extractor trait definition

use async_trait::async_trait;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use super::errors::DownloadError;
use super::models::{AttemptOptions, ProgressEvent};
use super::registry::{TaskRegistry, TaskUpdate};

/// External extraction/download component.
///
/// One call is one attempt: fetch `url` with the given options, report
/// progress through `progress`, and return the final on-disk path.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Name of the extractor (for logging)
    fn name(&self) -> &'static str;

    async fn fetch(
        &self,
        url: &str,
        options: &AttemptOptions,
        progress: &ProgressEmitter,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError>;
}

/// Progress callback bound to one task
#[derive(Clone)]
pub struct ProgressEmitter {
    registry: TaskRegistry,
    task_id: String,
}

impl ProgressEmitter {
    pub fn new(registry: TaskRegistry, task_id: impl Into<String>) -> Self {
        Self {
            registry,
            task_id: task_id.into(),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Downloading { .. } => {
                if let Some(pct) = event.percent() {
                    self.registry.update(&self.task_id, TaskUpdate::Progress(pct));
                }
            }
            ProgressEvent::Finished => {
                self.registry.update(&self.task_id, TaskUpdate::Processing);
            }
        }
    }
}
