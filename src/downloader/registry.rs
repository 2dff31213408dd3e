//! In-memory task registry
//!
//! Shared between the HTTP handlers and every running download. Keys are
//! disjoint per task, so the concurrent map is the only synchronization
//! needed. The registry also enforces the lifecycle rules: a task never
//! leaves `completed` or `error`, progress never goes backwards, and the
//! file fields are written only when a task completes.

use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::models::{Task, TaskStatus};

/// Length of the short task id handed to clients
const TASK_ID_LEN: usize = 8;

/// One state change requested by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskUpdate {
    /// Bytes received; carries the computed percentage
    Progress(u8),
    /// Stream fetch finished, post-processing running
    Processing,
    Completed { file_path: String, filename: String },
    Failed(String),
}

struct TaskEntry {
    task: Task,
    cancel: CancellationToken,
    finished_at: Option<Instant>,
}

#[derive(Clone)]
pub struct TaskRegistry {
    tasks: Arc<DashMap<String, TaskEntry>>,
    /// Every id ever handed out, evicted ones included
    issued: Arc<DashSet<String>>,
    shutdown: CancellationToken,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(DashMap::new()),
            issued: Arc::new(DashSet::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Allocate a fresh id with a pending record
    pub fn create(&self) -> String {
        self.create_with(|| {
            Uuid::new_v4()
                .simple()
                .to_string()
                .chars()
                .take(TASK_ID_LEN)
                .collect()
        })
    }

    /// Draw candidates until one was never issued before, even if its
    /// record has since been evicted
    fn create_with(&self, mut next_id: impl FnMut() -> String) -> String {
        loop {
            let id = next_id();
            if self.issued.insert(id.clone()) {
                self.tasks.insert(
                    id.clone(),
                    TaskEntry {
                        task: Task::pending(),
                        cancel: self.shutdown.child_token(),
                        finished_at: None,
                    },
                );
                return id;
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.tasks.get(id).map(|entry| entry.task.clone())
    }

    /// Apply a state change. Returns false if the id is unknown or the
    /// change is not allowed (task already terminal).
    pub fn update(&self, id: &str, update: TaskUpdate) -> bool {
        let Some(mut entry) = self.tasks.get_mut(id) else {
            return false;
        };
        if entry.task.status.is_terminal() {
            tracing::debug!(task_id = id, ?update, "ignoring update for finished task");
            return false;
        }

        let task = &mut entry.task;
        match update {
            TaskUpdate::Progress(pct) => {
                task.status = TaskStatus::Downloading;
                task.progress = task.progress.max(pct.min(100));
            }
            TaskUpdate::Processing => {
                task.status = TaskStatus::Processing;
            }
            TaskUpdate::Completed {
                file_path,
                filename,
            } => {
                task.status = TaskStatus::Completed;
                task.progress = 100;
                task.file_path = Some(file_path);
                task.filename = Some(filename);
                task.error = None;
            }
            TaskUpdate::Failed(error) => {
                task.status = TaskStatus::Error;
                task.error = Some(error);
                task.file_path = None;
                task.filename = None;
            }
        }

        if entry.task.status.is_terminal() {
            entry.finished_at = Some(Instant::now());
        }
        true
    }

    /// Cancellation handle owned by the task's run
    pub fn cancellation_token(&self, id: &str) -> Option<CancellationToken> {
        self.tasks.get(id).map(|entry| entry.cancel.clone())
    }

    /// Request cancellation of a single task. Returns false for unknown
    /// or already finished tasks.
    pub fn cancel(&self, id: &str) -> bool {
        match self.tasks.get(id) {
            Some(entry) if !entry.task.status.is_terminal() => {
                entry.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Cancel every task, including ones created later
    pub fn cancel_all(&self) {
        self.shutdown.cancel();
    }

    /// Drop finished tasks whose terminal transition is older than `retention`
    pub fn evict_finished(&self, retention: Duration) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        self.tasks.retain(|_, entry| match entry.finished_at {
            Some(at) if now.duration_since(at) >= retention => {
                evicted += 1;
                false
            }
            _ => true,
        });
        evicted
    }

    /// Periodically evict finished tasks until the registry is shut down
    pub fn spawn_sweeper(&self, retention: Duration, every: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let evicted = registry.evict_finished(retention);
                        if evicted > 0 {
                            tracing::info!(evicted, remaining = registry.len(), "evicted finished tasks");
                        }
                    }
                    _ = registry.shutdown.cancelled() => break,
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}
