// Downloader module - task bookkeeping and format fallback around the extractor

pub mod diagnostics;
pub mod errors;
pub mod format_selector;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod traits;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use errors::{CookieError, DownloadError};
pub use format_selector::FormatPolicy;
pub use models::{AttemptOptions, DownloadSettings, FormatKind, ProgressEvent, Task, TaskStatus};
pub use orchestrator::{CompletedFile, Downloader};
pub use registry::{TaskRegistry, TaskUpdate};
pub use traits::{Extractor, ProgressEmitter};
