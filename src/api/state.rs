//! Application state for the API server

use crate::downloader::{Downloader, TaskRegistry};

/// Shared state handed to every route handler.
///
/// Cloned per request; the downloader is a bundle of `Arc`s.
#[derive(Clone)]
pub struct AppState {
    pub downloader: Downloader,
}

impl AppState {
    pub fn new(downloader: Downloader) -> Self {
        Self { downloader }
    }

    pub fn registry(&self) -> &TaskRegistry {
        self.downloader.registry()
    }
}
