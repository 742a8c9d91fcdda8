//! The single current "active URL" value.
//!
//! External detectors (clipboard watcher, browser extension relay) write
//! into it; the queue engine reads it once at enqueue time.

use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct UrlTracker {
    current: Arc<Mutex<Option<String>>>,
}

impl UrlTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_url(&self) -> Option<String> {
        self.current.lock().ok().and_then(|url| url.clone())
    }

    /// Update from a detector; empty strings are ignored
    pub fn set_current_url(&self, url: &str) {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return;
        }
        if let Ok(mut current) = self.current.lock() {
            *current = Some(trimmed.to_string());
        }
    }

    pub fn clear(&self) {
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
    }
}
