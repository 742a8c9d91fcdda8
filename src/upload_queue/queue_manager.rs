//! Queue operations - enqueue validation, lookup, update, remove, clear.
//!
//! All mutations happen under the queue mutex and are synchronous; the
//! async pipeline in `processor` goes through these helpers between its
//! suspension points.

use crate::logging::log_warn;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::types::{EnqueueRequest, QueueItem, UploadStatus, DEFAULT_BUCKET_NAME};

pub type SharedQueue = Arc<Mutex<Vec<QueueItem>>>;

/// Validate an enqueue request and prepend the new item (newest first).
/// Returns `None` on any missing required field; the queue is untouched.
pub fn enqueue(
    queue: &SharedQueue,
    next_id: &Arc<AtomicU64>,
    request: EnqueueRequest,
    background_capture: bool,
) -> Option<QueueItem> {
    if let Some(reason) = validate(&request) {
        log_warn("upload-queue", &format!("Rejecting enqueue: {}", reason)).unwrap_or_default();
        return None;
    }

    let bucket_name = if request.bucket_name.trim().is_empty() {
        DEFAULT_BUCKET_NAME.to_string()
    } else {
        request.bucket_name
    };

    let item = QueueItem {
        id: next_id.fetch_add(1, Ordering::SeqCst),
        signal_id: request.signal_id,
        signal_name: request.signal_name,
        url: request.url,
        bucket_name,
        sport_id: request.sport_id,
        assigned_user_id: request.assigned_user_id,
        file_path: request.file_path,
        detected_link_id: None,
        status: UploadStatus::Uploading,
        error: None,
        image_url: None,
        timestamp: Utc::now(),
        background_capture,
    };

    if let Ok(mut queue) = queue.lock() {
        queue.insert(0, item.clone());
    }

    Some(item)
}

fn validate(request: &EnqueueRequest) -> Option<String> {
    if request.signal_id.trim().is_empty() {
        return Some("missing signal id".to_string());
    }
    if request.sport_id.trim().is_empty() {
        return Some("missing sport id".to_string());
    }
    if request.assigned_user_id.trim().is_empty() {
        return Some("missing assigned user id".to_string());
    }
    if request.file_path.as_os_str().is_empty() {
        return Some("missing screenshot file path".to_string());
    }
    if !request.file_path.exists() {
        return Some(format!(
            "screenshot file not found: {}",
            request.file_path.display()
        ));
    }
    None
}

/// Snapshot of the queue for presentation (newest first)
pub fn snapshot(queue: &SharedQueue) -> Vec<QueueItem> {
    queue.lock().map(|q| q.clone()).unwrap_or_default()
}

pub fn get_item(queue: &SharedQueue, item_id: u64) -> Option<QueueItem> {
    queue
        .lock()
        .ok()
        .and_then(|q| q.iter().find(|item| item.id == item_id).cloned())
}

/// Apply a mutation to a single item; returns the updated copy
pub fn update_item<F>(queue: &SharedQueue, item_id: u64, mutate: F) -> Option<QueueItem>
where
    F: FnOnce(&mut QueueItem),
{
    let mut queue = queue.lock().ok()?;
    let item = queue.iter_mut().find(|item| item.id == item_id)?;
    mutate(item);
    Some(item.clone())
}

/// Record the backend link id; ignored if one is already set (the link id
/// identifies the backend aggregate and must not change)
pub fn set_detected_link(queue: &SharedQueue, item_id: u64, link_id: &str) -> Option<QueueItem> {
    update_item(queue, item_id, |item| {
        if item.detected_link_id.is_none() {
            item.detected_link_id = Some(link_id.to_string());
        }
    })
}

pub fn remove_item(queue: &SharedQueue, item_id: u64) -> Result<(), String> {
    let mut queue = queue.lock().map_err(|_| "Failed to lock queue".to_string())?;
    let before = queue.len();
    queue.retain(|item| item.id != item_id);

    if queue.len() < before {
        Ok(())
    } else {
        Err("Item not found in queue".to_string())
    }
}

/// Remove every item that is not in error state; error items stay for
/// operator attention. Returns the ids removed so the caller can release
/// anything still attached to them (pending duplicate prompts).
pub fn clear_non_errors(queue: &SharedQueue) -> Vec<u64> {
    if let Ok(mut queue) = queue.lock() {
        let (removed, kept): (Vec<QueueItem>, Vec<QueueItem>) = queue
            .drain(..)
            .partition(|item| item.status != UploadStatus::Error);
        *queue = kept;
        removed.into_iter().map(|item| item.id).collect()
    } else {
        Vec::new()
    }
}
