//! Upload queue engine: the ordered collection of upload attempts.
//!
//! Owns the queue state, the per-item async pipeline, duplicate-URL
//! reconciliation, and the manual retry path. Presentation reads
//! snapshots and events; every mutation goes through the operations on
//! [`UploadQueue`].

mod processor;
mod queue_manager;
mod reconcile;
mod types;

pub use reconcile::DuplicateDecision;
pub use types::{EnqueueRequest, QueueItem, UploadStatus, DEFAULT_BUCKET_NAME};

use crate::api::BackendGateway;
use crate::config::SigCapConfig;
use crate::events::{EventBus, EventReceiver, QueueEventPayload};
use crate::host::HostWindow;
use crate::logging::{log_info, log_warn};
use processor::UploadPipeline;
use queue_manager::SharedQueue;
use reconcile::PendingPrompts;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use types::MINIMIZE_GRACE_MS;

#[derive(Clone)]
pub struct UploadQueue {
    queue: SharedQueue,
    next_id: Arc<AtomicU64>,
    prompts: PendingPrompts,
    bus: EventBus,
    gateway: Arc<dyn BackendGateway>,
    host: Arc<dyn HostWindow>,
    screenshots_dir: PathBuf,
    auto_minimize: bool,
    minimize_grace: Duration,
}

impl std::fmt::Debug for UploadQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadQueue")
            .field("queue", &"<queued items>")
            .field("prompts", &self.prompts.len())
            .field("screenshots_dir", &self.screenshots_dir)
            .field("auto_minimize", &self.auto_minimize)
            .finish()
    }
}

impl UploadQueue {
    pub fn new(
        gateway: Arc<dyn BackendGateway>,
        host: Arc<dyn HostWindow>,
        config: &SigCapConfig,
    ) -> Self {
        Self {
            queue: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            prompts: PendingPrompts::new(),
            bus: EventBus::new(256),
            gateway,
            host,
            screenshots_dir: config.screenshots_dir(),
            auto_minimize: config.auto_minimize_after_upload,
            minimize_grace: Duration::from_millis(MINIMIZE_GRACE_MS),
        }
    }

    /// Shorten the post-success minimize grace period (tests)
    pub fn with_minimize_grace(mut self, grace: Duration) -> Self {
        self.minimize_grace = grace;
        self
    }

    /// Subscribe to queue events (presentation data feed)
    pub fn subscribe(&self) -> EventReceiver {
        self.bus.subscribe()
    }

    /// Validate and append an upload attempt, newest first. Returns `None`
    /// on any missing required field without touching the queue. The
    /// pipeline runs in the background; this call never blocks on I/O.
    pub fn enqueue(&self, request: EnqueueRequest) -> Option<u64> {
        let background_capture = !self.host.is_visible();
        let item = queue_manager::enqueue(&self.queue, &self.next_id, request, background_capture)?;
        let item_id = item.id;

        log_info(
            "upload-queue",
            &format!("Enqueued item {} for {}", item_id, item.url),
        )
        .unwrap_or_default();

        self.bus.publish(QueueEventPayload::ItemUpdated { item });
        self.pipeline().spawn(item_id);

        Some(item_id)
    }

    /// Snapshot of all items, newest first
    pub fn items(&self) -> Vec<QueueItem> {
        queue_manager::snapshot(&self.queue)
    }

    pub fn get_item(&self, item_id: u64) -> Option<QueueItem> {
        queue_manager::get_item(&self.queue, item_id)
    }

    /// Operator decision for a pending duplicate prompt; returns false if
    /// no prompt is waiting for the item
    pub fn resolve_duplicate(&self, item_id: u64, decision: DuplicateDecision) -> bool {
        self.prompts.resolve(item_id, decision)
    }

    /// Popup dismissed without an explicit choice: treated as Cancel
    pub fn dismiss_duplicate(&self, item_id: u64) -> bool {
        self.prompts.resolve(item_id, DuplicateDecision::Cancel)
    }

    /// Global close-popups shortcut: cancel every pending duplicate prompt
    pub fn cancel_all_prompts(&self) -> usize {
        let cancelled = self.prompts.cancel_all();
        if cancelled > 0 {
            log_info(
                "upload-queue",
                &format!("Cancelled {} pending duplicate prompt(s)", cancelled),
            )
            .unwrap_or_default();
        }
        cancelled
    }

    pub fn pending_prompt_count(&self) -> usize {
        self.prompts.len()
    }

    /// Re-run the upload step for a failed item. Requires an error status
    /// and a recorded detected link id; anything else is a no-op (the
    /// queue is untouched and no network call is made). A missing file is
    /// recovered from the screenshots directory when possible.
    pub fn retry(&self, item_id: u64) -> Result<(), String> {
        let item = self
            .get_item(item_id)
            .ok_or_else(|| "Item not found in queue".to_string())?;

        if item.status != UploadStatus::Error {
            return Err("Only failed items can be retried".to_string());
        }
        if item.detected_link_id.is_none() {
            return Err(
                "No detected link was created for this item; capture and enqueue again".to_string(),
            );
        }

        if !item.file_path.exists() {
            let file_name = item
                .file_path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.to_string());

            match processor::recover_capture_file(
                &self.screenshots_dir,
                file_name.as_deref(),
                &item.url,
            ) {
                Some(recovered) => {
                    log_warn(
                        "upload-queue",
                        &format!(
                            "Screenshot for item {} moved; recovered at {}",
                            item_id,
                            recovered.display()
                        ),
                    )
                    .unwrap_or_default();
                    queue_manager::update_item(&self.queue, item_id, |item| {
                        item.file_path = recovered;
                    });
                }
                None => {
                    let message = format!(
                        "Screenshot file not found at {} and no matching file in {}",
                        item.file_path.display(),
                        self.screenshots_dir.display()
                    );
                    let updated = queue_manager::update_item(&self.queue, item_id, |item| {
                        item.error = Some(message.clone());
                    });
                    if let Some(updated) = updated {
                        self.bus.publish(QueueEventPayload::ItemUpdated { item: updated });
                    }
                    return Err(message);
                }
            }
        }

        let updated = queue_manager::update_item(&self.queue, item_id, |item| {
            item.status = UploadStatus::Uploading;
            item.error = None;
        });
        if let Some(updated) = updated {
            self.bus.publish(QueueEventPayload::ItemUpdated { item: updated });
        }

        self.pipeline().spawn_retry(item_id);
        Ok(())
    }

    /// Remove a single item regardless of status
    pub fn remove_item(&self, item_id: u64) -> Result<(), String> {
        queue_manager::remove_item(&self.queue, item_id)?;
        self.prompts.discard(item_id);
        self.bus.publish(QueueEventPayload::ItemRemoved { item_id });
        Ok(())
    }

    /// Remove every non-error item; error items stay until the operator
    /// deals with them. Returns the count removed.
    pub fn clear_non_errors(&self) -> usize {
        let removed_ids = queue_manager::clear_non_errors(&self.queue);

        // A cleared item may still be parked on a duplicate prompt; resolve
        // it to Cancel so the prompt disappears and its pipeline task exits
        for item_id in &removed_ids {
            self.prompts.resolve(*item_id, DuplicateDecision::Cancel);
        }

        let removed = removed_ids.len();
        self.bus.publish(QueueEventPayload::QueueCleared { removed });
        removed
    }

    fn pipeline(&self) -> UploadPipeline {
        UploadPipeline {
            queue: Arc::clone(&self.queue),
            gateway: Arc::clone(&self.gateway),
            host: Arc::clone(&self.host),
            prompts: self.prompts.clone(),
            bus: self.bus.clone(),
            auto_minimize: self.auto_minimize,
            minimize_grace: self.minimize_grace,
        }
    }
}
