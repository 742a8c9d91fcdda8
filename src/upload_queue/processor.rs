//! Per-item async upload pipeline.
//!
//! Each enqueued item gets its own task: existence check, duplicate
//! reconciliation, link creation, image upload. Items run independently;
//! a blocked duplicate prompt never stalls the rest of the queue. Every
//! failure is absorbed into the item's error field, never propagated.

use crate::api::BackendGateway;
use crate::capture::sanitize_domain;
use crate::events::{EventBus, QueueEventPayload};
use crate::host::HostWindow;
use crate::logging::{log_error, log_info, log_warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use walkdir::WalkDir;

use super::queue_manager::{self, SharedQueue};
use super::reconcile::{DuplicateDecision, PendingPrompts};
use super::types::{QueueItem, UploadStatus, RECOVERY_SCAN_DEPTH};

/// Everything a pipeline task needs, cloned out of the queue facade
#[derive(Clone)]
pub(super) struct UploadPipeline {
    pub(super) queue: SharedQueue,
    pub(super) gateway: Arc<dyn BackendGateway>,
    pub(super) host: Arc<dyn HostWindow>,
    pub(super) prompts: PendingPrompts,
    pub(super) bus: EventBus,
    pub(super) auto_minimize: bool,
    pub(super) minimize_grace: Duration,
}

impl UploadPipeline {
    /// Spawn the full pipeline for a freshly enqueued item
    pub(super) fn spawn(self, item_id: u64) {
        tokio::spawn(async move {
            self.run(item_id).await;
        });
    }

    /// Spawn the retry path: upload only, no existence check or link
    /// creation
    pub(super) fn spawn_retry(self, item_id: u64) {
        tokio::spawn(async move {
            let Some(item) = queue_manager::get_item(&self.queue, item_id) else {
                return;
            };
            let Some(link_id) = item.detected_link_id.clone() else {
                return;
            };
            log_info(
                "upload-queue",
                &format!("Retrying upload for item {} against link {}", item_id, link_id),
            )
            .unwrap_or_default();
            self.upload(&item, &link_id, false).await;
        });
    }

    async fn run(self, item_id: u64) {
        let Some(item) = queue_manager::get_item(&self.queue, item_id) else {
            return;
        };

        log_info(
            "upload-queue",
            &format!("Processing item {} for {}", item.id, item.url),
        )
        .unwrap_or_default();

        let Some(link_id) = self.resolve_link(&item).await else {
            // Item reached a terminal state (error or cancelled)
            return;
        };

        if let Some(updated) = queue_manager::set_detected_link(&self.queue, item.id, &link_id) {
            self.publish_item(updated);
        }

        self.upload(&item, &link_id, true).await;
    }

    /// Existence check, duplicate reconciliation, and link creation.
    /// Returns the detected link id to upload against, or `None` when the
    /// item is terminal.
    async fn resolve_link(&self, item: &QueueItem) -> Option<String> {
        let check = match self.gateway.check_exists(&item.url, &item.sport_id).await {
            Ok(check) => check,
            Err(e) => {
                self.fail(item.id, format!("URL check failed: {}", e));
                return None;
            }
        };

        if check.exists {
            match self.reconcile_duplicate(item).await {
                DuplicateDecision::Cancel => {
                    let updated = queue_manager::update_item(&self.queue, item.id, |item| {
                        item.status = UploadStatus::Cancelled;
                    });
                    if let Some(updated) = updated {
                        self.publish_item(updated);
                    }
                    log_info(
                        "upload-queue",
                        &format!("Item {} cancelled by operator (duplicate URL)", item.id),
                    )
                    .unwrap_or_default();
                    return None;
                }
                DuplicateDecision::Continue => {
                    // The first check's result is not trusted as durable;
                    // re-check for a fresh link id
                    return self.refresh_link_id(item).await;
                }
            }
        }

        self.create_link(item).await
    }

    /// Continue path after a duplicate prompt: fetch the existing record's
    /// id again, falling back to creation if it vanished meanwhile
    async fn refresh_link_id(&self, item: &QueueItem) -> Option<String> {
        match self.gateway.check_exists(&item.url, &item.sport_id).await {
            Err(e) => {
                self.fail(item.id, format!("URL re-check failed: {}", e));
                None
            }
            Ok(fresh) if fresh.exists => match fresh.detected_link_id {
                Some(link_id) => Some(link_id),
                None => {
                    self.fail(
                        item.id,
                        "Existing detected link reported without an id".to_string(),
                    );
                    None
                }
            },
            Ok(_) => {
                // Record disappeared between the prompt and the re-check
                log_warn(
                    "upload-queue",
                    &format!(
                        "Duplicate for item {} vanished on re-check, creating a new link",
                        item.id
                    ),
                )
                .unwrap_or_default();
                self.create_link(item).await
            }
        }
    }

    async fn reconcile_duplicate(&self, item: &QueueItem) -> DuplicateDecision {
        let rx = self.prompts.register(item.id);
        self.bus.publish(QueueEventPayload::DuplicateDetected {
            item_id: item.id,
            url: item.url.clone(),
        });

        log_info(
            "upload-queue",
            &format!("Duplicate URL for item {}, awaiting operator decision", item.id),
        )
        .unwrap_or_default();

        // A dropped prompt resolves to Cancel, same as a dismissed popup
        let decision = rx.await.unwrap_or(DuplicateDecision::Cancel);
        self.prompts.discard(item.id);
        decision
    }

    async fn create_link(&self, item: &QueueItem) -> Option<String> {
        match self
            .gateway
            .create_link(
                &item.url,
                &item.sport_id,
                &item.signal_id,
                &item.assigned_user_id,
            )
            .await
        {
            Ok(link_id) => Some(link_id),
            Err(e) => {
                self.fail(
                    item.id,
                    format!(
                        "Failed to create detected link: {}. Make sure the backend service is reachable.",
                        e
                    ),
                );
                None
            }
        }
    }

    /// Step 3 (+4): upload the image and record the outcome. The local
    /// file is never deleted, success or failure.
    async fn upload(&self, item: &QueueItem, link_id: &str, allow_minimize: bool) {
        match self
            .gateway
            .upload_image(&item.file_path, link_id, &item.bucket_name)
            .await
        {
            Ok(image_url) => {
                let updated = queue_manager::update_item(&self.queue, item.id, |item| {
                    item.status = UploadStatus::Success;
                    item.error = None;
                    item.image_url = Some(image_url.clone());
                });
                if let Some(updated) = updated {
                    self.publish_item(updated);
                }
                log_info(
                    "upload-queue",
                    &format!(
                        "Upload successful for item {} into bucket {}",
                        item.id, item.bucket_name
                    ),
                )
                .unwrap_or_default();

                if allow_minimize && item.background_capture && self.auto_minimize {
                    self.request_minimize(item.id).await;
                }
            }
            Err(e) => {
                self.fail(item.id, format!("Upload failed: {}", e));
            }
        }
    }

    /// Post-success: captures triggered from the tray re-hide the host
    /// after a short grace period
    async fn request_minimize(&self, item_id: u64) {
        sleep(self.minimize_grace).await;
        self.bus
            .publish(QueueEventPayload::MinimizeRequested { item_id });
        self.host.minimize_to_background();
        log_info(
            "upload-queue",
            &format!("Requested host minimize after item {}", item_id),
        )
        .unwrap_or_default();
    }

    fn fail(&self, item_id: u64, message: String) {
        log_error(
            "upload-queue",
            &format!("Item {} failed: {}", item_id, message),
        )
        .unwrap_or_default();

        let updated = queue_manager::update_item(&self.queue, item_id, |item| {
            item.status = UploadStatus::Error;
            item.error = Some(message);
        });
        if let Some(updated) = updated {
            self.publish_item(updated);
        }
    }

    fn publish_item(&self, item: QueueItem) {
        self.bus.publish(QueueEventPayload::ItemUpdated { item });
    }
}

/// Recovery heuristic for retry when the recorded file path is gone:
/// look in the screenshots directory for the same file name, then for
/// the newest file whose name starts with the item URL's domain prefix
/// (the capture provider names files `domain_user_timestamp.png`).
pub(super) fn recover_capture_file(
    screenshots_dir: &Path,
    file_name: Option<&str>,
    url: &str,
) -> Option<PathBuf> {
    if !screenshots_dir.is_dir() {
        return None;
    }

    let entries: Vec<PathBuf> = WalkDir::new(screenshots_dir)
        .max_depth(RECOVERY_SCAN_DEPTH)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();

    if let Some(name) = file_name {
        if let Some(path) = entries
            .iter()
            .find(|path| path.file_name().and_then(|n| n.to_str()) == Some(name))
        {
            return Some(path.clone());
        }
    }

    let prefix = sanitize_domain(url)?;
    let mut candidates: Vec<&PathBuf> = entries
        .iter()
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(&prefix))
                .unwrap_or(false)
        })
        .collect();

    // Newest capture wins when several match the domain
    candidates.sort_by_key(|path| {
        std::fs::metadata(path)
            .and_then(|meta| meta.modified())
            .ok()
    });
    candidates.pop().cloned()
}
