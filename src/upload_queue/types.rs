//! Type definitions for the upload queue system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage bucket used when the caller leaves the bucket name empty
pub const DEFAULT_BUCKET_NAME: &str = "screenshots";

/// Grace period before asking the host to re-hide after a successful
/// background-triggered upload
pub const MINIMIZE_GRACE_MS: u64 = 1000;

/// How deep the retry recovery scan descends into the screenshots directory
pub const RECOVERY_SCAN_DEPTH: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Uploading,
    Success,
    Error,
    Cancelled,
}

/// One upload attempt. Mutated only by the engine; presentation reads
/// snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    /// Creation ordinal; unique and monotonically increasing
    pub id: u64,
    #[serde(rename = "signalId")]
    pub signal_id: String,
    #[serde(rename = "signalName")]
    pub signal_name: String,
    pub url: String,
    #[serde(rename = "bucketName")]
    pub bucket_name: String,
    #[serde(rename = "sportId")]
    pub sport_id: String,
    #[serde(rename = "assignedUserId")]
    pub assigned_user_id: String,
    #[serde(rename = "filePath")]
    pub file_path: PathBuf,
    /// Set at most once, never changed afterwards
    #[serde(rename = "detectedLinkId")]
    pub detected_link_id: Option<String>,
    pub status: UploadStatus,
    /// Present only when status is `Error`
    pub error: Option<String>,
    /// Present only when status is `Success`
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Whether the host window was hidden when the capture was enqueued
    #[serde(rename = "backgroundCapture")]
    pub background_capture: bool,
}

/// Enqueue inputs gathered from capture + session context
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub signal_id: String,
    pub signal_name: String,
    pub url: String,
    pub bucket_name: String,
    pub sport_id: String,
    pub assigned_user_id: String,
    pub file_path: PathBuf,
}
