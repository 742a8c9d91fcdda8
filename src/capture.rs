//! Capture provider contract and screenshot naming helpers.
//!
//! Screen-capture acquisition itself is an external collaborator; the
//! engine only sees the `Screenshot` value object.

use crate::error::SigCapError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A captured screenshot on local disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Screenshot {
    #[serde(rename = "filePath")]
    pub file_path: PathBuf,
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "capturedAt")]
    pub captured_at: DateTime<Utc>,
}

pub trait CaptureProvider: Send + Sync {
    fn capture(&self) -> Result<Screenshot, SigCapError>;
}

/// Filename-safe domain of a URL, dots replaced with underscores
pub fn sanitize_domain(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.replace('.', "_"))
}

/// Screenshot filename convention: `domain_user_timestamp.png`.
/// The retry recovery heuristic relies on the domain prefix.
pub fn screenshot_file_name(url: &str, username: &str, at: DateTime<Utc>) -> String {
    let domain = sanitize_domain(url).unwrap_or_else(|| "unknown".to_string());
    let user = username.replace('.', "_");
    format!("{}_{}_{}.png", domain, user, at.format("%Y%m%d_%H%M%S"))
}
