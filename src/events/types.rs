use crate::upload_queue::QueueItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sequence number for ordering events
pub type EventSequence = u64;

/// All queue-related events observed by the presentation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEvent {
    pub sequence: EventSequence,
    pub timestamp: DateTime<Utc>,
    pub payload: QueueEventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEventPayload {
    /// Item enqueued or any status/field change
    ItemUpdated { item: QueueItem },

    /// Item removed by operator action
    ItemRemoved { item_id: u64 },

    /// Bulk clear of non-error items
    QueueCleared { removed: usize },

    /// A detected link already exists for the item's URL; the operator
    /// must choose Continue or Cancel
    DuplicateDetected { item_id: u64, url: String },

    /// Post-success signal: the host should re-hide itself
    MinimizeRequested { item_id: u64 },
}

impl QueueEvent {
    pub fn item_id(&self) -> Option<u64> {
        match &self.payload {
            QueueEventPayload::ItemUpdated { item } => Some(item.id),
            QueueEventPayload::ItemRemoved { item_id } => Some(*item_id),
            QueueEventPayload::QueueCleared { .. } => None,
            QueueEventPayload::DuplicateDetected { item_id, .. } => Some(*item_id),
            QueueEventPayload::MinimizeRequested { item_id } => Some(*item_id),
        }
    }

    pub fn payload_type(&self) -> &str {
        match &self.payload {
            QueueEventPayload::ItemUpdated { .. } => "item_updated",
            QueueEventPayload::ItemRemoved { .. } => "item_removed",
            QueueEventPayload::QueueCleared { .. } => "queue_cleared",
            QueueEventPayload::DuplicateDetected { .. } => "duplicate_detected",
            QueueEventPayload::MinimizeRequested { .. } => "minimize_requested",
        }
    }
}
