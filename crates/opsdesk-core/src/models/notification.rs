use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A notification as returned by the pull collaborator. Identity is `id`.
///
/// `is_read` only changes when the server confirms a mark-read; the core
/// never flips it locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    #[serde(deserialize_with = "super::deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl NotificationRecord {
    pub fn unread_count(records: &[NotificationRecord]) -> usize {
        records.iter().filter(|r| !r.is_read).count()
    }
}
