use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stored notification
///
/// Serialized with camelCase keys, which is also the shape pushed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: Uuid,

    /// Recipient user identity
    pub user_id: String,

    /// Producing application
    pub app_id: String,

    /// Grouping key within the application
    pub group_key: String,

    pub message: String,

    /// Free-form status supplied by the producer
    pub status: String,

    pub read_status: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Input for creating a notification record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub user_id: String,
    pub app_id: String,
    pub group_key: String,
    pub message: String,
    pub status: String,
}

impl NewNotification {
    /// Materialize an unread record with fresh id and timestamps
    pub fn into_record(self) -> NotificationRecord {
        let now = Utc::now();
        NotificationRecord {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            app_id: self.app_id,
            group_key: self.group_key,
            message: self.message,
            status: self.status,
            read_status: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Per-user notification preference record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub id: Uuid,
    pub user_id: String,
    pub enabled: bool,
}

/// Presence record kept in the shared presence store
///
/// One record per user identity. Written on connect and on preference
/// changes, deleted when the user's last connection closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPresence {
    pub id: String,
    pub connected_at: DateTime<Utc>,
    #[serde(alias = "enableNotification")]
    pub notifications_enabled: bool,
}

impl ClientPresence {
    pub fn new(id: impl Into<String>, notifications_enabled: bool) -> Self {
        Self {
            id: id.into(),
            connected_at: Utc::now(),
            notifications_enabled,
        }
    }
}
