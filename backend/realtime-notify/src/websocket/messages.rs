/// WebSocket frame types for the notification protocol
use crate::error::DecodeError;
use crate::models::{Configuration, NotificationRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Actions a client may send over an open connection
///
/// Every frame is a JSON object carrying an `action` verb. Unknown verbs decode
/// to `Unknown` and are ignored by the session.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientAction {
    MarkAsRead,

    MarkAppAsRead {
        #[serde(rename = "appId", default)]
        app_id: String,
    },

    MarkGroupAsRead {
        #[serde(rename = "appId", default)]
        app_id: String,
        #[serde(rename = "groupKey", default)]
        group_key: String,
    },

    MarkNotificationAsRead {
        #[serde(default)]
        id: String,
    },

    DeleteNotifications,

    DeleteAppNotifications {
        #[serde(rename = "appId", default)]
        app_id: String,
    },

    DeleteGroupNotifications {
        #[serde(rename = "appId", default)]
        app_id: String,
        #[serde(rename = "groupKey", default)]
        group_key: String,
    },

    DeleteNotification {
        #[serde(default)]
        id: String,
    },

    ReloadNotifications,

    ToggleNotificationStatus {
        #[serde(alias = "enableNotification")]
        enabled: bool,
    },

    #[serde(other)]
    Unknown,
}

impl ClientAction {
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Verb as it appears on the wire, for logging
    pub fn verb(&self) -> &'static str {
        match self {
            ClientAction::MarkAsRead => "MARK_AS_READ",
            ClientAction::MarkAppAsRead { .. } => "MARK_APP_AS_READ",
            ClientAction::MarkGroupAsRead { .. } => "MARK_GROUP_AS_READ",
            ClientAction::MarkNotificationAsRead { .. } => "MARK_NOTIFICATION_AS_READ",
            ClientAction::DeleteNotifications => "DELETE_NOTIFICATIONS",
            ClientAction::DeleteAppNotifications { .. } => "DELETE_APP_NOTIFICATIONS",
            ClientAction::DeleteGroupNotifications { .. } => "DELETE_GROUP_NOTIFICATIONS",
            ClientAction::DeleteNotification { .. } => "DELETE_NOTIFICATION",
            ClientAction::ReloadNotifications => "RELOAD_NOTIFICATIONS",
            ClientAction::ToggleNotificationStatus { .. } => "TOGGLE_NOTIFICATION_STATUS",
            ClientAction::Unknown => "UNKNOWN",
        }
    }
}

/// Frames pushed from server to client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action")]
pub enum OutboundMessage {
    /// Full unread list, replaces whatever the client holds
    #[serde(rename = "LIST_NOTIFICATIONS")]
    ListNotifications { data: Vec<NotificationRecord> },

    /// Current preference record
    #[serde(rename = "LIST_CONFIGURATIONS", rename_all = "camelCase")]
    ListConfigurations {
        user_id: String,
        enabled: bool,
        id: Uuid,
    },

    /// A single freshly created notification
    #[serde(rename = "newNotification")]
    NewNotification(NotificationRecord),
}

impl OutboundMessage {
    pub fn notification_list(data: Vec<NotificationRecord>) -> Self {
        OutboundMessage::ListNotifications { data }
    }

    pub fn configuration(config: &Configuration) -> Self {
        OutboundMessage::ListConfigurations {
            user_id: config.user_id.clone(),
            enabled: config.enabled,
            id: config.id,
        }
    }

    pub fn new_notification(record: NotificationRecord) -> Self {
        OutboundMessage::NewNotification(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewNotification;
    use serde_json::Value;

    fn record() -> NotificationRecord {
        NewNotification {
            user_id: "u1".to_string(),
            app_id: "billing".to_string(),
            group_key: "invoices".to_string(),
            message: "Invoice ready".to_string(),
            status: "info".to_string(),
        }
        .into_record()
    }

    #[test]
    fn test_decode_verbs_without_fields() {
        assert_eq!(
            ClientAction::decode(r#"{"action":"MARK_AS_READ"}"#).unwrap(),
            ClientAction::MarkAsRead
        );
        assert_eq!(
            ClientAction::decode(r#"{"action":"RELOAD_NOTIFICATIONS"}"#).unwrap(),
            ClientAction::ReloadNotifications
        );
    }

    #[test]
    fn test_decode_group_action_fields() {
        let action =
            ClientAction::decode(r#"{"action":"MARK_GROUP_AS_READ","appId":"a","groupKey":"g"}"#)
                .unwrap();
        assert_eq!(
            action,
            ClientAction::MarkGroupAsRead {
                app_id: "a".to_string(),
                group_key: "g".to_string()
            }
        );
    }

    #[test]
    fn test_decode_toggle_accepts_both_field_names() {
        let a = ClientAction::decode(r#"{"action":"TOGGLE_NOTIFICATION_STATUS","enabled":false}"#)
            .unwrap();
        let b = ClientAction::decode(
            r#"{"action":"TOGGLE_NOTIFICATION_STATUS","enableNotification":false}"#,
        )
        .unwrap();
        assert_eq!(a, b);
        assert_eq!(a, ClientAction::ToggleNotificationStatus { enabled: false });
    }

    #[test]
    fn test_decode_toggle_without_flag_is_malformed() {
        assert!(ClientAction::decode(r#"{"action":"TOGGLE_NOTIFICATION_STATUS"}"#).is_err());
    }

    #[test]
    fn test_decode_unknown_verb() {
        let action = ClientAction::decode(r#"{"action":"SUBSCRIBE_ALL"}"#).unwrap();
        assert_eq!(action, ClientAction::Unknown);
    }

    #[test]
    fn test_decode_malformed_json() {
        assert!(matches!(
            ClientAction::decode("{not json"),
            Err(DecodeError::MalformedMessage(_))
        ));
        assert!(ClientAction::decode(r#"{"appId":"a"}"#).is_err());
    }

    #[test]
    fn test_list_notifications_frame_shape() {
        let frame = OutboundMessage::notification_list(vec![record()]);
        let value: Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["action"], "LIST_NOTIFICATIONS");
        assert_eq!(value["data"][0]["appId"], "billing");
    }

    #[test]
    fn test_configuration_frame_shape() {
        let config = Configuration {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            enabled: true,
        };
        let value: Value = serde_json::to_value(OutboundMessage::configuration(&config)).unwrap();
        assert_eq!(value["action"], "LIST_CONFIGURATIONS");
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["enabled"], true);
        assert_eq!(value["id"], config.id.to_string());
    }

    #[test]
    fn test_new_notification_frame_is_flat() {
        let rec = record();
        let value: Value = serde_json::to_value(OutboundMessage::new_notification(rec.clone()))
            .unwrap();
        assert_eq!(value["action"], "newNotification");
        assert_eq!(value["id"], rec.id.to_string());
        assert_eq!(value["message"], "Invoice ready");
    }
}
