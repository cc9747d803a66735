/// Delivery hub
///
/// Serializes a payload once and writes it to every open connection of one
/// user. Connections whose write fails are pruned from the registry after the
/// write loop. There is no queue and no retry.
use super::messages::OutboundMessage;
use super::registry::{ConnectionId, ConnectionRegistry};
use crate::error::DeliveryError;
use crate::metrics;
use crate::models::{Configuration, NotificationRecord};
use crate::presence::PresenceStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct DeliveryHub {
    registry: ConnectionRegistry,
    presence: Arc<dyn PresenceStore>,
}

impl DeliveryHub {
    pub fn new(registry: ConnectionRegistry, presence: Arc<dyn PresenceStore>) -> Self {
        Self { registry, presence }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Push one freshly created notification to its recipient.
    pub async fn send_notification(
        &self,
        record: &NotificationRecord,
    ) -> Result<usize, DeliveryError> {
        let frame = OutboundMessage::new_notification(record.clone());
        self.send_to_user(&record.user_id, &frame, false).await
    }

    /// Push the full unread list, replacing the client's view.
    pub async fn send_notification_list(
        &self,
        user_id: &str,
        records: Vec<NotificationRecord>,
    ) -> Result<usize, DeliveryError> {
        let frame = OutboundMessage::notification_list(records);
        self.send_to_user(user_id, &frame, false).await
    }

    /// Push a configuration record. `bypass` skips the preference check so a
    /// client that disabled notifications still learns its own settings.
    pub async fn send_configuration(
        &self,
        config: &Configuration,
        bypass: bool,
    ) -> Result<usize, DeliveryError> {
        let frame = OutboundMessage::configuration(config);
        self.send_to_user(&config.user_id, &frame, bypass).await
    }

    /// Write `payload` to every open connection of `user_id`.
    ///
    /// Returns the number of connections written. A missing presence record
    /// counts as enabled.
    pub async fn send_to_user<T>(
        &self,
        user_id: &str,
        payload: &T,
        bypass: bool,
    ) -> Result<usize, DeliveryError>
    where
        T: Serialize + ?Sized,
    {
        let result = self.deliver(user_id, payload, bypass).await;
        match &result {
            Ok(_) => metrics::record_delivery("delivered"),
            Err(e) => {
                metrics::record_delivery(e.outcome());
                debug!(user_id = %user_id, error = %e, "Delivery skipped");
            }
        }
        result
    }

    async fn deliver<T>(&self, user_id: &str, payload: &T, bypass: bool) -> Result<usize, DeliveryError>
    where
        T: Serialize + ?Sized,
    {
        if !self.registry.is_connected(user_id).await {
            return Err(DeliveryError::UserNotConnected(user_id.to_string()));
        }

        if !bypass {
            if let Some(presence) = self.presence.get(user_id).await? {
                if !presence.notifications_enabled {
                    return Err(DeliveryError::NotificationsDisabled(user_id.to_string()));
                }
            }
        }

        let frame = serde_json::to_string(payload)?;

        let (delivered, dead) = {
            let Some(connections) = self.registry.snapshot(user_id).await else {
                return Err(DeliveryError::UserNotConnected(user_id.to_string()));
            };

            let mut delivered = 0;
            let mut dead: Vec<ConnectionId> = Vec::new();
            for connection in connections.iter() {
                match connection.send(frame.clone()) {
                    Ok(()) => delivered += 1,
                    Err(_) => dead.push(connection.id()),
                }
            }
            (delivered, dead)
        };

        if !dead.is_empty() {
            warn!(
                user_id = %user_id,
                pruned = dead.len(),
                "Pruning connections with failed writes"
            );
            for id in dead {
                metrics::record_delivery("pruned");
                self.registry.remove(user_id, id).await;
            }
        }

        if delivered == 0 {
            return Err(DeliveryError::ConnectionLost);
        }
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClientPresence, NewNotification};
    use crate::presence::InMemoryPresenceStore;
    use crate::websocket::registry::ConnectionHandle;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn hub() -> (DeliveryHub, InMemoryPresenceStore) {
        let presence = InMemoryPresenceStore::new();
        let store: Arc<dyn PresenceStore> = Arc::new(presence.clone());
        let registry = ConnectionRegistry::new(store.clone());
        (DeliveryHub::new(registry, store), presence)
    }

    async fn connect(hub: &DeliveryHub, user: &str) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle::new(tx);
        let id = handle.id();
        hub.registry().add(user, handle).await;
        (id, rx)
    }

    fn record(user: &str) -> NotificationRecord {
        NewNotification {
            user_id: user.to_string(),
            app_id: "a".to_string(),
            group_key: "g".to_string(),
            message: "hi".to_string(),
            status: "info".to_string(),
        }
        .into_record()
    }

    fn config(user: &str, enabled: bool) -> Configuration {
        Configuration {
            id: Uuid::new_v4(),
            user_id: user.to_string(),
            enabled,
        }
    }

    #[tokio::test]
    async fn test_send_to_unconnected_user() {
        let (hub, _) = hub();
        let result = hub.send_notification(&record("u1")).await;
        assert!(matches!(result, Err(DeliveryError::UserNotConnected(_))));
    }

    #[tokio::test]
    async fn test_send_reaches_every_connection() {
        let (hub, _) = hub();
        let (_, mut rx1) = connect(&hub, "u1").await;
        let (_, mut rx2) = connect(&hub, "u1").await;

        let delivered = hub.send_notification(&record("u1")).await.unwrap();
        assert_eq!(delivered, 2);

        let a = rx1.recv().await.unwrap();
        let b = rx2.recv().await.unwrap();
        assert_eq!(a, b);
        assert!(a.contains("\"action\":\"newNotification\""));
    }

    #[tokio::test]
    async fn test_missing_presence_counts_as_enabled() {
        let (hub, _) = hub();
        let (_, mut rx) = connect(&hub, "u1").await;

        hub.send_notification_list("u1", vec![]).await.unwrap();
        assert!(rx.recv().await.unwrap().contains("LIST_NOTIFICATIONS"));
    }

    #[tokio::test]
    async fn test_disabled_user_only_receives_bypassed_frames() {
        let (hub, presence) = hub();
        presence.put(&ClientPresence::new("u1", false)).await.unwrap();
        let (_, mut rx) = connect(&hub, "u1").await;

        let result = hub.send_notification(&record("u1")).await;
        assert!(matches!(result, Err(DeliveryError::NotificationsDisabled(_))));

        hub.send_configuration(&config("u1", false), true).await.unwrap();
        let frame = rx.recv().await.unwrap();
        assert!(frame.contains("LIST_CONFIGURATIONS"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_presence_outage_blocks_unbypassed_sends() {
        let (hub, presence) = hub();
        let (_, _rx) = connect(&hub, "u1").await;
        presence.set_unavailable(true);

        let result = hub.send_notification(&record("u1")).await;
        assert!(matches!(
            result,
            Err(DeliveryError::PresenceStoreUnavailable(_))
        ));

        assert_eq!(
            hub.send_configuration(&config("u1", true), true).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_broken_connection_is_pruned() {
        let (hub, _) = hub();
        let (_, mut alive) = connect(&hub, "u1").await;
        let (_, broken) = connect(&hub, "u1").await;
        drop(broken);

        let delivered = hub.send_notification(&record("u1")).await.unwrap();
        assert_eq!(delivered, 1);
        assert!(alive.recv().await.is_some());
        assert_eq!(hub.registry().connection_count("u1").await, 1);
    }

    #[tokio::test]
    async fn test_all_connections_broken() {
        let (hub, presence) = hub();
        presence.put(&ClientPresence::new("u1", true)).await.unwrap();
        let (_, rx) = connect(&hub, "u1").await;
        drop(rx);

        let result = hub.send_notification(&record("u1")).await;
        assert!(matches!(result, Err(DeliveryError::ConnectionLost)));
        assert!(!hub.registry().is_connected("u1").await);
        assert!(presence.get("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_other_users_are_untouched() {
        let (hub, _) = hub();
        let (_, mut rx1) = connect(&hub, "u1").await;
        let (_, mut rx2) = connect(&hub, "u2").await;

        hub.send_notification(&record("u1")).await.unwrap();
        assert!(rx1.recv().await.is_some());
        assert!(rx2.try_recv().is_err());
    }
}
