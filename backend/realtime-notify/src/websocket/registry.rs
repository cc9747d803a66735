/// Connection registry
///
/// Tracks every open WebSocket connection per user. All mutations take the
/// exclusive lock. Senders read through a shared guard that stays held for the
/// whole write loop, so a concurrent `remove` cannot race a delivery.
use crate::error::DeliveryError;
use crate::metrics;
use crate::presence::PresenceStore;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock, RwLockReadGuard};
use tracing::{debug, warn};
use uuid::Uuid;

/// Outbound half of a connection: serialized text frames
pub type FrameSender = mpsc::UnboundedSender<String>;

/// Unique identifier for one open connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Registered connection: its id and the channel feeding its socket writer
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: FrameSender,
}

impl ConnectionHandle {
    pub fn new(sender: FrameSender) -> Self {
        Self {
            id: ConnectionId::new(),
            sender,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Fails once the socket writer has gone away.
    pub fn send(&self, frame: String) -> Result<(), DeliveryError> {
        self.sender
            .send(frame)
            .map_err(|_| DeliveryError::ConnectionLost)
    }
}

#[derive(Clone)]
pub struct ConnectionRegistry {
    // user_id -> open connections
    inner: Arc<RwLock<HashMap<String, Vec<ConnectionHandle>>>>,
    presence: Arc<dyn PresenceStore>,
}

impl ConnectionRegistry {
    pub fn new(presence: Arc<dyn PresenceStore>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            presence,
        }
    }

    /// Register a connection for a user. Adding the same connection twice is a no-op.
    pub async fn add(&self, user_id: &str, handle: ConnectionHandle) {
        let mut guard = self.inner.write().await;
        let connections = guard.entry(user_id.to_string()).or_default();

        if connections.iter().any(|c| c.id == handle.id) {
            return;
        }

        let connection_id = handle.id;
        connections.push(handle);
        metrics::connection_opened();

        debug!(
            user_id = %user_id,
            connection_id = %connection_id,
            total = connections.len(),
            "Connection registered"
        );
    }

    /// Remove one connection. Removing an unknown connection is a no-op.
    ///
    /// When the user's last connection goes, the presence record is deleted.
    /// That deletion is best-effort and happens after the lock is released.
    pub async fn remove(&self, user_id: &str, connection_id: ConnectionId) -> bool {
        let last_gone = {
            let mut guard = self.inner.write().await;
            let Some(connections) = guard.get_mut(user_id) else {
                return false;
            };

            let before = connections.len();
            connections.retain(|c| c.id != connection_id);
            if connections.len() == before {
                return false;
            }
            metrics::connections_closed(1);

            debug!(
                user_id = %user_id,
                connection_id = %connection_id,
                remaining = connections.len(),
                "Connection removed"
            );

            if connections.is_empty() {
                guard.remove(user_id);
                true
            } else {
                false
            }
        };

        if last_gone {
            self.forget_presence(user_id).await;
        }
        true
    }

    /// Remove every connection for a user and return how many there were.
    pub async fn drop_user(&self, user_id: &str) -> usize {
        let removed = {
            let mut guard = self.inner.write().await;
            guard.remove(user_id).map(|v| v.len()).unwrap_or(0)
        };

        if removed > 0 {
            metrics::connections_closed(removed);
            self.forget_presence(user_id).await;
        }
        removed
    }

    /// Shared view of a user's connections, `None` if the user has none.
    ///
    /// Holders block registry mutations until the guard is dropped.
    pub async fn snapshot(&self, user_id: &str) -> Option<RwLockReadGuard<'_, [ConnectionHandle]>> {
        let guard = self.inner.read().await;
        RwLockReadGuard::try_map(guard, |map| map.get(user_id).map(|v| v.as_slice())).ok()
    }

    pub async fn is_connected(&self, user_id: &str) -> bool {
        self.inner.read().await.contains_key(user_id)
    }

    pub async fn connection_count(&self, user_id: &str) -> usize {
        let guard = self.inner.read().await;
        guard.get(user_id).map(|v| v.len()).unwrap_or(0)
    }

    pub async fn total_connections(&self) -> usize {
        let guard = self.inner.read().await;
        guard.values().map(|v| v.len()).sum()
    }

    pub async fn connected_users_count(&self) -> usize {
        self.inner.read().await.len()
    }

    async fn forget_presence(&self, user_id: &str) {
        if let Err(e) = self.presence.delete(user_id).await {
            warn!(user_id = %user_id, error = %e, "Failed to delete presence record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClientPresence;
    use crate::presence::InMemoryPresenceStore;

    fn registry() -> (ConnectionRegistry, InMemoryPresenceStore) {
        let presence = InMemoryPresenceStore::new();
        (ConnectionRegistry::new(Arc::new(presence.clone())), presence)
    }

    fn handle() -> (ConnectionHandle, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(tx), rx)
    }

    #[tokio::test]
    async fn test_registry_creation() {
        let (registry, _) = registry();
        assert_eq!(registry.total_connections().await, 0);
        assert_eq!(registry.connected_users_count().await, 0);
    }

    #[tokio::test]
    async fn test_multiple_connections_same_user() {
        let (registry, _) = registry();
        let mut receivers = vec![];

        for _ in 0..3 {
            let (h, rx) = handle();
            registry.add("u1", h).await;
            receivers.push(rx);
        }

        assert_eq!(registry.connection_count("u1").await, 3);
        assert_eq!(registry.total_connections().await, 3);
        assert_eq!(registry.connected_users_count().await, 1);
    }

    #[tokio::test]
    async fn test_add_same_connection_twice_is_noop() {
        let (registry, _) = registry();
        let (h, _rx) = handle();

        registry.add("u1", h.clone()).await;
        registry.add("u1", h).await;

        assert_eq!(registry.connection_count("u1").await, 1);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (registry, _) = registry();
        let (h, _rx) = handle();
        let id = h.id();
        registry.add("u1", h).await;

        assert!(registry.remove("u1", id).await);
        assert!(!registry.remove("u1", id).await);
        assert!(!registry.remove("nobody", ConnectionId::new()).await);
        assert!(!registry.is_connected("u1").await);
    }

    #[tokio::test]
    async fn test_remove_last_connection_deletes_presence() {
        let (registry, presence) = registry();
        presence.put(&ClientPresence::new("u1", true)).await.unwrap();

        let (a, _rx_a) = handle();
        let (b, _rx_b) = handle();
        let (a_id, b_id) = (a.id(), b.id());
        registry.add("u1", a).await;
        registry.add("u1", b).await;

        registry.remove("u1", a_id).await;
        assert!(presence.get("u1").await.unwrap().is_some());

        registry.remove("u1", b_id).await;
        assert!(presence.get("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_presence_failure_does_not_block_removal() {
        let (registry, presence) = registry();
        let (h, _rx) = handle();
        let id = h.id();
        registry.add("u1", h).await;

        presence.set_unavailable(true);
        assert!(registry.remove("u1", id).await);
        assert_eq!(registry.connection_count("u1").await, 0);
    }

    #[tokio::test]
    async fn test_drop_user() {
        let (registry, _) = registry();
        for _ in 0..2 {
            let (h, _rx) = handle();
            registry.add("u1", h).await;
        }
        let (other, _rx) = handle();
        registry.add("u2", other).await;

        assert_eq!(registry.drop_user("u1").await, 2);
        assert_eq!(registry.drop_user("u1").await, 0);
        assert_eq!(registry.total_connections().await, 1);
    }

    #[tokio::test]
    async fn test_snapshot_lists_connections() {
        let (registry, _) = registry();
        let (h, mut rx) = handle();
        registry.add("u1", h).await;

        {
            let snapshot = registry.snapshot("u1").await.unwrap();
            assert_eq!(snapshot.len(), 1);
            snapshot[0].send("hello".to_string()).unwrap();
        }

        assert_eq!(rx.recv().await.unwrap(), "hello");
        assert!(registry.snapshot("nobody").await.is_none());
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped_is_connection_lost() {
        let (h, rx) = handle();
        drop(rx);
        assert!(matches!(
            h.send("x".to_string()),
            Err(DeliveryError::ConnectionLost)
        ));
    }

    #[tokio::test]
    async fn test_add_remove_sequence_matches_model() {
        // Interleave adds and removes across users and compare with a plain count model.
        let (registry, _) = registry();
        let users = ["a", "b", "c"];
        let mut live: Vec<(&str, ConnectionId, mpsc::UnboundedReceiver<String>)> = vec![];

        for step in 0..30usize {
            let user = users[step % users.len()];
            if step % 4 == 3 && !live.is_empty() {
                let (u, id, _rx) = live.remove(step % live.len());
                assert!(registry.remove(u, id).await);
            } else {
                let (h, rx) = handle();
                live.push((user, h.id(), rx));
                registry.add(user, h).await;
            }

            for u in users {
                let expected = live.iter().filter(|(lu, _, _)| *lu == u).count();
                assert_eq!(registry.connection_count(u).await, expected);
                assert_eq!(registry.is_connected(u).await, expected > 0);
            }
        }
    }
}
