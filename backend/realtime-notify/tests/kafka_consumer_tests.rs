/// Broker fan-in tests
///
/// Exercises the partition worker end to end with an in-process event stream
/// standing in for a Kafka partition.
use futures::stream;
use realtime_notify::error::{ConsumerError, DecodeError};
use realtime_notify::models::ClientPresence;
use realtime_notify::presence::{InMemoryPresenceStore, PresenceStore};
use realtime_notify::repository::{InMemoryNotificationRepository, NotificationRepository};
use realtime_notify::services::kafka_consumer::run_partition_worker;
use realtime_notify::services::NotificationEventProcessor;
use realtime_notify::websocket::{ConnectionHandle, ConnectionRegistry, DeliveryHub};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

fn event(user: &str, message: &str) -> Vec<u8> {
    json!({
        "userId": user,
        "appId": "billing",
        "groupKey": "invoices",
        "message": message,
        "status": "info"
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn test_partition_events_are_stored_and_pushed_in_order() {
    let repo = InMemoryNotificationRepository::new();
    let presence = InMemoryPresenceStore::new();
    let registry = ConnectionRegistry::new(Arc::new(presence.clone()));
    let hub = DeliveryHub::new(registry.clone(), Arc::new(presence.clone()));

    let (tx, mut rx) = mpsc::unbounded_channel();
    presence.put(&ClientPresence::new("u1", true)).await.unwrap();
    registry.add("u1", ConnectionHandle::new(tx)).await;

    let events = stream::iter(vec![
        Ok(event("u1", "first")),
        Ok(b"{broken".to_vec()),
        Err(ConsumerError::Decode(DecodeError::InvalidUtf8)),
        Ok(event("u2", "offline user")),
        Ok(event("u1", "second")),
    ]);

    let processor = NotificationEventProcessor::new(Arc::new(repo.clone()), hub);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    run_partition_worker(0, events, processor, shutdown_rx).await;

    let mut pushed = Vec::new();
    while let Ok(text) = rx.try_recv() {
        let frame: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(frame["action"], "newNotification");
        pushed.push(frame["message"].as_str().unwrap().to_string());
    }
    assert_eq!(pushed, vec!["first", "second"]);

    assert_eq!(repo.find_all_unread("u1").await.unwrap().len(), 2);
    assert_eq!(repo.find_all_unread("u2").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_events_for_disabled_user_are_stored_only() {
    let repo = InMemoryNotificationRepository::new();
    let presence = InMemoryPresenceStore::new();
    let registry = ConnectionRegistry::new(Arc::new(presence.clone()));
    let hub = DeliveryHub::new(registry.clone(), Arc::new(presence.clone()));

    let (tx, mut rx) = mpsc::unbounded_channel();
    presence.put(&ClientPresence::new("u1", false)).await.unwrap();
    registry.add("u1", ConnectionHandle::new(tx)).await;

    let processor = NotificationEventProcessor::new(Arc::new(repo.clone()), hub);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    run_partition_worker(
        3,
        stream::iter(vec![Ok(event("u1", "quiet"))]),
        processor,
        shutdown_rx,
    )
    .await;

    assert!(rx.try_recv().is_err());
    assert_eq!(repo.find_all_unread("u1").await.unwrap().len(), 1);
}
