/// Kafka fan-in consumer for notification events
///
/// One worker per partition of the notification topic, each starting at the
/// latest offset. Every event is decoded, persisted as an unread notification,
/// then pushed to the recipient's open connections.
///
/// Workers stop cooperatively on the shutdown signal, checked between reads.
/// An event already being processed when shutdown arrives is finished first.
use crate::error::{ConsumerError, DecodeError};
use crate::metrics;
use crate::models::{NewNotification, NotificationRecord};
use crate::repository::NotificationRepository;
use crate::websocket::DeliveryHub;
use futures::{Stream, StreamExt};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Event envelope published by upstream producers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub user_id: String,
    pub app_id: String,
    pub group_key: String,
    pub message: String,
    pub status: String,
}

impl NotificationEvent {
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(payload).map_err(|_| DecodeError::InvalidUtf8)?;
        Ok(serde_json::from_str(text)?)
    }

    pub fn into_new_notification(self) -> NewNotification {
        NewNotification {
            user_id: self.user_id,
            app_id: self.app_id,
            group_key: self.group_key,
            message: self.message,
            status: self.status,
        }
    }
}

/// What happened to one event
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// Stored and written to this many connections
    Delivered(NotificationRecord, usize),
    /// Stored; recipient offline or not accepting pushes
    Stored(NotificationRecord),
    Malformed,
    PersistFailed,
}

/// Decode, persist and push a single event
#[derive(Clone)]
pub struct NotificationEventProcessor {
    notifications: Arc<dyn NotificationRepository>,
    hub: DeliveryHub,
}

impl NotificationEventProcessor {
    pub fn new(notifications: Arc<dyn NotificationRepository>, hub: DeliveryHub) -> Self {
        Self { notifications, hub }
    }

    pub async fn process(&self, payload: &[u8]) -> EventOutcome {
        let event = match NotificationEvent::decode(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Invalid message format");
                metrics::record_broker_event("malformed");
                return EventOutcome::Malformed;
            }
        };

        let record = match self
            .notifications
            .create(event.into_new_notification())
            .await
        {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Notification entry insert error");
                metrics::record_broker_event("persist_failed");
                return EventOutcome::PersistFailed;
            }
        };
        metrics::record_broker_event("persisted");

        match self.hub.send_notification(&record).await {
            Ok(count) => EventOutcome::Delivered(record, count),
            Err(e) => {
                debug!(
                    notification_id = %record.id,
                    user_id = %record.user_id,
                    error = %e,
                    "Stored notification not pushed"
                );
                EventOutcome::Stored(record)
            }
        }
    }
}

/// Process a partition's payloads until the stream ends or shutdown is signalled.
pub async fn run_partition_worker<S>(
    partition: i32,
    mut events: S,
    processor: NotificationEventProcessor,
    mut shutdown: watch::Receiver<bool>,
) where
    S: Stream<Item = Result<Vec<u8>, ConsumerError>> + Unpin,
{
    info!(partition, "Partition worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }

            next = events.next() => match next {
                Some(Ok(payload)) => {
                    processor.process(&payload).await;
                }
                Some(Err(e)) => {
                    warn!(partition, error = %e, "Kafka consumer error");
                }
                None => break,
            },
        }
    }

    info!(partition, "Partition worker stopped");
}

/// Kafka consumer for the notification topic
#[derive(Debug, Clone)]
pub struct KafkaNotificationConsumer {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
}

impl KafkaNotificationConsumer {
    pub fn new(brokers: String, topic: String, group_id: String) -> Self {
        Self {
            brokers,
            topic,
            group_id,
        }
    }

    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("auto.offset.reset", "latest")
            .set("enable.auto.commit", "false")
            .set("session.timeout.ms", "30000");
        config
    }

    /// Partition ids of the topic. Blocks on a metadata request.
    pub fn partitions(&self) -> Result<Vec<i32>, ConsumerError> {
        let consumer: BaseConsumer = self.client_config().create()?;
        let metadata = consumer.fetch_metadata(Some(self.topic.as_str()), METADATA_TIMEOUT)?;

        let topic = metadata
            .topics()
            .iter()
            .find(|t| t.name() == self.topic)
            .ok_or_else(|| ConsumerError::TopicNotFound(self.topic.clone()))?;

        if topic.error().is_some() || topic.partitions().is_empty() {
            return Err(ConsumerError::TopicNotFound(self.topic.clone()));
        }

        Ok(topic.partitions().iter().map(|p| p.id()).collect())
    }

    /// Open one consumer per partition at the latest offset and spawn its worker.
    ///
    /// Any failure here is a startup failure; nothing is spawned unless every
    /// partition could be assigned.
    pub fn start(
        &self,
        processor: NotificationEventProcessor,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Vec<JoinHandle<()>>, ConsumerError> {
        let partitions = self.partitions()?;
        info!(
            brokers = %self.brokers,
            topic = %self.topic,
            partitions = partitions.len(),
            "Starting Kafka notification consumer"
        );

        let mut consumers = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let consumer: StreamConsumer = self.client_config().create()?;
            let mut assignment = TopicPartitionList::new();
            assignment.add_partition_offset(&self.topic, partition, Offset::End)?;
            consumer.assign(&assignment)?;
            consumers.push((partition, consumer));
        }

        let handles = consumers
            .into_iter()
            .map(|(partition, consumer)| {
                let processor = processor.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    let payloads = consumer.stream().map(|message| {
                        message
                            .map(|m| m.payload().map(<[u8]>::to_vec).unwrap_or_default())
                            .map_err(ConsumerError::from)
                    });
                    run_partition_worker(partition, Box::pin(payloads), processor, shutdown)
                        .await;
                })
            })
            .collect();

        Ok(handles)
    }
}
