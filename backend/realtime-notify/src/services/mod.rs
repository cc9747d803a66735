pub mod kafka_consumer;

pub use kafka_consumer::{
    EventOutcome, KafkaNotificationConsumer, NotificationEvent, NotificationEventProcessor,
};
