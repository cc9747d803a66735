//! Error types for the realtime notification service
//!
//! Every component owns a narrow error enum. Failures are absorbed and logged at
//! the component boundary; only `AppError` ever reaches an HTTP response.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Persistence collaborator failures (notification and configuration records).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Presence store failures.
#[derive(Debug, Error)]
pub enum PresenceError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("presence store timed out")]
    Timeout,

    #[error("presence store unavailable: {0}")]
    Unavailable(String),
}

/// Delivery hub failures.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("user not connected: {0}")]
    UserNotConnected(String),

    #[error("notifications are disabled for user: {0}")]
    NotificationsDisabled(String),

    #[error("connection lost")]
    ConnectionLost,

    #[error("presence store unavailable: {0}")]
    PresenceStoreUnavailable(#[from] PresenceError),

    #[error("failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DeliveryError {
    /// Metric label for the outcome
    pub fn outcome(&self) -> &'static str {
        match self {
            DeliveryError::UserNotConnected(_) => "not_connected",
            DeliveryError::NotificationsDisabled(_) => "disabled",
            DeliveryError::ConnectionLost => "connection_lost",
            DeliveryError::PresenceStoreUnavailable(_) => "presence_unavailable",
            DeliveryError::Serialization(_) => "serialization",
        }
    }
}

/// Inbound frame or broker event that could not be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] serde_json::Error),

    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
}

/// Failures that end a connection attempt before it becomes active.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("missing user identity")]
    MissingUserId,

    #[error("persistence failure: {0}")]
    PersistenceFailure(#[from] RepositoryError),

    #[error("presence store unavailable: {0}")]
    PresenceStoreUnavailable(#[from] PresenceError),
}

/// Broker fan-in consumer failures.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("topic {0} not found or has no partitions")]
    TopicNotFound(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Invalid or missing environment configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} missing")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Errors surfaced over HTTP.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Repository(RepositoryError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "error": self.to_string(),
        }))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
