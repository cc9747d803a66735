use super::{presence_key, PresenceStore};
use crate::error::PresenceError;
use crate::models::ClientPresence;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::future::Future;
use std::time::Duration;

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(3);

/// Redis-backed presence store
///
/// Records are stored as JSON strings under `client:<userId>` with no expiry.
#[derive(Clone)]
pub struct RedisPresenceStore {
    manager: ConnectionManager,
    command_timeout: Duration,
}

impl RedisPresenceStore {
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            manager,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Connect and verify the server answers a PING.
    pub async fn connect(url: &str) -> Result<Self, PresenceError> {
        let client = Client::open(url)?;
        let mut manager = ConnectionManager::new(client).await?;
        let _: String = redis::cmd("PING").query_async(&mut manager).await?;
        Ok(Self::new(manager))
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T, PresenceError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(result) => result.map_err(PresenceError::from),
            Err(_) => Err(PresenceError::Timeout),
        }
    }
}

#[async_trait]
impl PresenceStore for RedisPresenceStore {
    async fn get(&self, user_id: &str) -> Result<Option<ClientPresence>, PresenceError> {
        let mut conn = self.manager.clone();
        let key = presence_key(user_id);
        let raw: Option<String> = self.with_timeout(conn.get(&key)).await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, presence: &ClientPresence) -> Result<(), PresenceError> {
        let mut conn = self.manager.clone();
        let key = presence_key(&presence.id);
        let json = serde_json::to_string(presence)?;
        self.with_timeout(conn.set::<_, _, ()>(&key, json)).await
    }

    async fn delete(&self, user_id: &str) -> Result<(), PresenceError> {
        let mut conn = self.manager.clone();
        let key = presence_key(user_id);
        self.with_timeout(conn.del::<_, ()>(&key)).await
    }
}
