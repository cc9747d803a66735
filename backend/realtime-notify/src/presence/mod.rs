/// Presence store
///
/// Shared key/value record of which users are connected and whether they
/// want notifications. Survives process restarts when backed by Redis.
pub mod memory;
pub mod redis;

pub use self::memory::InMemoryPresenceStore;
pub use self::redis::RedisPresenceStore;

use crate::error::PresenceError;
use crate::models::ClientPresence;
use async_trait::async_trait;

/// Key under which a user's presence record lives
pub fn presence_key(user_id: &str) -> String {
    format!("client:{}", user_id)
}

#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Absence is `Ok(None)`, never an error.
    async fn get(&self, user_id: &str) -> Result<Option<ClientPresence>, PresenceError>;

    /// Overwrite the record for `presence.id`.
    async fn put(&self, presence: &ClientPresence) -> Result<(), PresenceError>;

    /// Deleting a missing record succeeds.
    async fn delete(&self, user_id: &str) -> Result<(), PresenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_key_format() {
        assert_eq!(presence_key("u-42"), "client:u-42");
    }
}
