/// Persistence collaborators for notification and configuration records
///
/// Every identifier arriving from the wire passes through
/// `sanitize_key` before it is used as a query key.
pub mod memory;
pub mod postgres;

pub use memory::{InMemoryConfigurationRepository, InMemoryNotificationRepository};
pub use postgres::{PgConfigurationRepository, PgNotificationRepository};

use crate::error::RepositoryResult;
use crate::models::{Configuration, NewNotification, NotificationRecord};
use async_trait::async_trait;
use uuid::Uuid;

/// Strip surrounding whitespace, then surrounding `"` and `'` characters.
pub fn sanitize_key(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string()
}

/// Notification records. Mutations return the number of affected rows;
/// zero is not an error.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Unread records for a user, newest first
    async fn find_all_unread(&self, user_id: &str) -> RepositoryResult<Vec<NotificationRecord>>;

    async fn create(&self, new: NewNotification) -> RepositoryResult<NotificationRecord>;

    async fn mark_all_read(&self, user_id: &str) -> RepositoryResult<u64>;

    async fn mark_app_read(&self, user_id: &str, app_id: &str) -> RepositoryResult<u64>;

    async fn mark_group_read(
        &self,
        user_id: &str,
        app_id: &str,
        group_key: &str,
    ) -> RepositoryResult<u64>;

    async fn mark_one_read(&self, user_id: &str, id: Uuid) -> RepositoryResult<u64>;

    async fn delete_all(&self, user_id: &str) -> RepositoryResult<u64>;

    async fn delete_app(&self, user_id: &str, app_id: &str) -> RepositoryResult<u64>;

    async fn delete_group(
        &self,
        user_id: &str,
        app_id: &str,
        group_key: &str,
    ) -> RepositoryResult<u64>;

    async fn delete_one(&self, user_id: &str, id: Uuid) -> RepositoryResult<u64>;
}

/// Per-user notification preference records
#[async_trait]
pub trait ConfigurationRepository: Send + Sync {
    async fn find_by_user(&self, user_id: &str) -> RepositoryResult<Option<Configuration>>;

    async fn create(&self, user_id: &str, enabled: bool) -> RepositoryResult<Configuration>;

    /// Fails with `NotFound` when the user has no configuration.
    async fn update(&self, user_id: &str, enabled: bool) -> RepositoryResult<Configuration>;

    async fn delete(&self, user_id: &str) -> RepositoryResult<u64>;
}
