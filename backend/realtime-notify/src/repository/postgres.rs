use super::{ConfigurationRepository, NotificationRepository};
use crate::error::{RepositoryError, RepositoryResult};
use crate::models::{Configuration, NewNotification, NotificationRecord};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

const NOTIFICATION_COLUMNS: &str = "id, user_id, app_id, group_key, message, status, \
     read_status, created_at, updated_at";

/// Notification records in PostgreSQL
#[derive(Clone)]
pub struct PgNotificationRepository {
    db: PgPool,
}

impl PgNotificationRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn find_all_unread(&self, user_id: &str) -> RepositoryResult<Vec<NotificationRecord>> {
        let query = format!(
            "SELECT {} FROM notifications \
             WHERE user_id = $1 AND read_status = FALSE \
             ORDER BY created_at DESC",
            NOTIFICATION_COLUMNS
        );

        let rows = sqlx::query_as::<_, NotificationRecord>(&query)
            .bind(user_id)
            .fetch_all(&self.db)
            .await?;

        Ok(rows)
    }

    async fn create(&self, new: NewNotification) -> RepositoryResult<NotificationRecord> {
        let record = new.into_record();
        let query = format!(
            "INSERT INTO notifications ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {}",
            NOTIFICATION_COLUMNS, NOTIFICATION_COLUMNS
        );

        let stored = sqlx::query_as::<_, NotificationRecord>(&query)
            .bind(record.id)
            .bind(&record.user_id)
            .bind(&record.app_id)
            .bind(&record.group_key)
            .bind(&record.message)
            .bind(&record.status)
            .bind(record.read_status)
            .bind(record.created_at)
            .bind(record.updated_at)
            .fetch_one(&self.db)
            .await?;

        debug!(notification_id = %stored.id, user_id = %stored.user_id, "Stored notification");
        Ok(stored)
    }

    async fn mark_all_read(&self, user_id: &str) -> RepositoryResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET read_status = TRUE, updated_at = $2 \
             WHERE user_id = $1 AND read_status = FALSE",
        )
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    async fn mark_app_read(&self, user_id: &str, app_id: &str) -> RepositoryResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET read_status = TRUE, updated_at = $3 \
             WHERE user_id = $1 AND app_id = $2 AND read_status = FALSE",
        )
        .bind(user_id)
        .bind(app_id)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    async fn mark_group_read(
        &self,
        user_id: &str,
        app_id: &str,
        group_key: &str,
    ) -> RepositoryResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET read_status = TRUE, updated_at = $4 \
             WHERE user_id = $1 AND app_id = $2 AND group_key = $3 AND read_status = FALSE",
        )
        .bind(user_id)
        .bind(app_id)
        .bind(group_key)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    async fn mark_one_read(&self, user_id: &str, id: Uuid) -> RepositoryResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET read_status = TRUE, updated_at = $3 \
             WHERE id = $1 AND user_id = $2 AND read_status = FALSE",
        )
        .bind(id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_all(&self, user_id: &str) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_app(&self, user_id: &str, app_id: &str) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE user_id = $1 AND app_id = $2")
            .bind(user_id)
            .bind(app_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_group(
        &self,
        user_id: &str,
        app_id: &str,
        group_key: &str,
    ) -> RepositoryResult<u64> {
        let result = sqlx::query(
            "DELETE FROM notifications WHERE user_id = $1 AND app_id = $2 AND group_key = $3",
        )
        .bind(user_id)
        .bind(app_id)
        .bind(group_key)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_one(&self, user_id: &str, id: Uuid) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Configuration records in PostgreSQL
#[derive(Clone)]
pub struct PgConfigurationRepository {
    db: PgPool,
}

impl PgConfigurationRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ConfigurationRepository for PgConfigurationRepository {
    async fn find_by_user(&self, user_id: &str) -> RepositoryResult<Option<Configuration>> {
        let row = sqlx::query_as::<_, Configuration>(
            "SELECT id, user_id, enable_notifications AS enabled \
             FROM configurations WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row)
    }

    async fn create(&self, user_id: &str, enabled: bool) -> RepositoryResult<Configuration> {
        let row = sqlx::query_as::<_, Configuration>(
            "INSERT INTO configurations (id, user_id, enable_notifications) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id \
             RETURNING id, user_id, enable_notifications AS enabled",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(enabled)
        .fetch_one(&self.db)
        .await?;

        Ok(row)
    }

    async fn update(&self, user_id: &str, enabled: bool) -> RepositoryResult<Configuration> {
        sqlx::query_as::<_, Configuration>(
            "UPDATE configurations SET enable_notifications = $2, updated_at = $3 \
             WHERE user_id = $1 \
             RETURNING id, user_id, enable_notifications AS enabled",
        )
        .bind(user_id)
        .bind(enabled)
        .bind(Utc::now())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("configuration for {}", user_id)))
    }

    async fn delete(&self, user_id: &str) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM configurations WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
