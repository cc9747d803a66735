//! In-memory repositories for tests and database-less local runs.

use super::{ConfigurationRepository, NotificationRepository};
use crate::error::{RepositoryError, RepositoryResult};
use crate::models::{Configuration, NewNotification, NotificationRecord};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

fn check_available(flag: &AtomicBool) -> RepositoryResult<()> {
    if flag.load(Ordering::SeqCst) {
        return Err(RepositoryError::Unavailable(
            "in-memory repository offline".to_string(),
        ));
    }
    Ok(())
}

#[derive(Clone, Default)]
pub struct InMemoryNotificationRepository {
    records: Arc<RwLock<Vec<NotificationRecord>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `RepositoryError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// All records for a user, read or not
    pub async fn all_for_user(&self, user_id: &str) -> Vec<NotificationRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect()
    }

    async fn mark_where<F>(&self, pred: F) -> RepositoryResult<u64>
    where
        F: Fn(&NotificationRecord) -> bool + Send,
    {
        check_available(&self.unavailable)?;
        let now = Utc::now();
        let mut records = self.records.write().await;
        let mut affected = 0;
        for record in records.iter_mut().filter(|r| !r.read_status && pred(r)) {
            record.read_status = true;
            record.updated_at = now;
            affected += 1;
        }
        Ok(affected)
    }

    async fn delete_where<F>(&self, pred: F) -> RepositoryResult<u64>
    where
        F: Fn(&NotificationRecord) -> bool + Send,
    {
        check_available(&self.unavailable)?;
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| !pred(r));
        Ok((before - records.len()) as u64)
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn find_all_unread(&self, user_id: &str) -> RepositoryResult<Vec<NotificationRecord>> {
        check_available(&self.unavailable)?;
        let mut unread: Vec<NotificationRecord> = self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.user_id == user_id && !r.read_status)
            .cloned()
            .collect();
        unread.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(unread)
    }

    async fn create(&self, new: NewNotification) -> RepositoryResult<NotificationRecord> {
        check_available(&self.unavailable)?;
        let record = new.into_record();
        self.records.write().await.push(record.clone());
        Ok(record)
    }

    async fn mark_all_read(&self, user_id: &str) -> RepositoryResult<u64> {
        self.mark_where(|r| r.user_id == user_id).await
    }

    async fn mark_app_read(&self, user_id: &str, app_id: &str) -> RepositoryResult<u64> {
        self.mark_where(|r| r.user_id == user_id && r.app_id == app_id)
            .await
    }

    async fn mark_group_read(
        &self,
        user_id: &str,
        app_id: &str,
        group_key: &str,
    ) -> RepositoryResult<u64> {
        self.mark_where(|r| r.user_id == user_id && r.app_id == app_id && r.group_key == group_key)
            .await
    }

    async fn mark_one_read(&self, user_id: &str, id: Uuid) -> RepositoryResult<u64> {
        self.mark_where(|r| r.user_id == user_id && r.id == id).await
    }

    async fn delete_all(&self, user_id: &str) -> RepositoryResult<u64> {
        self.delete_where(|r| r.user_id == user_id).await
    }

    async fn delete_app(&self, user_id: &str, app_id: &str) -> RepositoryResult<u64> {
        self.delete_where(|r| r.user_id == user_id && r.app_id == app_id)
            .await
    }

    async fn delete_group(
        &self,
        user_id: &str,
        app_id: &str,
        group_key: &str,
    ) -> RepositoryResult<u64> {
        self.delete_where(|r| r.user_id == user_id && r.app_id == app_id && r.group_key == group_key)
            .await
    }

    async fn delete_one(&self, user_id: &str, id: Uuid) -> RepositoryResult<u64> {
        self.delete_where(|r| r.user_id == user_id && r.id == id).await
    }
}

#[derive(Clone, Default)]
pub struct InMemoryConfigurationRepository {
    records: Arc<RwLock<HashMap<String, Configuration>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryConfigurationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConfigurationRepository for InMemoryConfigurationRepository {
    async fn find_by_user(&self, user_id: &str) -> RepositoryResult<Option<Configuration>> {
        check_available(&self.unavailable)?;
        Ok(self.records.read().await.get(user_id).cloned())
    }

    async fn create(&self, user_id: &str, enabled: bool) -> RepositoryResult<Configuration> {
        check_available(&self.unavailable)?;
        let mut records = self.records.write().await;
        let config = records
            .entry(user_id.to_string())
            .or_insert_with(|| Configuration {
                id: Uuid::new_v4(),
                user_id: user_id.to_string(),
                enabled,
            });
        Ok(config.clone())
    }

    async fn update(&self, user_id: &str, enabled: bool) -> RepositoryResult<Configuration> {
        check_available(&self.unavailable)?;
        let mut records = self.records.write().await;
        match records.get_mut(user_id) {
            Some(config) => {
                config.enabled = enabled;
                Ok(config.clone())
            }
            None => Err(RepositoryError::NotFound(format!(
                "configuration for {}",
                user_id
            ))),
        }
    }

    async fn delete(&self, user_id: &str) -> RepositoryResult<u64> {
        check_available(&self.unavailable)?;
        Ok(self.records.write().await.remove(user_id).map_or(0, |_| 1))
    }
}
