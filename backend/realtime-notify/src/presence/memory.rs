use super::PresenceStore;
use crate::error::PresenceError;
use crate::models::ClientPresence;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-local presence store
///
/// Used by tests and local runs without Redis. `set_unavailable(true)` makes
/// every call fail the way an unreachable Redis would.
#[derive(Clone, Default)]
pub struct InMemoryPresenceStore {
    records: Arc<RwLock<HashMap<String, ClientPresence>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryPresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn check_available(&self) -> Result<(), PresenceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PresenceError::Unavailable("in-memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PresenceStore for InMemoryPresenceStore {
    async fn get(&self, user_id: &str) -> Result<Option<ClientPresence>, PresenceError> {
        self.check_available()?;
        Ok(self.records.read().await.get(user_id).cloned())
    }

    async fn put(&self, presence: &ClientPresence) -> Result<(), PresenceError> {
        self.check_available()?;
        self.records
            .write()
            .await
            .insert(presence.id.clone(), presence.clone());
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<(), PresenceError> {
        self.check_available()?;
        self.records.write().await.remove(user_id);
        Ok(())
    }
}
