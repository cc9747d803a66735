use crate::presence::PresenceStore;
use crate::repository::{ConfigurationRepository, NotificationRepository};
use crate::websocket::{ConnectionRegistry, DeliveryHub, OriginPolicy, SessionSettings};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub notifications: Arc<dyn NotificationRepository>,
    pub configurations: Arc<dyn ConfigurationRepository>,
    pub presence: Arc<dyn PresenceStore>,
    pub registry: ConnectionRegistry,
    pub hub: DeliveryHub,
    pub session: SessionSettings,
    /// Allowed `Origin` values for WebSocket upgrades
    pub origins: Arc<OriginPolicy>,
}

impl AppState {
    /// Wire the registry and hub over the given collaborators.
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        configurations: Arc<dyn ConfigurationRepository>,
        presence: Arc<dyn PresenceStore>,
        session: SessionSettings,
        origins: OriginPolicy,
    ) -> Self {
        let registry = ConnectionRegistry::new(presence.clone());
        let hub = DeliveryHub::new(registry.clone(), presence.clone());

        Self {
            notifications,
            configurations,
            presence,
            registry,
            hub,
            session,
            origins: Arc::new(origins),
        }
    }
}
