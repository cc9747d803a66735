/// Connection session
///
/// One per accepted WebSocket. `NotificationSession` owns the protocol:
/// registration, presence, action dispatch and re-sync pushes.
/// `run_connection` drives it from a live socket with the heartbeat loop.
use super::messages::ClientAction;
use super::registry::{ConnectionHandle, ConnectionId, FrameSender};
use crate::error::{RepositoryResult, SessionError};
use crate::models::{ClientPresence, Configuration};
use crate::repository::sanitize_key;
use crate::state::AppState;
use actix_ws::{CloseCode, CloseReason, Message, MessageStream, Session};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Liveness settings for open connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// How often the server pings
    pub heartbeat_interval: Duration,
    /// Silence after which the connection is dropped
    pub client_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            client_timeout: Duration::from_secs(60),
        }
    }
}

pub struct NotificationSession {
    user_id: String,
    connection_id: ConnectionId,
    state: AppState,
}

impl NotificationSession {
    /// Bring a connection to the active state.
    ///
    /// Loads the user's configuration (creating an enabled one on first
    /// connect), registers the connection, writes presence, then pushes the
    /// unread list followed by the configuration.
    pub async fn open(
        state: AppState,
        user_id: &str,
        sender: FrameSender,
    ) -> Result<Self, SessionError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(SessionError::MissingUserId);
        }

        let handle = ConnectionHandle::new(sender);
        let session = Self {
            user_id: user_id.to_string(),
            connection_id: handle.id(),
            state,
        };

        let config = session.load_or_create_configuration().await?;

        // Registered first: presence is only deleted once the set is empty.
        session.state.registry.add(&session.user_id, handle).await;
        if let Err(e) = session
            .state
            .presence
            .put(&ClientPresence::new(&session.user_id, config.enabled))
            .await
        {
            session.close().await;
            return Err(e.into());
        }

        info!(
            user_id = %session.user_id,
            connection_id = %session.connection_id,
            notifications_enabled = config.enabled,
            "Client connected"
        );

        session.push_notification_list().await;
        session.send_configuration(&config).await;

        Ok(session)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Dispatch one inbound text frame.
    ///
    /// Malformed frames and unknown verbs are logged and ignored. Every other
    /// verb performs at most one mutation, then re-pushes the unread list even
    /// when the mutation failed.
    pub async fn handle_frame(&self, text: &str) {
        let action = match ClientAction::decode(text) {
            Ok(action) => action,
            Err(e) => {
                warn!(user_id = %self.user_id, error = %e, "Invalid event format");
                return;
            }
        };

        let verb = action.verb();
        debug!(user_id = %self.user_id, action = verb, "Handling client action");

        let repo = &self.state.notifications;
        let user = self.user_id.as_str();

        match action {
            ClientAction::MarkAsRead => {
                self.log_mutation(verb, repo.mark_all_read(user).await);
            }
            ClientAction::MarkAppAsRead { app_id } => {
                let app_id = sanitize_key(&app_id);
                self.log_mutation(verb, repo.mark_app_read(user, &app_id).await);
            }
            ClientAction::MarkGroupAsRead { app_id, group_key } => {
                let (app_id, group_key) = (sanitize_key(&app_id), sanitize_key(&group_key));
                self.log_mutation(verb, repo.mark_group_read(user, &app_id, &group_key).await);
            }
            ClientAction::MarkNotificationAsRead { id } => {
                if let Some(id) = self.parse_notification_id(verb, &id) {
                    self.log_mutation(verb, repo.mark_one_read(user, id).await);
                }
            }
            ClientAction::DeleteNotifications => {
                self.log_mutation(verb, repo.delete_all(user).await);
            }
            ClientAction::DeleteAppNotifications { app_id } => {
                let app_id = sanitize_key(&app_id);
                self.log_mutation(verb, repo.delete_app(user, &app_id).await);
            }
            ClientAction::DeleteGroupNotifications { app_id, group_key } => {
                let (app_id, group_key) = (sanitize_key(&app_id), sanitize_key(&group_key));
                self.log_mutation(verb, repo.delete_group(user, &app_id, &group_key).await);
            }
            ClientAction::DeleteNotification { id } => {
                if let Some(id) = self.parse_notification_id(verb, &id) {
                    self.log_mutation(verb, repo.delete_one(user, id).await);
                }
            }
            ClientAction::ReloadNotifications => {}
            ClientAction::ToggleNotificationStatus { enabled } => {
                self.toggle(enabled).await;
                return;
            }
            ClientAction::Unknown => {
                warn!(user_id = %self.user_id, "Unknown event type");
                return;
            }
        }

        self.push_notification_list().await;
    }

    /// Change the user's preference.
    ///
    /// Updates the configuration record and presence, pushes the list when
    /// notifications are now enabled, and always pushes the configuration.
    pub async fn toggle(&self, enabled: bool) {
        if let Err(e) = self
            .state
            .configurations
            .update(&self.user_id, enabled)
            .await
        {
            warn!(user_id = %self.user_id, error = %e, "Failed to update configuration");
        }

        let presence = ClientPresence::new(&self.user_id, enabled);
        if let Err(e) = self.state.presence.put(&presence).await {
            warn!(user_id = %self.user_id, error = %e, "Failed to update presence");
        }

        info!(user_id = %self.user_id, enabled, "Notification status toggled");

        if enabled {
            self.push_notification_list().await;
        }
        self.push_configuration().await;
    }

    /// Fetch the unread list and push it to every connection of this user.
    pub async fn push_notification_list(&self) {
        let records = match self
            .state
            .notifications
            .find_all_unread(&self.user_id)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!(user_id = %self.user_id, error = %e, "Failed to fetch notifications");
                return;
            }
        };

        debug!(user_id = %self.user_id, count = records.len(), "Sending notification list");
        if let Err(e) = self
            .state
            .hub
            .send_notification_list(&self.user_id, records)
            .await
        {
            debug!(user_id = %self.user_id, error = %e, "Notification list not delivered");
        }
    }

    /// Re-read the configuration and push it, bypassing the preference check.
    pub async fn push_configuration(&self) {
        match self.state.configurations.find_by_user(&self.user_id).await {
            Ok(Some(config)) => self.send_configuration(&config).await,
            Ok(None) => {
                warn!(user_id = %self.user_id, "No configuration to send");
            }
            Err(e) => {
                warn!(user_id = %self.user_id, error = %e, "Failed to fetch configuration");
            }
        }
    }

    /// Active -> Closed. Safe to call more than once.
    pub async fn close(&self) {
        if self
            .state
            .registry
            .remove(&self.user_id, self.connection_id)
            .await
        {
            info!(
                user_id = %self.user_id,
                connection_id = %self.connection_id,
                "Client disconnected"
            );
        }
    }

    async fn send_configuration(&self, config: &Configuration) {
        if let Err(e) = self.state.hub.send_configuration(config, true).await {
            warn!(user_id = %self.user_id, error = %e, "Failed to send configuration");
        }
    }

    async fn load_or_create_configuration(&self) -> Result<Configuration, SessionError> {
        let configs = &self.state.configurations;
        if let Some(config) = configs.find_by_user(&self.user_id).await? {
            return Ok(config);
        }

        let config = configs.create(&self.user_id, true).await?;
        info!(user_id = %self.user_id, "Created default configuration");
        Ok(config)
    }

    fn parse_notification_id(&self, verb: &str, raw: &str) -> Option<Uuid> {
        let cleaned = sanitize_key(raw);
        match Uuid::parse_str(&cleaned) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(
                    user_id = %self.user_id,
                    action = verb,
                    id = %cleaned,
                    error = %e,
                    "Invalid notification id"
                );
                None
            }
        }
    }

    fn log_mutation(&self, verb: &str, result: RepositoryResult<u64>) {
        match result {
            Ok(affected) => {
                debug!(user_id = %self.user_id, action = verb, affected, "Action applied");
            }
            Err(e) => {
                warn!(user_id = %self.user_id, action = verb, error = %e, "Action failed");
            }
        }
    }
}

/// Drive an active session from its socket until the connection ends.
///
/// Outbound frames queued by the delivery hub, server pings and inbound client
/// frames are multiplexed on one task. The session is always deregistered and
/// the socket closed on exit.
pub async fn run_connection(
    session: NotificationSession,
    mut ws: Session,
    mut stream: MessageStream,
    mut outbound: mpsc::UnboundedReceiver<String>,
    settings: SessionSettings,
) {
    let mut heartbeat = interval(settings.heartbeat_interval);
    let deadline = sleep(settings.client_timeout);
    tokio::pin!(deadline);

    let close_reason: Option<CloseReason> = loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if ws.text(text).await.is_err() {
                        break None;
                    }
                }
                None => break None,
            },

            () = &mut deadline => {
                warn!(user_id = %session.user_id(), "WebSocket heartbeat failed, disconnecting");
                break Some(CloseReason {
                    code: CloseCode::Away,
                    description: Some("heartbeat timeout".to_string()),
                });
            }

            _ = heartbeat.tick() => {
                if ws.ping(b"").await.is_err() {
                    warn!(user_id = %session.user_id(), "Ping failed");
                    break None;
                }
            }

            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => session.handle_frame(&text).await,
                Some(Ok(Message::Ping(bytes))) => {
                    deadline.as_mut().reset(Instant::now() + settings.client_timeout);
                    if ws.pong(&bytes).await.is_err() {
                        break None;
                    }
                }
                Some(Ok(Message::Pong(_))) => {
                    deadline.as_mut().reset(Instant::now() + settings.client_timeout);
                }
                Some(Ok(Message::Binary(_))) => {
                    warn!(user_id = %session.user_id(), "Binary WebSocket messages not supported");
                }
                Some(Ok(Message::Close(reason))) => {
                    debug!(user_id = %session.user_id(), ?reason, "Close frame received");
                    break reason;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(user_id = %session.user_id(), error = %e, "WebSocket protocol error");
                    break None;
                }
                None => break None,
            },
        }
    };

    session.close().await;
    let _ = ws.close(close_reason).await;
}

/// Close frame for a connection refused after upgrade
pub fn policy_violation(description: &str) -> CloseReason {
    CloseReason {
        code: CloseCode::Policy,
        description: Some(description.to_string()),
    }
}
