/// WebSocket real-time notification delivery
///
/// Architecture:
/// 1. ConnectionRegistry: open connections per user
/// 2. DeliveryHub: presence-aware fan-out to a user's connections
/// 3. NotificationSession: per-connection protocol and action dispatch
/// 4. OriginPolicy: allow-list checked before upgrade
pub mod hub;
pub mod messages;
pub mod origin;
pub mod registry;
pub mod session;

pub use hub::DeliveryHub;
pub use messages::{ClientAction, OutboundMessage};
pub use origin::OriginPolicy;
pub use registry::{ConnectionHandle, ConnectionId, ConnectionRegistry, FrameSender};
pub use session::{run_connection, NotificationSession, SessionSettings};
