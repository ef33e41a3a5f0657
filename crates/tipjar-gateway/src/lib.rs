pub mod connection;
pub mod hub;

pub use connection::{HEARTBEAT_INTERVAL, handle_connection, handle_connection_with};
pub use hub::{ConnectionId, OverlayHub};
