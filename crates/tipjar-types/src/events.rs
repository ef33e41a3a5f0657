use serde::{Deserialize, Serialize};

use crate::models::Donation;

/// Events sent over the overlay WebSocket.
///
/// On the wire every event is framed as
/// `{"event": "<KIND>", "payload": {...}, "timestamp": <ms>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverlayEvent {
    /// The connection presented the correct overlay key
    AuthSuccess { message: String },

    /// The connection presented a wrong key and is about to be closed
    AuthFailed { message: String },

    /// A donation was accepted by the ledger
    Donation(Donation),
}

impl OverlayEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthSuccess { .. } => "AUTH_SUCCESS",
            Self::AuthFailed { .. } => "AUTH_FAILED",
            Self::Donation(_) => "DONATION",
        }
    }

    /// Serialize into a wire frame stamped with `timestamp_ms`.
    pub fn to_frame(&self, timestamp_ms: i64) -> serde_json::Result<String> {
        let mut value = serde_json::to_value(self)?;
        if let serde_json::Value::Object(map) = &mut value {
            map.insert("timestamp".to_string(), timestamp_ms.into());
        }
        serde_json::to_string(&value)
    }
}

/// Frames sent FROM an overlay client TO the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OverlayCommand {
    /// Authenticate the connection with the shared overlay key
    Auth { key: String },
}
