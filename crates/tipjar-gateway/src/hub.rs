use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{error, info};
use uuid::Uuid;

use tipjar_types::events::OverlayEvent;

pub type ConnectionId = Uuid;

/// Fanout set of authenticated overlay connections.
///
/// Only connections that completed the auth handshake are ever registered,
/// so nothing broadcast here can reach an unauthenticated socket.
#[derive(Clone)]
pub struct OverlayHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    /// Shared secret overlay clients present in their auth frame
    auth_key: String,

    /// Authenticated connections: conn_id -> outbound frame queue
    connections: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<String>>>,

    /// Held for the duration of a broadcast so that every connection sees
    /// events in the order `broadcast` was called
    send_order: Mutex<()>,
}

impl OverlayHub {
    pub fn new(auth_key: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(HubInner {
                auth_key: auth_key.into(),
                connections: RwLock::new(HashMap::new()),
                send_order: Mutex::new(()),
            }),
        }
    }

    /// Constant-time comparison against the configured key. An empty
    /// configured key matches nothing.
    pub fn check_key(&self, presented: &str) -> bool {
        let expected = self.inner.auth_key.as_bytes();
        let presented = presented.as_bytes();
        if expected.is_empty() || expected.len() != presented.len() {
            return false;
        }
        expected
            .iter()
            .zip(presented)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    /// Add an authenticated connection. Returns (conn_id, receiver of
    /// serialized frames).
    pub async fn register(&self) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let count = {
            let mut connections = self.inner.connections.write().await;
            connections.insert(conn_id, tx);
            connections.len()
        };
        info!("Overlay {} authenticated ({} connected)", conn_id, count);
        (conn_id, rx)
    }

    pub async fn unregister(&self, conn_id: ConnectionId) {
        if self.inner.connections.write().await.remove(&conn_id).is_some() {
            info!("Overlay {} removed", conn_id);
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }

    /// Best-effort fanout to every authenticated connection that is still
    /// open. Connections whose transport has gone away are dropped from the
    /// set. Returns the number of connections the frame was handed to.
    pub async fn broadcast(&self, event: &OverlayEvent) -> usize {
        let frame = match event.to_frame(chrono::Utc::now().timestamp_millis()) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to serialize {} event: {}", event.kind(), e);
                return 0;
            }
        };

        let _order = self.inner.send_order.lock().await;

        let snapshot: Vec<(ConnectionId, mpsc::UnboundedSender<String>)> = self
            .inner
            .connections
            .read()
            .await
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (conn_id, tx) in snapshot {
            if tx.is_closed() || tx.send(frame.clone()).is_err() {
                dead.push(conn_id);
            } else {
                delivered += 1;
            }
        }

        if !dead.is_empty() {
            let mut connections = self.inner.connections.write().await;
            for conn_id in &dead {
                connections.remove(conn_id);
            }
            info!("Dropped {} closed overlay connections during broadcast", dead.len());
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: u32) -> OverlayEvent {
        OverlayEvent::AuthSuccess {
            message: format!("event-{}", n),
        }
    }

    fn payload(frame: &str) -> String {
        let value: serde_json::Value = serde_json::from_str(frame).unwrap();
        value["payload"]["message"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn broadcast_preserves_call_order_per_connection() {
        let hub = OverlayHub::new("secret");
        let (_, mut a) = hub.register().await;
        let (_, mut b) = hub.register().await;

        for n in 0..5 {
            assert_eq!(hub.broadcast(&event(n)).await, 2);
        }

        for rx in [&mut a, &mut b] {
            for n in 0..5 {
                assert_eq!(payload(&rx.recv().await.unwrap()), format!("event-{}", n));
            }
        }
    }

    #[tokio::test]
    async fn closed_connections_are_pruned() {
        let hub = OverlayHub::new("secret");
        let (_, keep) = hub.register().await;
        let (_, gone) = hub.register().await;
        drop(gone);

        assert_eq!(hub.broadcast(&event(0)).await, 1);
        assert_eq!(hub.connection_count().await, 1);
        drop(keep);
    }

    #[tokio::test]
    async fn unregister_stops_delivery() {
        let hub = OverlayHub::new("secret");
        let (conn_id, mut rx) = hub.register().await;
        hub.unregister(conn_id).await;

        assert_eq!(hub.broadcast(&event(0)).await, 0);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn key_check() {
        let hub = OverlayHub::new("secret");
        assert!(hub.check_key("secret"));
        assert!(!hub.check_key("secreT"));
        assert!(!hub.check_key("secret-and-more"));
        assert!(!hub.check_key(""));

        assert!(!OverlayHub::new("").check_key(""));
    }
}
