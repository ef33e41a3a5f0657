use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use tipjar_types::events::{OverlayCommand, OverlayEvent};

use crate::hub::{ConnectionId, OverlayHub};

/// Time an overlay has to present its key after the upgrade.
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// The server pings every 30 seconds. A connection that has not answered
/// the previous ping by the next tick is dropped.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Result of inspecting the first meaningful frame of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    /// `{type:"auth"}` with the right key
    Accepted,
    /// `{type:"auth"}` with the wrong key
    Rejected,
    /// Anything else: other JSON, garbage, binary, close
    Violation,
}

/// Classify a frame received before authentication. `None` for control
/// frames, which neither authenticate nor violate the protocol.
pub fn classify_handshake(hub: &OverlayHub, msg: &Message) -> Option<Handshake> {
    match msg {
        Message::Text(text) => match serde_json::from_str::<OverlayCommand>(text) {
            Ok(OverlayCommand::Auth { key }) if hub.check_key(&key) => Some(Handshake::Accepted),
            Ok(OverlayCommand::Auth { .. }) => Some(Handshake::Rejected),
            Err(_) => Some(Handshake::Violation),
        },
        Message::Ping(_) | Message::Pong(_) => None,
        Message::Binary(_) | Message::Close(_) => Some(Handshake::Violation),
    }
}

/// Drive one overlay WebSocket from upgrade to close.
pub async fn handle_connection(socket: WebSocket, hub: OverlayHub) {
    handle_connection_with(socket, hub, HEARTBEAT_INTERVAL).await
}

/// `handle_connection` with an explicit ping period.
pub async fn handle_connection_with(socket: WebSocket, hub: OverlayHub, heartbeat: Duration) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: the first data frame must authenticate
    let handshake = tokio::time::timeout(AUTH_TIMEOUT, wait_for_auth(&mut receiver, &hub))
        .await
        .unwrap_or_else(|_| {
            warn!("Overlay client did not authenticate within {:?}", AUTH_TIMEOUT);
            Handshake::Violation
        });

    match handshake {
        Handshake::Accepted => {}
        Handshake::Rejected => {
            warn!("Overlay client presented a wrong key, closing");
            let failed = OverlayEvent::AuthFailed {
                message: "invalid overlay key".into(),
            };
            if send_event(&mut sender, &failed).await {
                close(&mut sender, "authentication failed").await;
            }
            return;
        }
        Handshake::Violation => {
            warn!("Overlay client sent a non-auth frame before authenticating, closing");
            close(&mut sender, "authentication required").await;
            return;
        }
    }

    // Step 2: join the fanout set before acking so no broadcast slips
    // between the ack and the first queued frame
    let (conn_id, frames) = hub.register().await;

    let ack = OverlayEvent::AuthSuccess {
        message: "authenticated".into(),
    };
    if !send_event(&mut sender, &ack).await {
        hub.unregister(conn_id).await;
        return;
    }

    run_connection_loop(sender, receiver, hub, conn_id, frames, heartbeat).await;
}

async fn wait_for_auth(receiver: &mut SplitStream<WebSocket>, hub: &OverlayHub) -> Handshake {
    while let Some(Ok(msg)) = receiver.next().await {
        if let Some(handshake) = classify_handshake(hub, &msg) {
            return handshake;
        }
    }
    Handshake::Violation
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    hub: OverlayHub,
    conn_id: ConnectionId,
    mut frames: tokio::sync::mpsc::UnboundedReceiver<String>,
    heartbeat_every: Duration,
) {
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward queued frames to the client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(heartbeat_every);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                frame = frames.recv() => {
                    let Some(frame) = frame else { break };
                    if sender.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if !pong_flag_send.swap(false, Ordering::Acquire) {
                        warn!("Overlay {} missed heartbeat, terminating", conn_id);
                        break;
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Authenticated overlays are receive-only; inbound traffic only matters
    // for liveness and close
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                Message::Text(text) => {
                    let preview: String = text.chars().take(200).collect();
                    debug!("Overlay {} sent ignored frame: {}", conn_id, preview);
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    hub.unregister(conn_id).await;
    info!("Overlay {} disconnected", conn_id);
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &OverlayEvent) -> bool {
    let frame = match event.to_frame(chrono::Utc::now().timestamp_millis()) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Failed to serialize {} frame: {}", event.kind(), e);
            return false;
        }
    };
    sender.send(Message::Text(frame.into())).await.is_ok()
}

async fn close(sender: &mut SplitSink<WebSocket, Message>, reason: &'static str) {
    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: Utf8Bytes::from_static(reason),
    };
    let _ = sender.send(Message::Close(Some(frame))).await;
}
