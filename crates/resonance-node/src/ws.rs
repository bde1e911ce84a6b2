//! WebSocket streaming for live store updates and presence.
//!
//! Clients can subscribe to:
//!
//! - `/api/v1/ws/feed/:topic` - inserts and clears on the store, plus a
//!   `gap` frame whenever the connection fell behind and lost events
//! - `/api/v1/ws/presence/:topic` - join/heartbeat/leave frames from every
//!   session on the topic
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     WebSocket      ┌──────────────────┐
//! │   Session   │ ←─────────────────→ │  Resonance API   │
//! └─────────────┘                     │  ┌────────────┐  │
//!                                     │  │    Hub     │  │
//!        POST /entries ─────────────→ │  │ (broadcast)│  │
//!                                     │  └────────────┘  │
//!                                     └──────────────────┘
//! ```
//!
//! The broadcast receiver is taken in the upgrade handler, before the 101
//! response goes out, so a client that has finished its handshake never
//! misses a later publish.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use resonance_core::{now_millis, FeedMessage, PresenceEvent};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

use crate::node::NodeState;

/// Keepalive period on the feed socket
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// WebSocket handler for store notifications
pub async fn ws_feed_handler(
    ws: WebSocketUpgrade,
    Path(topic): Path<String>,
    State(state): State<Arc<NodeState>>,
) -> impl IntoResponse {
    let rx = state.hub.subscribe_feed(&topic).await;
    ws.on_upgrade(move |socket| handle_feed_socket(socket, topic, rx))
}

/// Handle a WebSocket connection for store notifications
async fn handle_feed_socket(
    mut socket: WebSocket,
    topic: String,
    mut rx: broadcast::Receiver<FeedMessage>,
) {
    info!("Feed subscriber connected to {}", topic);

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    // The first tick completes immediately; skip it.
    heartbeat.tick().await;

    loop {
        tokio::select! {
            // Handle incoming messages from client
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Feed subscriber disconnected from {}", topic);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = socket.send(Message::Pong(data)).await {
                            warn!("Failed to send pong: {}", e);
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    // Feed is one-way; anything else is ignored.
                    _ => {}
                }
            }
            // Forward store mutations
            event = rx.recv() => {
                let Some(frame) = feed_frame(&topic, event) else {
                    info!("Feed on {} closed", topic);
                    break;
                };
                if let Err(e) = send_frame(&mut socket, &frame).await {
                    warn!("Failed to send feed event: {}", e);
                    break;
                }
            }
            _ = heartbeat.tick() => {
                let frame = FeedMessage::Heartbeat { timestamp: now_millis() };
                if let Err(e) = send_frame(&mut socket, &frame).await {
                    warn!("Failed to send heartbeat: {}", e);
                    break;
                }
            }
        }
    }
}

/// Frame to forward for a broadcast result. A lagged receiver yields a
/// gap frame and keeps going; `None` means the channel is gone.
fn feed_frame(topic: &str, event: Result<FeedMessage, RecvError>) -> Option<FeedMessage> {
    match event {
        Ok(frame) => Some(frame),
        Err(RecvError::Lagged(skipped)) => {
            warn!("Feed subscriber on {} lagged by {} events", topic, skipped);
            Some(FeedMessage::Gap)
        }
        Err(RecvError::Closed) => None,
    }
}

/// WebSocket handler for the presence relay
pub async fn ws_presence_handler(
    ws: WebSocketUpgrade,
    Path(topic): Path<String>,
    State(state): State<Arc<NodeState>>,
) -> impl IntoResponse {
    let rx = state.hub.subscribe_presence(&topic).await;
    ws.on_upgrade(move |socket| handle_presence_socket(socket, state, topic, rx))
}

/// Handle a WebSocket connection for presence
async fn handle_presence_socket(
    mut socket: WebSocket,
    state: Arc<NodeState>,
    topic: String,
    mut rx: broadcast::Receiver<PresenceEvent>,
) {
    debug!("Presence socket connected to {}", topic);

    // Sessions announced over this socket; they leave when it closes.
    let mut sessions: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<PresenceEvent>(&text) {
                            Ok(event) => {
                                match &event {
                                    PresenceEvent::Leave { session } => {
                                        sessions.remove(session);
                                    }
                                    other => {
                                        sessions.insert(other.session().to_string());
                                    }
                                }
                                state.hub.presence_event(&topic, event).await;
                            }
                            Err(e) => debug!("Ignoring malformed presence frame: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("Presence socket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        let json = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(e) => {
                                error!("Failed to encode presence event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    // Presence is eventually consistent; heartbeats repair it.
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    for session in sessions {
        state
            .hub
            .presence_event(&topic, PresenceEvent::Leave { session })
            .await;
    }
    debug!("Presence socket closed on {}", topic);
}

/// Send a feed frame over WebSocket
async fn send_frame(socket: &mut WebSocket, frame: &FeedMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(frame).map_err(axum::Error::new)?;
    socket.send(Message::Text(json)).await
}
