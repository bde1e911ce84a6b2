//! Live store notifications over WebSocket.
//!
//! A background task holds the connection to `/api/v1/ws/feed/:topic`,
//! reconnecting with [`Backoff`] whenever it drops. Every state change is
//! delivered as [`FeedEvent::State`]. The node keeps no backlog, so every
//! entry into `Active` (the first connect included) and every `gap` frame
//! is followed by [`FeedEvent::PossibleGap`].

use crate::backoff::Backoff;
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use resonance_core::{FeedEvent, FeedMessage, FeedState, Subscription};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{header::AUTHORIZATION, HeaderValue},
        protocol::Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

pub(crate) type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The node heartbeats every 15 s; three missed beats means the link is dead.
const IDLE_LIMIT: Duration = Duration::from_secs(45);

/// WebSocket implementation of the live feed.
pub struct WsLiveFeed;

impl WsLiveFeed {
    /// Start following the configured feed topic.
    pub fn subscribe(config: &SessionConfig) -> Result<Subscription<FeedEvent>> {
        let url = config.ws_url(&format!("api/v1/ws/feed/{}", config.feed_topic))?;
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(connection_loop(
            url,
            config.credential.clone(),
            config.timeout,
            tx,
        ));
        Ok(Subscription::with_task(rx, task))
    }
}

/// Why a connected feed stopped.
enum Disconnect {
    /// Transport closed or failed; try again
    Dropped,
    /// Nobody is listening any more
    Unsubscribed,
}

async fn connection_loop(
    url: Url,
    credential: Option<String>,
    connect_timeout: Duration,
    tx: UnboundedSender<FeedEvent>,
) {
    let mut backoff = Backoff::default();
    let mut state = FeedState::Idle;

    if !transition(&tx, &mut state, FeedState::Connecting) {
        return;
    }

    loop {
        match connect(&url, credential.as_deref(), connect_timeout).await {
            Ok(socket) => {
                backoff.reset();
                if !go_active(&tx, &mut state) {
                    return;
                }
                match pump(socket, &tx).await {
                    Disconnect::Dropped => info!("Live feed on {} dropped", url),
                    Disconnect::Unsubscribed => return,
                }
            }
            Err(e) => warn!("Live feed connect to {} failed: {}", url, e),
        }

        if !transition(&tx, &mut state, FeedState::Reconnecting) {
            return;
        }
        let delay = backoff.next_delay();
        info!("Reconnecting live feed in {:?}", delay);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = tx.closed() => return,
        }
    }
}

/// Record and announce a state change. False once the subscriber is gone.
fn transition(tx: &UnboundedSender<FeedEvent>, state: &mut FeedState, next: FeedState) -> bool {
    if *state == next {
        return true;
    }
    debug!("Live feed {} -> {}", state, next);
    *state = next;
    tx.send(FeedEvent::State(next)).is_ok()
}

/// Enter `Active`. Writes made before the socket opened were never
/// pushed to us, so the subscriber is told to reconcile.
fn go_active(tx: &UnboundedSender<FeedEvent>, state: &mut FeedState) -> bool {
    transition(tx, state, FeedState::Active) && tx.send(FeedEvent::PossibleGap).is_ok()
}

/// Open a WebSocket, presenting the credential as a bearer token.
pub(crate) async fn connect(url: &Url, credential: Option<&str>, limit: Duration) -> Result<Socket> {
    let mut request = url.as_str().into_client_request()?;
    if let Some(key) = credential {
        let value = HeaderValue::from_str(&format!("Bearer {}", key))
            .map_err(|e| Error::Config(format!("credential is not a valid header: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    let (socket, _) = tokio::time::timeout(limit, connect_async(request))
        .await
        .map_err(|_| Error::Timeout(limit))??;
    Ok(socket)
}

async fn pump(mut socket: Socket, tx: &UnboundedSender<FeedEvent>) -> Disconnect {
    loop {
        tokio::select! {
            msg = tokio::time::timeout(IDLE_LIMIT, socket.next()) => {
                match msg {
                    Ok(Some(Ok(Message::Text(text)))) => {
                        match serde_json::from_str::<FeedMessage>(&text) {
                            Ok(frame) => {
                                if let Some(event) = frame.into_event() {
                                    if tx.send(event).is_err() {
                                        return Disconnect::Unsubscribed;
                                    }
                                }
                            }
                            Err(e) => debug!("Ignoring malformed feed frame: {}", e),
                        }
                    }
                    Ok(Some(Ok(Message::Ping(data)))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            return Disconnect::Dropped;
                        }
                    }
                    Ok(Some(Ok(Message::Close(frame)))) => {
                        debug!("Node closed live feed: {:?}", frame);
                        return Disconnect::Dropped;
                    }
                    Ok(Some(Ok(_))) => {}
                    Ok(Some(Err(e))) => {
                        warn!("Live feed error: {}", e);
                        return Disconnect::Dropped;
                    }
                    Ok(None) => return Disconnect::Dropped,
                    Err(_) => {
                        warn!("Live feed silent for {:?}", IDLE_LIMIT);
                        return Disconnect::Dropped;
                    }
                }
            }
            _ = tx.closed() => return Disconnect::Unsubscribed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_only_config_cannot_subscribe() {
        assert!(matches!(
            WsLiveFeed::subscribe(&SessionConfig::default()),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_node_reconnects_without_failing() {
        let mut config = SessionConfig::remote("http://127.0.0.1:9", "key");
        config.timeout = Duration::from_millis(200);
        let mut feed = WsLiveFeed::subscribe(&config).unwrap();

        assert_eq!(feed.next().await, Some(FeedEvent::State(FeedState::Connecting)));
        assert_eq!(feed.next().await, Some(FeedEvent::State(FeedState::Reconnecting)));

        feed.unsubscribe();
        feed.unsubscribe();
        assert_eq!(feed.next().await, None);
    }

    #[tokio::test]
    async fn transition_skips_repeats() {
        let (tx, mut sub) = Subscription::channel();
        let mut state = FeedState::Idle;
        assert!(transition(&tx, &mut state, FeedState::Connecting));
        assert!(transition(&tx, &mut state, FeedState::Connecting));
        assert_eq!(sub.try_next(), Some(FeedEvent::State(FeedState::Connecting)));
        assert_eq!(sub.try_next(), None);

        sub.unsubscribe();
        assert!(!transition(&tx, &mut state, FeedState::Active));
    }

    #[tokio::test]
    async fn every_activation_asks_for_reconcile() {
        let (tx, mut sub) = Subscription::channel();
        let mut state = FeedState::Connecting;

        assert!(go_active(&tx, &mut state));
        assert_eq!(sub.try_next(), Some(FeedEvent::State(FeedState::Active)));
        assert_eq!(sub.try_next(), Some(FeedEvent::PossibleGap));

        assert!(transition(&tx, &mut state, FeedState::Reconnecting));
        assert!(go_active(&tx, &mut state));
        assert_eq!(sub.try_next(), Some(FeedEvent::State(FeedState::Reconnecting)));
        assert_eq!(sub.try_next(), Some(FeedEvent::State(FeedState::Active)));
        assert_eq!(sub.try_next(), Some(FeedEvent::PossibleGap));
        assert_eq!(sub.try_next(), None);
    }
}
