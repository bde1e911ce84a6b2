//! Presence over the node's relay.
//!
//! [`PresenceLink`] announces this session on the presence topic,
//! heartbeats it, and counts the sessions it hears about. The count is
//! published on a `watch` channel.

use crate::backoff::Backoff;
use crate::config::SessionConfig;
use crate::error::Result;
use crate::live::{connect, Socket};
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use resonance_core::{PresenceEvent, PresenceTracker};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

/// Missed heartbeats before a peer counts as gone.
const MISSED_HEARTBEATS: u32 = 3;

/// Handle to a running presence session. Dropping it leaves.
pub struct PresenceLink {
    session_id: String,
    count: watch::Receiver<usize>,
    task: JoinHandle<()>,
}

impl PresenceLink {
    /// Join the configured presence topic as `session_id`.
    pub fn spawn(config: &SessionConfig, session_id: impl Into<String>) -> Result<Self> {
        let session_id = session_id.into();
        let url = config.ws_url(&format!("api/v1/ws/presence/{}", config.presence_topic))?;
        let (count_tx, count) = watch::channel(0);
        let link = Link {
            url,
            credential: config.credential.clone(),
            connect_timeout: config.timeout,
            heartbeat: config.heartbeat,
            session: session_id.clone(),
            tracker: PresenceTracker::new(config.heartbeat * MISSED_HEARTBEATS),
            count_tx,
        };
        let task = tokio::spawn(link.run());
        Ok(Self {
            session_id,
            count,
            task,
        })
    }

    /// Fresh random session id.
    pub fn new_session_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Sessions currently present, this one included.
    pub fn count(&self) -> usize {
        *self.count.borrow()
    }

    /// Receiver notified whenever the count changes.
    pub fn watch(&self) -> watch::Receiver<usize> {
        self.count.clone()
    }
}

impl Drop for PresenceLink {
    fn drop(&mut self) {
        // Closing the socket makes the node announce our leave.
        self.task.abort();
    }
}

struct Link {
    url: Url,
    credential: Option<String>,
    connect_timeout: Duration,
    heartbeat: Duration,
    session: String,
    tracker: PresenceTracker,
    count_tx: watch::Sender<usize>,
}

impl Link {
    async fn run(mut self) {
        let mut backoff = Backoff::default();
        loop {
            match connect(&self.url, self.credential.as_deref(), self.connect_timeout).await {
                Ok(socket) => {
                    backoff.reset();
                    info!("Joined presence as {}", self.session);
                    if let Err(e) = self.session_loop(socket).await {
                        warn!("Presence link dropped: {}", e);
                    }
                }
                Err(e) => warn!("Presence connect to {} failed: {}", self.url, e),
            }
            let delay = backoff.next_delay();
            debug!("Reconnecting presence in {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }

    async fn session_loop(&mut self, mut socket: Socket) -> Result<()> {
        let join = PresenceEvent::Join {
            session: self.session.clone(),
        };
        self.tracker.apply(&join);
        self.publish();
        send_event(&mut socket, &join).await?;

        let mut ticker = tokio::time::interval(self.heartbeat);
        ticker.tick().await;

        loop {
            tokio::select! {
                msg = socket.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<PresenceEvent>(&text) {
                            Ok(event) => {
                                if self.tracker.apply(&event) {
                                    self.publish();
                                }
                                // Answer a newcomer so it counts us without
                                // waiting for our next beat.
                                if matches!(&event, PresenceEvent::Join { session } if *session != self.session) {
                                    let beat = PresenceEvent::Heartbeat {
                                        session: self.session.clone(),
                                    };
                                    send_event(&mut socket, &beat).await?;
                                }
                            }
                            Err(e) => debug!("Ignoring malformed presence frame: {}", e),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => socket.send(Message::Pong(data)).await?,
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },
                _ = ticker.tick() => {
                    let beat = PresenceEvent::Heartbeat {
                        session: self.session.clone(),
                    };
                    self.tracker.apply(&beat);
                    send_event(&mut socket, &beat).await?;
                    let gone = self.tracker.expire(Instant::now());
                    if !gone.is_empty() {
                        debug!("Presence expired {} sessions", gone.len());
                    }
                    self.publish();
                }
            }
        }
    }

    fn publish(&self) {
        let count = self.tracker.current_count();
        self.count_tx.send_if_modified(|current| {
            if *current == count {
                false
            } else {
                *current = count;
                true
            }
        });
    }
}

async fn send_event(socket: &mut Socket, event: &PresenceEvent) -> Result<()> {
    let json = serde_json::to_string(event)?;
    socket.send(Message::Text(json)).await?;
    Ok(())
}
