//! Topic fan-out for feed notifications and presence.
//!
//! Each topic owns a broadcast channel. Feed topics carry store mutations;
//! presence topics relay join/heartbeat/leave frames and keep a tracker so
//! the node can report counts and announce sessions that went silent.

use resonance_core::{Entry, FeedMessage, PresenceEvent, PresenceTracker};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

/// Buffered frames per subscriber before it is considered lagging.
const DEFAULT_CAPACITY: usize = 256;

struct PresenceRoom {
    tx: broadcast::Sender<PresenceEvent>,
    tracker: PresenceTracker,
}

/// Broadcast hub shared by the API, WebSocket handlers and admin socket.
pub struct Hub {
    feed_topic: String,
    capacity: usize,
    presence_timeout: Duration,
    feeds: Mutex<HashMap<String, broadcast::Sender<FeedMessage>>>,
    rooms: Mutex<HashMap<String, PresenceRoom>>,
}

impl Hub {
    /// Hub publishing store mutations on `feed_topic`.
    pub fn new(feed_topic: impl Into<String>, presence_timeout: Duration) -> Self {
        Self::with_capacity(feed_topic, presence_timeout, DEFAULT_CAPACITY)
    }

    /// Hub buffering `capacity` frames per subscriber.
    pub fn with_capacity(
        feed_topic: impl Into<String>,
        presence_timeout: Duration,
        capacity: usize,
    ) -> Self {
        Self {
            feed_topic: feed_topic.into(),
            capacity: capacity.max(1),
            presence_timeout,
            feeds: Mutex::new(HashMap::new()),
            rooms: Mutex::new(HashMap::new()),
        }
    }

    // --- Feed ---

    /// Subscribe to a feed topic. Subscribing before a publish guarantees
    /// the publish is seen (or reported as lag).
    pub async fn subscribe_feed(&self, topic: &str) -> broadcast::Receiver<FeedMessage> {
        let capacity = self.capacity;
        let mut feeds = self.feeds.lock().await;
        feeds
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe()
    }

    /// Announce an accepted entry. Returns the number of receivers.
    pub async fn publish_insert(&self, entry: &Entry) -> usize {
        self.publish(FeedMessage::Insert {
            entry: entry.clone(),
        })
        .await
    }

    /// Announce a clear-all. Returns the number of receivers.
    pub async fn publish_clear(&self) -> usize {
        self.publish(FeedMessage::Clear).await
    }

    async fn publish(&self, message: FeedMessage) -> usize {
        let feeds = self.feeds.lock().await;
        match feeds.get(&self.feed_topic) {
            // Err only means nobody is listening right now.
            Some(tx) => tx.send(message).unwrap_or(0),
            None => 0,
        }
    }

    /// Drop every channel. Open sockets see their stream end and
    /// disconnect; later subscribers get fresh channels.
    pub async fn close_all(&self) {
        let feeds = std::mem::take(&mut *self.feeds.lock().await);
        let rooms = std::mem::take(&mut *self.rooms.lock().await);
        info!(
            "Closed {} feed and {} presence channels",
            feeds.len(),
            rooms.len()
        );
    }

    // --- Presence ---

    pub async fn subscribe_presence(&self, topic: &str) -> broadcast::Receiver<PresenceEvent> {
        let mut rooms = self.rooms.lock().await;
        self.room(&mut rooms, topic).tx.subscribe()
    }

    /// Record a presence frame and relay it to the topic.
    pub async fn presence_event(&self, topic: &str, event: PresenceEvent) {
        let mut rooms = self.rooms.lock().await;
        let room = self.room(&mut rooms, topic);
        if room.tracker.apply(&event) {
            match &event {
                PresenceEvent::Leave { session } => info!("Session {} left {}", session, topic),
                _ => info!("Session {} joined {}", event.session(), topic),
            }
        }
        let _ = room.tx.send(event);
    }

    pub async fn presence_count(&self, topic: &str) -> usize {
        let rooms = self.rooms.lock().await;
        rooms
            .get(topic)
            .map(|room| room.tracker.current_count())
            .unwrap_or(0)
    }

    /// Expire silent sessions everywhere, relaying a `leave` for each.
    /// Returns how many expired.
    pub async fn sweep_presence(&self, now: Instant) -> usize {
        let mut rooms = self.rooms.lock().await;
        let mut total = 0;
        for (topic, room) in rooms.iter_mut() {
            for session in room.tracker.expire(now) {
                debug!("Session {} timed out on {}", session, topic);
                let _ = room.tx.send(PresenceEvent::Leave { session });
                total += 1;
            }
        }
        total
    }

    fn room<'a>(
        &self,
        rooms: &'a mut HashMap<String, PresenceRoom>,
        topic: &str,
    ) -> &'a mut PresenceRoom {
        let timeout = self.presence_timeout;
        let capacity = self.capacity;
        rooms
            .entry(topic.to_string())
            .or_insert_with(|| PresenceRoom {
                tx: broadcast::channel(capacity).0,
                tracker: PresenceTracker::new(timeout),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resonance_core::EntryDraft;

    fn entry() -> Entry {
        Entry::accept(EntryDraft::compute("Hello", "Trust"), Some("id1".into()), 1)
    }

    #[tokio::test]
    async fn inserts_reach_every_subscriber() {
        let hub = Hub::new("memories", Duration::from_secs(30));
        let mut a = hub.subscribe_feed("memories").await;
        let mut b = hub.subscribe_feed("memories").await;
        let mut other = hub.subscribe_feed("elsewhere").await;

        assert_eq!(hub.publish_insert(&entry()).await, 2);
        hub.publish_clear().await;

        for rx in [&mut a, &mut b] {
            assert_eq!(rx.recv().await.unwrap(), FeedMessage::Insert { entry: entry() });
            assert_eq!(rx.recv().await.unwrap(), FeedMessage::Clear);
        }
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let hub = Hub::new("memories", Duration::from_secs(30));
        assert_eq!(hub.publish_clear().await, 0);
    }

    #[tokio::test]
    async fn presence_relays_and_counts() {
        let hub = Hub::new("memories", Duration::from_secs(30));
        let mut rx = hub.subscribe_presence("lobby").await;

        hub.presence_event("lobby", PresenceEvent::Join { session: "a".into() }).await;
        hub.presence_event("lobby", PresenceEvent::Join { session: "b".into() }).await;
        assert_eq!(hub.presence_count("lobby").await, 2);
        assert_eq!(hub.presence_count("empty").await, 0);

        hub.presence_event("lobby", PresenceEvent::Leave { session: "a".into() }).await;
        assert_eq!(hub.presence_count("lobby").await, 1);

        assert_eq!(rx.recv().await.unwrap().session(), "a");
        assert_eq!(rx.recv().await.unwrap().session(), "b");
        assert!(matches!(rx.recv().await.unwrap(), PresenceEvent::Leave { .. }));
    }

    #[tokio::test]
    async fn sweep_announces_expired_sessions() {
        let hub = Hub::new("memories", Duration::from_secs(5));
        hub.presence_event("lobby", PresenceEvent::Join { session: "a".into() }).await;
        let mut rx = hub.subscribe_presence("lobby").await;

        let expired = hub
            .sweep_presence(Instant::now() + Duration::from_secs(6))
            .await;
        assert_eq!(expired, 1);
        assert_eq!(hub.presence_count("lobby").await, 0);
        assert_eq!(
            rx.recv().await.unwrap(),
            PresenceEvent::Leave { session: "a".into() }
        );
    }

    #[tokio::test]
    async fn slow_subscriber_lags_past_capacity() {
        let hub = Hub::with_capacity("memories", Duration::from_secs(30), 2);
        let mut rx = hub.subscribe_feed("memories").await;
        for _ in 0..5 {
            hub.publish_insert(&entry()).await;
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
        assert_eq!(rx.recv().await.unwrap(), FeedMessage::Insert { entry: entry() });
    }

    #[tokio::test]
    async fn close_all_ends_open_streams() {
        let hub = Hub::new("memories", Duration::from_secs(30));
        let mut feed = hub.subscribe_feed("memories").await;
        let mut presence = hub.subscribe_presence("lobby").await;

        hub.close_all().await;
        assert!(matches!(
            feed.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert!(matches!(
            presence.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));

        // A fresh subscriber gets a working channel.
        let mut again = hub.subscribe_feed("memories").await;
        hub.publish_clear().await;
        assert_eq!(again.recv().await.unwrap(), FeedMessage::Clear);
    }
}
