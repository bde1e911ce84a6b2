//! Presence tracking.
//!
//! Sessions announce themselves with `join`, keep alive with `heartbeat`
//! and leave explicitly or by going quiet for longer than the timeout.
//! Only the count is meant for display; it may briefly overcount while
//! sessions churn.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Presence frames, relayed verbatim to every subscriber of a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresenceEvent {
    Join { session: String },
    Heartbeat { session: String },
    Leave { session: String },
}

impl PresenceEvent {
    pub fn session(&self) -> &str {
        match self {
            Self::Join { session } | Self::Heartbeat { session } | Self::Leave { session } => {
                session
            }
        }
    }
}

/// Set of live sessions keyed by opaque id.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    timeout: Duration,
    last_seen: HashMap<String, Instant>,
}

impl PresenceTracker {
    /// Tracker expiring sessions silent for longer than `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_seen: HashMap::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn join(&mut self, session: &str) {
        self.join_at(session, Instant::now());
    }

    pub fn join_at(&mut self, session: &str, now: Instant) {
        self.last_seen.insert(session.to_string(), now);
    }

    /// Refresh a session. Unknown sessions are treated as joining, which
    /// covers heartbeats seen before (or instead of) the join.
    pub fn heartbeat(&mut self, session: &str) {
        self.heartbeat_at(session, Instant::now());
    }

    pub fn heartbeat_at(&mut self, session: &str, now: Instant) {
        self.join_at(session, now);
    }

    /// Returns whether the session was present.
    pub fn leave(&mut self, session: &str) -> bool {
        self.last_seen.remove(session).is_some()
    }

    /// Apply a relayed frame. Returns whether membership changed.
    pub fn apply_at(&mut self, event: &PresenceEvent, now: Instant) -> bool {
        match event {
            PresenceEvent::Join { session } | PresenceEvent::Heartbeat { session } => {
                let joined = !self.last_seen.contains_key(session);
                self.join_at(session, now);
                joined
            }
            PresenceEvent::Leave { session } => self.leave(session),
        }
    }

    pub fn apply(&mut self, event: &PresenceEvent) -> bool {
        self.apply_at(event, Instant::now())
    }

    /// Drop sessions whose last heartbeat is older than the timeout.
    /// Returns the expired ids.
    pub fn expire(&mut self, now: Instant) -> Vec<String> {
        let timeout = self.timeout;
        let expired: Vec<String> = self
            .last_seen
            .iter()
            .filter(|(_, seen)| now.saturating_duration_since(**seen) > timeout)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.last_seen.remove(id);
        }
        expired
    }

    pub fn contains(&self, session: &str) -> bool {
        self.last_seen.contains_key(session)
    }

    pub fn current_count(&self) -> usize {
        self.last_seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_and_leave() {
        let mut tracker = PresenceTracker::new(Duration::from_secs(30));
        tracker.join("a");
        tracker.join("b");
        tracker.join("a");
        assert_eq!(tracker.current_count(), 2);

        assert!(tracker.leave("a"));
        assert!(!tracker.leave("a"));
        assert_eq!(tracker.current_count(), 1);
    }

    #[test]
    fn silent_sessions_expire() {
        let mut tracker = PresenceTracker::new(Duration::from_secs(10));
        let start = Instant::now();
        tracker.join_at("quiet", start);
        tracker.join_at("chatty", start);
        tracker.heartbeat_at("chatty", start + Duration::from_secs(8));

        let expired = tracker.expire(start + Duration::from_secs(11));
        assert_eq!(expired, vec!["quiet".to_string()]);
        assert!(tracker.contains("chatty"));
        assert_eq!(tracker.current_count(), 1);
    }

    #[test]
    fn heartbeat_from_unknown_session_counts() {
        let mut tracker = PresenceTracker::new(Duration::from_secs(10));
        let event = PresenceEvent::Heartbeat {
            session: "late".into(),
        };
        assert!(tracker.apply(&event));
        assert!(!tracker.apply(&event));
        assert_eq!(tracker.current_count(), 1);
    }

    #[test]
    fn frames_round_trip_tags() {
        let json = serde_json::to_string(&PresenceEvent::Join {
            session: "s1".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"join","session":"s1"}"#);
        let parsed: PresenceEvent =
            serde_json::from_str(r#"{"type":"leave","session":"s1"}"#).unwrap();
        assert_eq!(parsed.session(), "s1");
    }
}
