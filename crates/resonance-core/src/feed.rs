//! Live feed states, events and wire frames.

use crate::entry::Entry;
use serde::{Deserialize, Serialize};

/// Connection state of a live feed.
///
/// `Idle -> Connecting -> Active -> Reconnecting`; `Reconnecting` returns
/// to `Active` on its own. An unsubscribed feed emits nothing further;
/// that shows through [`Subscription::is_closed`](crate::Subscription::is_closed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Idle,
    Connecting,
    Active,
    Reconnecting,
}

impl std::fmt::Display for FeedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Active => write!(f, "active"),
            Self::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Normalized event delivered to local observers.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// An entry was accepted. May arrive more than once.
    Inserted(Entry),
    /// The store was cleared
    Cleared,
    /// Delivery may have skipped events; reconcile from the store
    PossibleGap,
    /// The feed changed connection state
    State(FeedState),
}

/// Frames sent by the notification channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    Insert { entry: Entry },
    Clear,
    /// Subscriber fell behind and events were dropped server-side
    Gap,
    /// Keepalive
    Heartbeat { timestamp: u64 },
}

impl FeedMessage {
    /// Map a frame to the event observers care about.
    pub fn into_event(self) -> Option<FeedEvent> {
        match self {
            FeedMessage::Insert { entry } => Some(FeedEvent::Inserted(entry)),
            FeedMessage::Clear => Some(FeedEvent::Cleared),
            FeedMessage::Gap => Some(FeedEvent::PossibleGap),
            FeedMessage::Heartbeat { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_tags() {
        let json = serde_json::to_string(&FeedMessage::Clear).unwrap();
        assert_eq!(json, r#"{"type":"clear"}"#);

        let frame: FeedMessage = serde_json::from_str(
            r#"{"type":"insert","entry":{"id":"a","x":"Hi","y":"Trust","z":"z","score":58,"timestamp":3}}"#,
        )
        .unwrap();
        match frame.into_event() {
            Some(FeedEvent::Inserted(entry)) => assert_eq!(entry.id.as_deref(), Some("a")),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn heartbeat_is_silent() {
        let frame: FeedMessage =
            serde_json::from_str(r#"{"type":"heartbeat","timestamp":12}"#).unwrap();
        assert_eq!(frame.into_event(), None);
        assert_eq!(FeedMessage::Gap.into_event(), Some(FeedEvent::PossibleGap));
    }
}
