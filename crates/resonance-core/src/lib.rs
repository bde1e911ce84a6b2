//! Resonance Core - shared memory feed without the network
//!
//! Everything a Resonance session needs that does not touch a socket:
//!
//! - **Score**: the deterministic coherence score and response table
//! - **Entry**: submitted records and their validation rules
//! - **Store**: the [`MemoryStore`] seam plus the in-process [`LocalStore`]
//! - **Feed**: live-feed states, events and wire frames
//! - **Subscription**: handles with deterministic unsubscribe
//! - **Presence**: heartbeat-driven session tracking
//! - **View / Controller**: the capped, de-duplicated view and the
//!   [`FeedController`] that keeps it in sync
//!
//! The networked store and feed live in `resonance-client`; the backend
//! they talk to lives in `resonance-node`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use resonance_core::{FeedController, LocalStore};
//!
//! # async fn demo() {
//! let store = Arc::new(LocalStore::new());
//! let mut feed = store.subscribe();
//! let mut controller = FeedController::new(store);
//!
//! controller.bootstrap().await;
//! controller.submit("Hello", "Trust").await;
//! if let Some(event) = feed.next().await {
//!     controller.handle(event).await;
//! }
//! assert_eq!(controller.view().len(), 1);
//! # }
//! ```

pub mod controller;
pub mod entry;
pub mod error;
pub mod feed;
pub mod presence;
pub mod score;
pub mod store;
pub mod subscription;
pub mod view;

pub use controller::{ConnectionState, DegradedReason, FeedController, SubmitOutcome};
pub use entry::{now_millis, Entry, EntryDraft};
pub use error::{StoreError, StoreResult};
pub use feed::{FeedEvent, FeedMessage, FeedState};
pub use presence::{PresenceEvent, PresenceTracker};
pub use score::{Response, ScoreEngine, RESPONSE_TABLE};
pub use store::{LocalStore, MemoryStore, CAP};
pub use subscription::Subscription;
pub use view::{MemoryView, VIEW_CAPACITY};
