//! Resonance client - networked side of a session
//!
//! Connects a [`resonance_core::FeedController`] to a running
//! `resonance-node`:
//!
//! - [`RemoteStore`]: the durable store over HTTP
//! - [`WsLiveFeed`]: store notifications over WebSocket, reconnecting with
//!   jittered exponential backoff
//! - [`PresenceLink`]: joins the presence topic and keeps a live count
//!
//! Everything is driven by a [`SessionConfig`]. A config without a usable
//! endpoint and credential is local-only and makes no network calls.

pub mod backoff;
pub mod config;
pub mod error;
pub mod live;
pub mod presence;
pub mod remote;

pub use backoff::Backoff;
pub use config::SessionConfig;
pub use error::{Error, Result};
pub use live::WsLiveFeed;
pub use presence::PresenceLink;
pub use remote::RemoteStore;
