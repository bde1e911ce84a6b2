//! Resonance Node - durable memory store with live fan-out
//!
//! Hosts the shared, bounded entry log that every Resonance session writes
//! to, and fans each mutation out to connected sessions.
//!
//! # Architecture
//!
//! - **Storage**: RocksDB-backed FIFO log, evicting oldest past the retention cap
//! - **Hub**: per-topic broadcast of inserts/clears and the presence relay
//! - **API**: HTTP endpoints for append/list/clear plus WebSocket streams
//! - **Admin Socket**: Unix socket for local admin commands (resonance-admin CLI)
//!
//! # Example
//!
//! ```no_run
//! use resonance_node::{NodeConfig, ResonanceNode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::from_env()?;
//!     let node = ResonanceNode::new(config).await?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod admin_socket;
pub mod api;
pub mod error;
pub mod hub;
pub mod limit;
pub mod node;
pub mod storage;
pub mod ws;

pub use error::{Error, Result};
pub use hub::Hub;
pub use node::{NodeConfig, NodeState, ResonanceNode, DEFAULT_FEED_BUFFER};
pub use storage::Storage;
