//! Resonance Node - the main application entry point.
//!
//! Architecture:
//! - Single daemon process with one shared RocksDB entry log
//! - HTTP API for the durable store contract
//! - WebSocket notification channel and presence relay
//! - Unix admin socket for local admin ops (resonance-admin CLI)

use crate::admin_socket::AdminSocket;
use crate::api;
use crate::error::{Error, Result};
use crate::hub::Hub;
use crate::limit::WriteLimiter;
use crate::storage::Storage;
use resonance_core::{Entry, EntryDraft, CAP};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// Default per-subscriber frame buffer
pub const DEFAULT_FEED_BUFFER: usize = 256;

/// Configuration for a Resonance node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Data directory for storage
    pub data_dir: PathBuf,

    /// HTTP API listen address
    pub api_addr: SocketAddr,

    /// Admin socket path (for resonance-admin CLI)
    pub admin_socket: PathBuf,

    /// Bearer key required on API and WebSocket requests, if set
    pub api_key: Option<String>,

    /// Topic that store mutations are published on
    pub feed_topic: String,

    /// Most entries retained before oldest-first eviction
    pub retention_cap: usize,

    /// Silence after which a presence session counts as gone
    pub presence_timeout: Duration,

    /// Accepted writes per second (0 = unlimited)
    pub write_limit: u32,

    /// Frames buffered per live subscriber before it is sent a gap
    pub feed_buffer: usize,
}

impl NodeConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        let data_dir = PathBuf::from(
            std::env::var("RESONANCE_DATA_DIR").unwrap_or_else(|_| "./resonance-data".to_string()),
        );

        let api_addr = std::env::var("RESONANCE_API_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|e| Error::Config(format!("Invalid RESONANCE_API_ADDR: {}", e)))?;

        let admin_socket = std::env::var("RESONANCE_ADMIN_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("admin.sock"));

        let api_key = std::env::var("RESONANCE_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let feed_topic =
            std::env::var("RESONANCE_FEED_TOPIC").unwrap_or_else(|_| "memories".to_string());

        Ok(Self {
            data_dir,
            api_addr,
            admin_socket,
            api_key,
            feed_topic,
            retention_cap: env_number("RESONANCE_RETENTION_CAP", CAP)?,
            presence_timeout: Duration::from_secs(env_number(
                "RESONANCE_PRESENCE_TIMEOUT_SECS",
                30,
            )?),
            write_limit: env_number("RESONANCE_WRITE_LIMIT", 20)?,
            feed_buffer: env_number("RESONANCE_FEED_BUFFER", DEFAULT_FEED_BUFFER)?,
        })
    }
}

fn env_number<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

/// Shared state for the node - one storage and one hub for every component.
pub struct NodeState {
    pub storage: Arc<Storage>,
    pub hub: Arc<Hub>,
    pub limiter: WriteLimiter,
    pub config: NodeConfig,
    /// Held across each mutation and its publish, so observers see
    /// mutations in commit order.
    order: Mutex<()>,
}

impl NodeState {
    pub fn new(storage: Arc<Storage>, hub: Arc<Hub>, config: NodeConfig) -> Self {
        Self {
            storage,
            hub,
            limiter: WriteLimiter::new(config.write_limit),
            config,
            order: Mutex::new(()),
        }
    }

    /// Store a draft and announce it.
    pub async fn append(&self, draft: &EntryDraft) -> Result<Entry> {
        let _order = self.order.lock().await;
        let entry = self.storage.append(draft)?;
        let receivers = self.hub.publish_insert(&entry).await;
        tracing::debug!("Accepted entry {:?} ({} live subscribers)", entry.id, receivers);
        Ok(entry)
    }

    /// Clear the durable log and tell every observer.
    pub async fn clear_all(&self) -> Result<usize> {
        let _order = self.order.lock().await;
        let removed = self.storage.clear_all()?;
        let receivers = self.hub.publish_clear().await;
        tracing::info!("Cleared {} entries ({} live subscribers)", removed, receivers);
        Ok(removed)
    }
}

/// A Resonance node instance. Clones share the same state.
#[derive(Clone)]
pub struct ResonanceNode {
    state: Arc<NodeState>,
}

impl ResonanceNode {
    /// Create a new node.
    pub async fn new(config: NodeConfig) -> Result<Self> {
        // Ensure data directory exists
        std::fs::create_dir_all(&config.data_dir)?;

        let storage = Arc::new(Storage::open(config.data_dir.join("entries"), config.retention_cap)?);
        let hub = Arc::new(Hub::with_capacity(
            config.feed_topic.clone(),
            config.presence_timeout,
            config.feed_buffer,
        ));

        let state = Arc::new(NodeState::new(storage, hub, config));

        Ok(Self { state })
    }

    /// Get the shared state (for API handlers).
    pub fn state(&self) -> Arc<NodeState> {
        Arc::clone(&self.state)
    }

    /// Run the node (starts admin socket and HTTP server).
    pub async fn run(self) -> Result<()> {
        let config = &self.state.config;
        tracing::info!("Resonance node starting");
        tracing::info!("  API: http://{}", config.api_addr);
        tracing::info!("  Admin: {:?}", config.admin_socket);
        tracing::info!("  Data: {:?}", config.data_dir);
        tracing::info!("  Retention cap: {}", self.state.storage.cap());
        if config.api_key.is_none() {
            tracing::warn!("RESONANCE_API_KEY not set; API is open");
        }

        // Start admin socket server in background
        let admin_socket = AdminSocket::new(Arc::clone(&self.state), &config.admin_socket);
        tokio::spawn(async move {
            if let Err(e) = admin_socket.run().await {
                tracing::error!("Admin socket error: {}", e);
            }
        });

        let listener = TcpListener::bind(config.api_addr).await?;
        self.serve(listener).await
    }

    /// Serve the HTTP API on an already-bound listener until Ctrl-C.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        self.serve_with_shutdown(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serve until `signal` resolves, then disconnect every live socket.
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sweeper =
            spawn_presence_sweeper(Arc::clone(&self.state.hub), self.state.config.presence_timeout);

        let app = api::build_router(self.state());
        let hub = Arc::clone(&self.state.hub);
        tracing::info!("HTTP server listening on {}", listener.local_addr()?);
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                signal.await;
                tracing::info!("Shutting down; closing live sockets");
                // Upgraded sockets outlive the HTTP server; end them here.
                hub.close_all().await;
            })
            .await;
        sweeper.abort();
        result?;

        Ok(())
    }
}

fn spawn_presence_sweeper(hub: Arc<Hub>, timeout: Duration) -> tokio::task::JoinHandle<()> {
    let period = (timeout / 3).max(Duration::from_millis(100));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            hub.sweep_presence(Instant::now()).await;
        }
    })
}
