//! Test harness: a real node on an ephemeral port with a throwaway data dir.

use resonance_client::SessionConfig;
use resonance_node::{NodeConfig, NodeState, ResonanceNode, Result, DEFAULT_FEED_BUFFER};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Key every test node requires.
pub const TEST_KEY: &str = "test-key";

/// Grace period for a stopping server before it is aborted.
const STOP_GRACE: Duration = Duration::from_secs(1);

/// A running node. Stops when dropped.
pub struct TestNode {
    addr: SocketAddr,
    node: ResonanceNode,
    state: Arc<NodeState>,
    server: Option<Server>,
    _dir: TempDir,
}

struct Server {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl TestNode {
    pub async fn start() -> Result<Self> {
        Self::start_with(|_| {}).await
    }

    /// Start with a config adjusted by `tweak`.
    pub async fn start_with(tweak: impl FnOnce(&mut NodeConfig)) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let mut config = NodeConfig {
            data_dir: dir.path().to_path_buf(),
            api_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            admin_socket: dir.path().join("admin.sock"),
            api_key: Some(TEST_KEY.to_string()),
            feed_topic: "memories".to_string(),
            retention_cap: resonance_core::CAP,
            presence_timeout: Duration::from_secs(30),
            write_limit: 0,
            feed_buffer: DEFAULT_FEED_BUFFER,
        };
        tweak(&mut config);

        let listener = TcpListener::bind(config.api_addr).await?;
        let addr = listener.local_addr()?;
        let node = ResonanceNode::new(config).await?;
        let state = node.state();
        let server = spawn_server(node.clone(), listener);

        Ok(Self {
            addr,
            node,
            state,
            server: Some(server),
            _dir: dir,
        })
    }

    /// Stop serving HTTP and drop every live socket. Storage is kept.
    pub async fn stop(&mut self) {
        let Some(server) = self.server.take() else {
            return;
        };
        let _ = server.shutdown.send(());
        let mut task = server.task;
        if tokio::time::timeout(STOP_GRACE, &mut task).await.is_err() {
            task.abort();
            let _ = task.await;
        }
    }

    /// Stop, then serve again on the same address with the same storage.
    pub async fn restart(&mut self) -> Result<()> {
        self.stop().await;
        let listener = TcpListener::bind(self.addr).await?;
        self.server = Some(spawn_server(self.node.clone(), listener));
        Ok(())
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn state(&self) -> &Arc<NodeState> {
        &self.state
    }

    /// Session config pointing at this node with the right key.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::remote(&self.url(), TEST_KEY)
    }
}

fn spawn_server(node: ResonanceNode, listener: TcpListener) -> Server {
    let (shutdown, stopped) = oneshot::channel();
    let task = tokio::spawn(async move {
        let signal = async move {
            let _ = stopped.await;
        };
        if let Err(e) = node.serve_with_shutdown(listener, signal).await {
            tracing::error!("Test node stopped: {}", e);
        }
    });
    Server { shutdown, task }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        if let Some(server) = self.server.take() {
            server.task.abort();
        }
    }
}
