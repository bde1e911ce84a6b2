//! Unix socket server for admin commands.
//!
//! Provides a local IPC interface for inspecting and clearing the store.

use crate::error::Result;
use crate::node::NodeState;
use resonance_core::Entry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// Admin command sent over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AdminCommand {
    /// Delete every entry and notify all observers
    ClearAll,
    /// Number of retained entries
    Count,
    /// Most recent entries
    ListRecent { limit: usize },
    /// Ping (health check)
    Ping,
}

/// Response from admin command.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    Entries { items: Vec<Entry> },
    Count { value: usize },
    Pong,
}

/// Admin socket server.
pub struct AdminSocket {
    state: Arc<NodeState>,
    socket_path: PathBuf,
}

impl AdminSocket {
    /// Create a new admin socket server.
    pub fn new(state: Arc<NodeState>, socket_path: impl AsRef<Path>) -> Self {
        Self {
            state,
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    /// Run the admin socket server.
    pub async fn run(&self) -> Result<()> {
        // Remove existing socket file if present
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Admin socket listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, state).await {
                            tracing::error!("Admin connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept admin connection: {}", e);
                }
            }
        }
    }

    /// Get the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

async fn handle_connection(stream: UnixStream, state: Arc<NodeState>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<AdminCommand>(&line) {
            Ok(cmd) => execute_command(cmd, &state).await,
            Err(e) => AdminResponse::Error {
                error: format!("Invalid command: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;
        line.clear();
    }

    Ok(())
}

async fn execute_command(cmd: AdminCommand, state: &NodeState) -> AdminResponse {
    match cmd {
        AdminCommand::ClearAll => match state.clear_all().await {
            Ok(removed) => AdminResponse::Ok {
                message: format!("Cleared {} entries", removed),
            },
            Err(e) => AdminResponse::Error {
                error: e.to_string(),
            },
        },

        AdminCommand::Count => match state.storage.len() {
            Ok(value) => AdminResponse::Count { value },
            Err(e) => AdminResponse::Error {
                error: e.to_string(),
            },
        },

        AdminCommand::ListRecent { limit } => match state.storage.list_recent(limit) {
            Ok(items) => AdminResponse::Entries { items },
            Err(e) => AdminResponse::Error {
                error: e.to_string(),
            },
        },

        AdminCommand::Ping => AdminResponse::Pong,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeConfig, ResonanceNode};
    use resonance_core::EntryDraft;
    use std::time::Duration;
    use tempfile::tempdir;

    fn config(dir: &Path) -> NodeConfig {
        NodeConfig {
            data_dir: dir.to_path_buf(),
            api_addr: "127.0.0.1:0".parse().unwrap(),
            admin_socket: dir.join("admin.sock"),
            api_key: None,
            feed_topic: "memories".into(),
            retention_cap: 100,
            presence_timeout: Duration::from_secs(30),
            write_limit: 0,
            feed_buffer: 256,
        }
    }

    #[tokio::test]
    async fn clear_all_broadcasts_and_empties() {
        let dir = tempdir().unwrap();
        let node = ResonanceNode::new(config(dir.path())).await.unwrap();
        let state = node.state();
        state.storage.append(&EntryDraft::compute("Hello", "Trust")).unwrap();
        let mut rx = state.hub.subscribe_feed("memories").await;

        let response = execute_command(AdminCommand::ClearAll, &state).await;
        assert!(matches!(response, AdminResponse::Ok { .. }));
        assert!(matches!(
            execute_command(AdminCommand::Count, &state).await,
            AdminResponse::Count { value: 0 }
        ));
        assert_eq!(rx.recv().await.unwrap(), resonance_core::FeedMessage::Clear);
    }

    #[tokio::test]
    async fn socket_round_trip() {
        let dir = tempdir().unwrap();
        let node = ResonanceNode::new(config(dir.path())).await.unwrap();
        let socket = AdminSocket::new(node.state(), dir.path().join("admin.sock"));
        let path = socket.socket_path().to_path_buf();
        tokio::spawn(async move { socket.run().await });

        // Wait for the listener to bind.
        let mut stream = None;
        for _ in 0..50 {
            if let Ok(s) = UnixStream::connect(&path).await {
                stream = Some(s);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let stream = stream.expect("admin socket did not come up");
        let (reader, mut writer) = stream.into_split();
        writer.write_all(b"{\"cmd\":\"ping\"}\n").await.unwrap();

        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(line.trim(), r#"{"status":"pong"}"#);
    }
}
