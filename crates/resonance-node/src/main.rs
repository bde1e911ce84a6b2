//! Resonance Node binary
//!
//! Serves the shared memory store, its notification channel and the
//! presence relay.

use resonance_node::{NodeConfig, ResonanceNode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resonance_node=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Resonance Node");

    let config = NodeConfig::from_env()?;

    // Create and run node
    let node = ResonanceNode::new(config).await?;
    node.run().await?;

    Ok(())
}
