//! # Peer-Sync Node
//!
//! ```text
//! PS_CONFIG=node.toml PS_CONNECT=127.0.0.1:18444 node-runtime
//! ```

use anyhow::{Context, Result};
use tracing::{debug, info};

use node_runtime::{Collaborators, NodeConfig, NodeRuntime};
use ps_telemetry::{gather_metrics, init_logging, register_metrics};

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::load().context("failed to load configuration")?;
    init_logging(&config.telemetry).context("failed to initialise logging")?;
    register_metrics().context("failed to register metrics")?;

    let collaborators = Collaborators::in_memory(config.network.chain);
    let runtime = NodeRuntime::start(config, collaborators).await?;

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for Ctrl+C")?;

    runtime.shutdown().await;
    if let Ok(metrics) = gather_metrics() {
        debug!(%metrics, "Final metrics");
    }
    Ok(())
}
