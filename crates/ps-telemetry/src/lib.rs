//! # Peer-Sync Telemetry
//!
//! Logging initialisation and process-wide Prometheus metrics.
//!
//! ```rust,ignore
//! use ps_telemetry::{init_logging, register_metrics, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_logging(&config)?;
//! register_metrics()?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PS_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `PS_JSON_LOGS` | `false` | JSON formatted output |

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    gather_metrics, register_metrics, BLOCKS_DOWNLOADED, DOWNLOAD_QUEUE, MEMPOOL_ACTIVE,
    MEMPOOL_IDS, PEERS_BANNED, PEERS_CONNECTED, PROTOCOL_VIOLATIONS, REQUEST_TIMEOUTS,
    RESIDENT_BLOCKS,
};

use thiserror::Error;

/// Telemetry initialisation errors.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("failed to initialise logging: {0}")]
    LoggingInit(String),

    #[error("failed to initialise metrics: {0}")]
    MetricsInit(String),
}
