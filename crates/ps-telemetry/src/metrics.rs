//! Prometheus metrics for the peer-sync node.
//!
//! All metrics follow the naming convention: `ps_<area>_<metric>[_unit]`.
//! Gauges are set from subsystem stats by the node runtime; counters are
//! incremented where the event happens.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // PEER METRICS
    // =========================================================================

    /// Peers that completed the handshake and are still connected
    pub static ref PEERS_CONNECTED: IntGauge = IntGauge::new(
        "ps_peers_connected",
        "Number of peers in the ready state"
    ).expect("metric creation failed");

    /// Peers disconnected with a ban
    pub static ref PEERS_BANNED: IntCounter = IntCounter::new(
        "ps_peers_banned_total",
        "Total number of peers banned for misbehaviour"
    ).expect("metric creation failed");

    /// Connections closed for a protocol violation
    pub static ref PROTOCOL_VIOLATIONS: IntCounter = IntCounter::new(
        "ps_peers_protocol_violations_total",
        "Total connections closed for a protocol violation"
    ).expect("metric creation failed");

    /// Connections closed for an unanswered request or ping
    pub static ref REQUEST_TIMEOUTS: IntCounter = IntCounter::new(
        "ps_peers_request_timeouts_total",
        "Total connections closed for a request timeout"
    ).expect("metric creation failed");

    // =========================================================================
    // BLOCK ORACLE METRICS
    // =========================================================================

    /// Requested blocks not yet delivered
    pub static ref DOWNLOAD_QUEUE: IntGauge = IntGauge::new(
        "ps_oracle_download_queue",
        "Number of requested blocks not yet downloaded"
    ).expect("metric creation failed");

    /// Decoded blocks held in memory
    pub static ref RESIDENT_BLOCKS: IntGauge = IntGauge::new(
        "ps_oracle_resident_blocks",
        "Number of decoded blocks held in the cache"
    ).expect("metric creation failed");

    /// Blocks indexed by the oracle
    pub static ref BLOCKS_DOWNLOADED: IntCounter = IntCounter::new(
        "ps_oracle_blocks_downloaded_total",
        "Total number of blocks downloaded and indexed"
    ).expect("metric creation failed");

    // =========================================================================
    // MEMPOOL METRICS
    // =========================================================================

    /// Known transaction ids
    pub static ref MEMPOOL_IDS: IntGauge = IntGauge::new(
        "ps_mempool_ids",
        "Number of transaction ids in the mempool"
    ).expect("metric creation failed");

    /// Ids with their payload held
    pub static ref MEMPOOL_ACTIVE: IntGauge = IntGauge::new(
        "ps_mempool_active",
        "Number of mempool entries holding a payload"
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Peers
        Box::new(PEERS_CONNECTED.clone()),
        Box::new(PEERS_BANNED.clone()),
        Box::new(PROTOCOL_VIOLATIONS.clone()),
        Box::new(REQUEST_TIMEOUTS.clone()),
        // Oracle
        Box::new(DOWNLOAD_QUEUE.clone()),
        Box::new(RESIDENT_BLOCKS.clone()),
        Box::new(BLOCKS_DOWNLOADED.clone()),
        // Mempool
        Box::new(MEMPOOL_IDS.clone()),
        Box::new(MEMPOOL_ACTIVE.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn gather_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
