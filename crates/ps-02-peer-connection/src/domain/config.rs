//! Connection configuration.

use ps_01_wire_codec::{services, MIN_PROTOCOL_VERSION, PROTOCOL_VERSION};
use std::time::Duration;

/// Per-connection protocol parameters.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Interval between our pings.
    pub ping_interval: Duration,
    /// A connection silent for this many ping intervals is dead.
    pub dead_after_pings: u32,
    /// Deadline for the version/verack exchange.
    pub handshake_timeout: Duration,
    /// Deadline for getdata/getheaders answers.
    pub request_timeout: Duration,
    /// Unknown commands tolerated before banning.
    pub unknown_command_tolerance: u32,
    /// Version we advertise.
    pub protocol_version: i32,
    /// Oldest version we accept.
    pub min_protocol_version: i32,
    pub user_agent: String,
    /// Service bits we advertise.
    pub services: u64,
    /// Ask peers to relay transactions to us.
    pub relay: bool,
    /// Timer granularity of the connection driver.
    pub tick_interval: Duration,
    /// Capacity of the command channel.
    pub command_buffer: usize,
    /// Transaction ids remembered per peer for relay de-duplication.
    pub max_announced: usize,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(15),
            dead_after_pings: 3,
            handshake_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            unknown_command_tolerance: 10,
            protocol_version: PROTOCOL_VERSION,
            min_protocol_version: MIN_PROTOCOL_VERSION,
            user_agent: format!("/peer-sync:{}/", env!("CARGO_PKG_VERSION")),
            services: services::NODE_WITNESS,
            relay: true,
            tick_interval: Duration::from_secs(1),
            command_buffer: 64,
            max_announced: 50_000,
        }
    }
}

impl PeerConfig {
    /// Silence after which the connection is torn down.
    pub fn dead_after(&self) -> Duration {
        self.ping_interval * self.dead_after_pings
    }
}
