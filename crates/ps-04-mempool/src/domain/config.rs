//! Mempool configuration.

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct MempoolConfig {
    /// Age after which a payload is cleared and the entry kept id-only.
    pub tx_limit: Duration,
    /// Age after which an entry is removed entirely.
    pub txid_limit: Duration,
    /// Most ids held at once. Past it the oldest sighting is dropped.
    pub max_ids: usize,
    /// Capacity of the actor's command queue.
    pub command_buffer: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            tx_limit: Duration::from_secs(60 * 60),
            txid_limit: Duration::from_secs(24 * 60 * 60),
            max_ids: 300_000,
            command_buffer: 1024,
        }
    }
}
