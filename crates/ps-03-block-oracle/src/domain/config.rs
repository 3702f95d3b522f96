//! Block oracle configuration.

use std::time::Duration;

/// Cache and download parameters.
#[derive(Clone, Debug)]
pub struct OracleConfig {
    /// Decoded blocks kept in memory before the oldest overflows to the
    /// block database.
    pub cache_limit: usize,
    /// How long an assigned hash may stay undelivered before it is taken
    /// back and requeued at the front.
    pub download_timeout: Duration,
    /// Download-timeout expiries tolerated before a request resolves empty.
    pub max_retries: u32,
    /// Upper bound on hashes handed to one peer at once.
    pub max_batch: usize,
    /// Batch size for peers without delivery history.
    pub default_batch: usize,
    /// Capacity of the actor's command queue.
    pub command_buffer: usize,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            cache_limit: 64,
            download_timeout: Duration::from_secs(20),
            max_retries: 5,
            max_batch: 16,
            default_batch: 4,
            command_buffer: 1024,
        }
    }
}
