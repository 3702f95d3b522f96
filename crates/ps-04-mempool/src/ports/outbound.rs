//! Outbound (Driven) ports for the mempool.

use crate::domain::Timestamp;
use async_trait::async_trait;
use shared_types::{hash_from_hex, Hash, Transaction};
use std::time::Instant;

/// Source of the unconfirmed transactions to seed the pool with.
#[async_trait]
pub trait WalletDatabase: Send + Sync {
    async fn unconfirmed_transactions(&self) -> Vec<Hash>;
}

/// Materialises transactions known to the blockchain store.
#[async_trait]
pub trait TransactionLoader: Send + Sync {
    async fn load_transaction(&self, txid: &Hash) -> Option<Transaction>;

    /// Same, keyed by the display (byte-reversed) hex id.
    async fn load_transaction_hex(&self, txid: &str) -> Option<Transaction> {
        let txid = hash_from_hex(txid)?;
        self.load_transaction(&txid).await
    }
}

/// Time source for eviction ages.
///
/// Abstracted to allow testing with deterministic time.
pub trait TimeSource: Send + Sync {
    /// Milliseconds on a clock that never goes backwards.
    fn now(&self) -> Timestamp;
}

/// Milliseconds since the source was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTimeSource {
    origin: Instant,
}

impl MonotonicTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTimeSource {
    fn now(&self) -> Timestamp {
        self.origin.elapsed().as_millis() as Timestamp
    }
}

/// Manually advanced clock for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockTimeSource {
    now: std::sync::atomic::AtomicU64,
}

#[cfg(test)]
impl MockTimeSource {
    pub fn advance(&self, by: std::time::Duration) {
        self.now.fetch_add(
            by.as_millis() as u64,
            std::sync::atomic::Ordering::SeqCst,
        );
    }
}

#[cfg(test)]
impl TimeSource for MockTimeSource {
    fn now(&self) -> Timestamp {
        self.now.load(std::sync::atomic::Ordering::SeqCst)
    }
}
