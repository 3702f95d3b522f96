//! Inbound (Driving) port for the mempool.

use async_trait::async_trait;
use shared_types::{Hash, Transaction};
use std::sync::Arc;

/// Primary mempool API.
///
/// Reads (`dump`, `query`) take a shared lock and return immediately;
/// submissions and the heartbeat are serialised through the actor.
#[async_trait]
pub trait MempoolApi: Send + Sync {
    /// Every known id.
    fn dump(&self) -> Vec<Hash>;

    fn query(&self, txid: &Hash) -> Option<Arc<Transaction>>;

    /// Registers an announced id. `false` when it was already known.
    async fn submit_id(&self, txid: Hash) -> bool;

    /// Per id, whether it was newly registered.
    async fn submit_ids(&self, txids: Vec<Hash>) -> Vec<bool>;

    /// Whether this was the first payload for the id.
    async fn submit_transaction(&self, tx: Transaction) -> bool;

    async fn submit_transactions(&self, txs: Vec<Transaction>) -> Vec<bool>;

    /// Runs both eviction tiers.
    async fn heartbeat(&self);
}
