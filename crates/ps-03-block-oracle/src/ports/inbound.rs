//! # Driving Ports (Inbound API)

use crate::domain::BlockWaiter;
use async_trait::async_trait;
use bytes::Bytes;
use shared_types::{BatchId, Block, Hash, PeerId};
use std::sync::Arc;
use std::time::Duration;

/// The block oracle as used by API consumers, peer connections and the
/// scheduler.
#[async_trait]
pub trait BlockOracleApi: Send + Sync {
    /// Resolves once the block is available. `None` when it could not be
    /// found or the oracle shut down.
    async fn load_bitcoin(&self, hash: Hash) -> Option<Arc<Block>>;

    /// One waiter per hash, in order.
    async fn load_bitcoin_many(&self, hashes: Vec<Hash>) -> Vec<BlockWaiter>;

    /// Like [`BlockOracleApi::load_bitcoin`], giving up after `timeout`.
    /// The download itself continues for other waiters.
    async fn load_bitcoin_timeout(&self, hash: Hash, timeout: Duration) -> Option<Arc<Block>>;

    /// Allocates queued hashes to `peer`.
    async fn get_block_batch(&self, peer: PeerId) -> Option<(BatchId, Vec<Hash>)>;

    /// Releases a batch. Undelivered hashes are requeued, or resolve empty
    /// once they have used up their retries.
    async fn finish_batch(&self, batch: BatchId);

    /// Drops the delivery history of a disconnected peer.
    async fn forget_peer(&self, peer: PeerId);

    /// Raw block bytes. Decoding and validation run on a blocking thread;
    /// the call returns immediately.
    fn submit_block(&self, peer: Option<PeerId>, raw: Bytes);

    /// Already decoded block. Validated before it is accepted.
    fn receive_block(&self, peer: Option<PeerId>, block: Block);

    /// Requests not yet satisfied.
    fn download_queue(&self) -> usize;

    /// Resident block, if any.
    fn query(&self, hash: &Hash) -> Option<Arc<Block>>;

    /// Expires stalled downloads and republishes the queue depth.
    async fn heartbeat(&self);

    /// Resolves every waiter empty and stops the actor.
    async fn shutdown(&self);
}
