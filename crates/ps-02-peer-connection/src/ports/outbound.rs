//! # Driven Ports (Outbound SPI)
//!
//! What a connection needs from the rest of the node. Every call is
//! non-blocking from the connection's point of view: implementations enqueue
//! work on their own actor and return.

use async_trait::async_trait;
use bytes::Bytes;
use shared_bus::EventPublisher;
use shared_types::{BatchId, Block, BlockHeader, Chain, Hash, PeerId, Transaction};
use std::sync::Arc;

/// The block oracle as seen by a connection.
#[async_trait]
pub trait BlockDownloader: Send + Sync {
    /// Allocates queued hashes to `peer`. `None` when nothing is queued.
    async fn get_block_batch(&self, peer: PeerId) -> Option<(BatchId, Vec<Hash>)>;

    /// Returns a batch, complete or abandoned. Unresolved hashes are
    /// requeued by the oracle.
    async fn finish_batch(&self, peer: PeerId, batch: BatchId);

    /// Raw `block` payload from `peer`. Decoding happens in the oracle.
    async fn receive_block(&self, peer: PeerId, raw: Bytes);

    /// Resident block for serving `getdata`.
    async fn query_block(&self, hash: Hash) -> Option<Arc<Block>>;

    /// `peer` is gone; its delivery history can be dropped.
    async fn forget_peer(&self, peer: PeerId);
}

/// The mempool as seen by a connection.
#[async_trait]
pub trait TransactionSink: Send + Sync {
    /// Queues announced ids for registration and returns those whose
    /// payload is not held yet. Does not wait for the mempool.
    fn announce(&self, txids: Vec<Hash>) -> Vec<Hash>;

    /// Full transaction received from `peer`. Does not wait for the
    /// mempool.
    fn receive(&self, peer: PeerId, tx: Transaction);

    async fn query(&self, txid: Hash) -> Option<Arc<Transaction>>;

    /// All known ids.
    async fn snapshot(&self) -> Vec<Hash>;
}

/// Header chain collaborator.
#[async_trait]
pub trait HeaderSink: Send + Sync {
    async fn receive_headers(&self, peer: PeerId, headers: Vec<BlockHeader>);

    async fn blocks_announced(&self, peer: PeerId, hashes: Vec<Hash>);
}

/// Everything a connection task talks to.
#[derive(Clone)]
pub struct PeerPorts {
    pub chain: Chain,
    pub blocks: Arc<dyn BlockDownloader>,
    pub transactions: Arc<dyn TransactionSink>,
    pub headers: Arc<dyn HeaderSink>,
    pub events: Arc<dyn EventPublisher>,
}
