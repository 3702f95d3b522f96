//! `BlockDownloader` over the block oracle.

use async_trait::async_trait;
use bytes::Bytes;
use ps_02_peer_connection::BlockDownloader;
use ps_03_block_oracle::{BlockOracle, BlockOracleApi};
use shared_types::{BatchId, Block, Hash, PeerId};
use std::sync::Arc;
use tracing::debug;

pub struct OracleDownloader {
    oracle: BlockOracle,
}

impl OracleDownloader {
    pub fn new(oracle: BlockOracle) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl BlockDownloader for OracleDownloader {
    async fn get_block_batch(&self, peer: PeerId) -> Option<(BatchId, Vec<Hash>)> {
        self.oracle.get_block_batch(peer).await
    }

    async fn finish_batch(&self, peer: PeerId, batch: BatchId) {
        debug!(%peer, batch = %batch, "Returning block batch");
        self.oracle.finish_batch(batch).await;
    }

    async fn receive_block(&self, peer: PeerId, raw: Bytes) {
        self.oracle.submit_block(Some(peer), raw);
    }

    async fn query_block(&self, hash: Hash) -> Option<Arc<Block>> {
        self.oracle.query(&hash)
    }

    async fn forget_peer(&self, peer: PeerId) {
        self.oracle.forget_peer(peer).await;
    }
}
