//! `TransactionSink` over the mempool.

use async_trait::async_trait;
use ps_02_peer_connection::TransactionSink;
use ps_04_mempool::{Mempool, MempoolApi};
use shared_types::{DisplayHash, Hash, PeerId, Transaction};
use std::sync::Arc;
use tracing::debug;

pub struct MempoolSink {
    mempool: Mempool,
}

impl MempoolSink {
    pub fn new(mempool: Mempool) -> Self {
        Self { mempool }
    }
}

#[async_trait]
impl TransactionSink for MempoolSink {
    fn announce(&self, txids: Vec<Hash>) -> Vec<Hash> {
        let missing = self.mempool.missing(&txids);
        self.mempool.post_ids(txids);
        missing
    }

    fn receive(&self, peer: PeerId, tx: Transaction) {
        debug!(%peer, txid = %DisplayHash(&tx.txid), "Relaying transaction to mempool");
        self.mempool.post_transaction(tx);
    }

    async fn query(&self, txid: Hash) -> Option<Arc<Transaction>> {
        self.mempool.query(&txid)
    }

    async fn snapshot(&self) -> Vec<Hash> {
        self.mempool.dump()
    }
}
