//! Hash-map backed collaborators.

use async_trait::async_trait;
use parking_lot::RwLock;
use ps_03_block_oracle::BlockDatabase;
use ps_04_mempool::{TransactionLoader, WalletDatabase};
use shared_types::{Block, Hash, Transaction};
use std::collections::HashMap;

/// Overflow block store.
#[derive(Default)]
pub struct InMemoryBlockDatabase {
    blocks: RwLock<HashMap<Hash, Block>>,
    tip: RwLock<Option<(i32, Hash)>>,
}

impl InMemoryBlockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tip(&self, height: i32, hash: Hash) {
        *self.tip.write() = Some((height, hash));
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.blocks.read().contains_key(hash)
    }
}

#[async_trait]
impl BlockDatabase for InMemoryBlockDatabase {
    async fn load_tip(&self) -> Option<(i32, Hash)> {
        *self.tip.read()
    }

    async fn load_block(&self, hash: &Hash) -> Option<Block> {
        self.blocks.read().get(hash).cloned()
    }

    async fn store_block(&self, block: &Block) -> bool {
        self.blocks.write().insert(block.block_hash(), block.clone());
        true
    }
}

/// Wallet transactions. Serves both as the wallet database (which ids are
/// unconfirmed) and as the transaction loader.
#[derive(Default)]
pub struct InMemoryWallet {
    transactions: RwLock<HashMap<Hash, Transaction>>,
    unconfirmed: RwLock<Vec<Hash>>,
}

impl InMemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `tx`, marking it unconfirmed.
    pub fn add_unconfirmed(&self, tx: Transaction) {
        let txid = tx.txid;
        self.transactions.write().insert(txid, tx);
        let mut unconfirmed = self.unconfirmed.write();
        if !unconfirmed.contains(&txid) {
            unconfirmed.push(txid);
        }
    }

    /// Drops `txid` from the unconfirmed set; the payload stays loadable.
    pub fn confirm(&self, txid: &Hash) {
        self.unconfirmed.write().retain(|id| id != txid);
    }
}

#[async_trait]
impl WalletDatabase for InMemoryWallet {
    async fn unconfirmed_transactions(&self) -> Vec<Hash> {
        self.unconfirmed.read().clone()
    }
}

#[async_trait]
impl TransactionLoader for InMemoryWallet {
    async fn load_transaction(&self, txid: &Hash) -> Option<Transaction> {
        self.transactions.read().get(txid).cloned()
    }
}
