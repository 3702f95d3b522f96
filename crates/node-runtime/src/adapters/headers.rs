//! # Header Chain
//!
//! Minimal best-header tracker. Connections feed it `headers` messages;
//! the block oracle asks it whether an unsolicited block belongs to the
//! chain. Headers are only appended to the current tip, so a competing
//! branch is ignored until it is rebuilt from a fresh locator.

use async_trait::async_trait;
use parking_lot::RwLock;
use ps_02_peer_connection::HeaderSink;
use ps_03_block_oracle::HeaderOracle;
use shared_types::{hash_from_hex, BlockHeader, Chain, DisplayHash, Hash, PeerId};
use std::collections::HashMap;
use tracing::{debug, info};

/// Display hash of each chain's genesis block.
fn genesis_hex(chain: Chain) -> &'static str {
    match chain {
        Chain::Bitcoin => "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f",
        Chain::Testnet3 => "000000000933ea01ad0ee984209779baaec3ced90fa3f408719526f8d77f4943",
        Chain::Signet => "00000008819873e925422c1ff0f99f7cc9bbb232af63a077a480a3633bee1ef6",
        Chain::Regtest => "0f9188f13cb7b2c71f2a335e3a4fc328bf5beb436012afca590b1a11466e2206",
    }
}

pub fn genesis_hash(chain: Chain) -> Hash {
    hash_from_hex(genesis_hex(chain)).unwrap_or_default()
}

#[derive(Debug)]
struct HeaderIndex {
    /// Best chain, index is height.
    chain: Vec<Hash>,
    heights: HashMap<Hash, i32>,
}

/// Best-chain headers in memory.
#[derive(Debug)]
pub struct InMemoryHeaderChain {
    index: RwLock<HeaderIndex>,
}

impl InMemoryHeaderChain {
    pub fn new(genesis: Hash) -> Self {
        Self {
            index: RwLock::new(HeaderIndex {
                chain: vec![genesis],
                heights: HashMap::from([(genesis, 0)]),
            }),
        }
    }

    pub fn for_chain(chain: Chain) -> Self {
        Self::new(genesis_hash(chain))
    }

    pub fn height(&self) -> i32 {
        self.index.read().chain.len() as i32 - 1
    }

    pub fn tip(&self) -> Hash {
        let index = self.index.read();
        index.chain.last().copied().unwrap_or_default()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.index.read().heights.contains_key(hash)
    }

    /// Appends headers that extend the tip. Returns how many were added.
    pub fn extend(&self, headers: &[BlockHeader]) -> usize {
        let mut index = self.index.write();
        let mut added = 0;
        for header in headers {
            let hash = header.block_hash();
            let tip = index.chain.last().copied().unwrap_or_default();
            if header.prev_blockhash != tip || index.heights.contains_key(&hash) {
                continue;
            }
            let height = index.chain.len() as i32;
            index.chain.push(hash);
            index.heights.insert(hash, height);
            added += 1;
        }
        added
    }

    /// Tip first, then stepping back: ten single steps, then doubling.
    /// Always ends with genesis.
    pub fn locator(&self) -> Vec<Hash> {
        let index = self.index.read();
        let mut locator = Vec::new();
        let mut height = index.chain.len() as i64 - 1;
        let mut step = 1i64;
        while height > 0 {
            locator.push(index.chain[height as usize]);
            if locator.len() >= 10 {
                step *= 2;
            }
            height -= step;
        }
        if let Some(genesis) = index.chain.first() {
            locator.push(*genesis);
        }
        locator
    }
}

#[async_trait]
impl HeaderOracle for InMemoryHeaderChain {
    async fn best_height(&self) -> i32 {
        self.height()
    }

    async fn is_valid(&self, hash: &Hash) -> bool {
        self.contains(hash)
    }
}

#[async_trait]
impl HeaderSink for InMemoryHeaderChain {
    async fn receive_headers(&self, peer: PeerId, headers: Vec<BlockHeader>) {
        let received = headers.len();
        let added = self.extend(&headers);
        if added > 0 {
            info!(
                %peer,
                added,
                height = self.height(),
                tip = %DisplayHash(&self.tip()),
                "Header chain extended"
            );
        } else {
            debug!(%peer, received, "No headers extended the tip");
        }
    }

    async fn blocks_announced(&self, peer: PeerId, hashes: Vec<Hash>) {
        let unknown = hashes.iter().filter(|hash| !self.contains(hash)).count();
        debug!(%peer, announced = hashes.len(), unknown, "Blocks announced");
    }
}
