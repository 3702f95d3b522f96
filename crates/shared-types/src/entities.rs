//! # Core Domain Entities
//!
//! Defines the chain entities exchanged between the peer layer, the block
//! oracle and the mempool.
//!
//! ## Clusters
//!
//! - **Identity**: `Hash`, `Chain`, `PeerId`, `BatchId`
//! - **Chain**: `BlockHeader`, `Block`, `Transaction`, `TxIn`, `TxOut`

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// CLUSTER A: IDENTITY
// =============================================================================

/// A 32-byte double-SHA256 hash in internal byte order.
pub type Hash = [u8; 32];

/// Computes `SHA256(SHA256(data))`.
pub fn sha256d(data: &[u8]) -> Hash {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// Renders a hash the way block explorers do (byte-reversed hex).
pub fn hash_to_hex(hash: &Hash) -> String {
    let mut reversed = *hash;
    reversed.reverse();
    hex::encode(reversed)
}

/// Parses a byte-reversed hex hash. Returns `None` on malformed input.
pub fn hash_from_hex(s: &str) -> Option<Hash> {
    let bytes = hex::decode(s).ok()?;
    let mut hash: Hash = bytes.try_into().ok()?;
    hash.reverse();
    Some(hash)
}

/// `Display` adapter for hashes in log fields: `hash = %DisplayHash(&h)`.
#[derive(Clone, Copy)]
pub struct DisplayHash<'a>(pub &'a Hash);

impl fmt::Display for DisplayHash<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hash_to_hex(self.0))
    }
}

/// The chain a node tracks. Each chain has its own network magic and the
/// oracle/mempool are instantiated once per tracked chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// Bitcoin mainnet.
    #[default]
    Bitcoin,
    /// Bitcoin testnet3.
    Testnet3,
    /// Default signet.
    Signet,
    /// Local regression-test network.
    Regtest,
}

impl Chain {
    /// Network magic as the little-endian `u32` read from the first four
    /// header bytes.
    pub fn magic(&self) -> u32 {
        match self {
            Chain::Bitcoin => 0xD9B4_BEF9,
            Chain::Testnet3 => 0x0709_110B,
            Chain::Signet => 0x40CF_030A,
            Chain::Regtest => 0xDAB5_BFFA,
        }
    }

    /// Default P2P port.
    pub fn default_port(&self) -> u16 {
        match self {
            Chain::Bitcoin => 8333,
            Chain::Testnet3 => 18333,
            Chain::Signet => 38333,
            Chain::Regtest => 18444,
        }
    }

    /// Lowercase name, also used in event frames.
    pub fn name(&self) -> &'static str {
        match self {
            Chain::Bitcoin => "bitcoin",
            Chain::Testnet3 => "testnet3",
            Chain::Signet => "signet",
            Chain::Regtest => "regtest",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Chain {
    type Err = UnknownChain;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bitcoin" | "mainnet" | "main" => Ok(Chain::Bitcoin),
            "testnet3" | "testnet" | "test" => Ok(Chain::Testnet3),
            "signet" => Ok(Chain::Signet),
            "regtest" => Ok(Chain::Regtest),
            other => Err(UnknownChain(other.to_owned())),
        }
    }
}

/// Returned when parsing a chain name fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown chain: {0}")]
pub struct UnknownChain(pub String);

/// Process-local connection identifier, assigned on dial/accept.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Identifier of a block download batch handed to one peer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct BatchId(pub u64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch#{}", self.0)
    }
}

// =============================================================================
// CLUSTER B: THE CHAIN
// =============================================================================

/// Size of a serialized block header.
pub const BLOCK_HEADER_SIZE: usize = 80;

/// An 80-byte proof-of-work block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_blockhash: Hash,
    pub merkle_root: Hash,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// Consensus serialization of the header.
    pub fn to_bytes(&self) -> [u8; BLOCK_HEADER_SIZE] {
        let mut out = [0u8; BLOCK_HEADER_SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(&self.prev_blockhash);
        out[36..68].copy_from_slice(&self.merkle_root);
        out[68..72].copy_from_slice(&self.time.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    /// The block hash: double-SHA256 of the serialized header.
    pub fn block_hash(&self) -> Hash {
        sha256d(&self.to_bytes())
    }
}

/// Reference to a previous transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct OutPoint {
    pub txid: Hash,
    pub vout: u32,
}

/// A transaction input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TxIn {
    pub previous_output: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
    /// Segregated witness stack; empty for legacy inputs.
    pub witness: Vec<Vec<u8>>,
}

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TxOut {
    /// Value in satoshis.
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

/// A decoded transaction.
///
/// `txid` is computed by the wire codec from the non-witness serialization
/// and cached here so the mempool never re-hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Transaction {
    pub txid: Hash,
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    /// True if any input carries witness data.
    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(|input| !input.witness.is_empty())
    }

    /// True for the block reward transaction (single null-prevout input).
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && self.inputs[0].previous_output.txid == [0u8; 32]
            && self.inputs[0].previous_output.vout == u32::MAX
    }
}

/// A decoded block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Hash of the block header.
    pub fn block_hash(&self) -> Hash {
        self.header.block_hash()
    }

    /// Recomputes the merkle root over the transaction ids.
    ///
    /// Odd levels duplicate their last element. An empty block yields the
    /// all-zero hash.
    pub fn compute_merkle_root(&self) -> Hash {
        let mut level: Vec<Hash> = self.transactions.iter().map(|tx| tx.txid).collect();
        if level.is_empty() {
            return [0u8; 32];
        }
        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            for pair in level.chunks(2) {
                let left = pair[0];
                let right = pair.get(1).copied().unwrap_or(left);
                let mut buf = [0u8; 64];
                buf[..32].copy_from_slice(&left);
                buf[32..].copy_from_slice(&right);
                next.push(sha256d(&buf));
            }
            level = next;
        }
        level[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bitcoin mainnet genesis header.
    fn genesis_header() -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_blockhash: [0u8; 32],
            merkle_root: hash_from_hex(
                "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b",
            )
            .unwrap(),
            time: 1_231_006_505,
            bits: 0x1d00_ffff,
            nonce: 2_083_236_893,
        }
    }

    #[test]
    fn test_genesis_block_hash() {
        let hash = genesis_header().block_hash();
        assert_eq!(
            hash_to_hex(&hash),
            "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
        );
    }

    #[test]
    fn test_hex_roundtrip_is_byte_reversed() {
        let mut hash = [0u8; 32];
        hash[0] = 0x01;
        let hex = hash_to_hex(&hash);
        assert!(hex.ends_with("01"));
        assert_eq!(hash_from_hex(&hex), Some(hash));
        assert_eq!(hash_from_hex("zz"), None);
    }

    #[test]
    fn test_single_tx_merkle_root_is_txid() {
        let tx = Transaction {
            txid: [0x11; 32],
            ..Default::default()
        };
        let block = Block {
            header: BlockHeader::default(),
            transactions: vec![tx],
        };
        assert_eq!(block.compute_merkle_root(), [0x11; 32]);
    }

    #[test]
    fn test_odd_merkle_level_duplicates_last() {
        let txs: Vec<Transaction> = [[1u8; 32], [2u8; 32], [3u8; 32]]
            .into_iter()
            .map(|txid| Transaction {
                txid,
                ..Default::default()
            })
            .collect();
        let block = Block {
            header: BlockHeader::default(),
            transactions: txs,
        };

        let pair = |a: Hash, b: Hash| {
            let mut buf = [0u8; 64];
            buf[..32].copy_from_slice(&a);
            buf[32..].copy_from_slice(&b);
            sha256d(&buf)
        };
        let expected = pair(pair([1; 32], [2; 32]), pair([3; 32], [3; 32]));
        assert_eq!(block.compute_merkle_root(), expected);
    }

    #[test]
    fn test_chain_parsing_and_magic() {
        assert_eq!("mainnet".parse::<Chain>().unwrap(), Chain::Bitcoin);
        assert_eq!("REGTEST".parse::<Chain>().unwrap(), Chain::Regtest);
        assert!("dogecoin".parse::<Chain>().is_err());
        assert_eq!(Chain::Bitcoin.magic().to_le_bytes(), [0xF9, 0xBE, 0xB4, 0xD9]);
        assert_eq!(Chain::Testnet3.default_port(), 18333);
    }

    #[test]
    fn test_chain_serde_lowercase() {
        let json = serde_json::to_string(&Chain::Signet).unwrap();
        assert_eq!(json, "\"signet\"");
    }

    #[test]
    fn test_coinbase_detection() {
        let coinbase = Transaction {
            inputs: vec![TxIn {
                previous_output: OutPoint {
                    txid: [0u8; 32],
                    vout: u32::MAX,
                },
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(coinbase.is_coinbase());
        assert!(!Transaction::default().is_coinbase());
    }
}
