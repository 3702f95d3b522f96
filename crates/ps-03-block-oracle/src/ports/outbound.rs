//! # Driven Ports (Outbound SPI)
//!
//! Collaborators the oracle consumes. Storage failures surface as `false`
//! or `None`; they never cross into the oracle as errors.

use crate::errors::OracleError;
use async_trait::async_trait;
use shared_types::{Block, Hash};

/// Best-chain knowledge.
#[async_trait]
pub trait HeaderOracle: Send + Sync {
    async fn best_height(&self) -> i32;

    /// Whether `hash` belongs to a valid header chain. Unsolicited blocks
    /// are only kept when this holds.
    async fn is_valid(&self, hash: &Hash) -> bool;
}

/// Persisted tip and overflow block store.
#[async_trait]
pub trait BlockDatabase: Send + Sync {
    /// `(height, hash)` of the persisted tip.
    async fn load_tip(&self) -> Option<(i32, Hash)>;

    async fn load_block(&self, hash: &Hash) -> Option<Block>;

    /// Returns `false` when the write failed.
    async fn store_block(&self, block: &Block) -> bool;
}

/// Structural check run on every decoded block before it resolves a
/// waiter. Runs on a blocking thread.
pub trait Validator: Send + Sync {
    fn validate(&self, block: &Block) -> Result<(), OracleError>;
}
