//! Merkle root check.

use crate::errors::OracleError;
use crate::ports::Validator;
use shared_types::{hash_to_hex, Block};

/// Recomputes the merkle root from the transaction ids and compares it
/// with the header. Script and consensus rules are not checked.
#[derive(Debug, Clone, Copy, Default)]
pub struct MerkleValidator;

impl Validator for MerkleValidator {
    fn validate(&self, block: &Block) -> Result<(), OracleError> {
        let invalid = |reason: &str| OracleError::InvalidBlock {
            hash: hash_to_hex(&block.block_hash()),
            reason: reason.to_string(),
        };
        if block.transactions.is_empty() {
            return Err(invalid("no transactions"));
        }
        if !block.transactions[0].is_coinbase() {
            return Err(invalid("first transaction is not coinbase"));
        }
        if block.compute_merkle_root() != block.header.merkle_root {
            return Err(invalid("merkle root mismatch"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{BlockHeader, OutPoint, Transaction, TxIn};

    fn coinbase(tag: u8) -> Transaction {
        Transaction {
            txid: [tag; 32],
            version: 1,
            inputs: vec![TxIn {
                previous_output: OutPoint {
                    txid: [0u8; 32],
                    vout: u32::MAX,
                },
                script_sig: vec![tag],
                sequence: u32::MAX,
                witness: Vec::new(),
            }],
            outputs: Vec::new(),
            lock_time: 0,
        }
    }

    fn block_with_root(root: [u8; 32]) -> Block {
        Block {
            header: BlockHeader {
                merkle_root: root,
                ..Default::default()
            },
            transactions: vec![coinbase(7)],
        }
    }

    #[test]
    fn test_matching_root_passes() {
        // A single transaction's id is the root.
        assert!(MerkleValidator.validate(&block_with_root([7u8; 32])).is_ok());
    }

    #[test]
    fn test_mismatched_root_fails() {
        let err = MerkleValidator
            .validate(&block_with_root([8u8; 32]))
            .unwrap_err();
        assert!(err.to_string().contains("merkle root mismatch"));
    }

    #[test]
    fn test_empty_block_fails() {
        let block = Block::default();
        assert!(MerkleValidator.validate(&block).is_err());
    }
}
