//! Consensus serialisation of headers, transactions and blocks.

use crate::encoding::{put_compact_size, put_var_bytes, Reader};
use crate::errors::CodecError;
use bytes::BufMut;
use shared_types::{
    sha256d, Block, BlockHeader, OutPoint, Transaction, TxIn, TxOut, BLOCK_HEADER_SIZE,
};

/// Upper bound on inputs/outputs per transaction, a sanity limit well above
/// anything that fits in a block.
const MAX_TX_IO: u64 = 100_000;
/// Upper bound on witness stack items per input.
const MAX_WITNESS_ITEMS: u64 = 10_000;
/// Upper bound on transactions per block.
const MAX_BLOCK_TXS: u64 = 1_000_000;

pub fn read_header(reader: &mut Reader<'_>) -> Result<BlockHeader, CodecError> {
    Ok(BlockHeader {
        version: reader.read_i32()?,
        prev_blockhash: reader.read_hash()?,
        merkle_root: reader.read_hash()?,
        time: reader.read_u32()?,
        bits: reader.read_u32()?,
        nonce: reader.read_u32()?,
    })
}

pub fn put_header(buf: &mut impl BufMut, header: &BlockHeader) {
    buf.put_slice(&header.to_bytes());
}

/// Reads one transaction, legacy or segwit, and computes its txid.
pub fn read_transaction(reader: &mut Reader<'_>) -> Result<Transaction, CodecError> {
    let version = reader.read_i32()?;

    // Segwit marker (0x00) and flag (0x01) sit where the input count would be.
    let segwit = reader.peek_u8(0) == Some(0x00) && reader.peek_u8(1) == Some(0x01);
    if segwit {
        reader.read_bytes(2)?;
    }

    let input_count = reader.read_count("tx inputs", MAX_TX_IO)?;
    let mut inputs = Vec::with_capacity(input_count);
    for _ in 0..input_count {
        inputs.push(TxIn {
            previous_output: OutPoint {
                txid: reader.read_hash()?,
                vout: reader.read_u32()?,
            },
            script_sig: reader.read_var_bytes()?,
            sequence: reader.read_u32()?,
            witness: Vec::new(),
        });
    }

    let output_count = reader.read_count("tx outputs", MAX_TX_IO)?;
    let mut outputs = Vec::with_capacity(output_count);
    for _ in 0..output_count {
        outputs.push(TxOut {
            value: reader.read_u64()?,
            script_pubkey: reader.read_var_bytes()?,
        });
    }

    if segwit {
        for input in inputs.iter_mut() {
            let items = reader.read_count("witness items", MAX_WITNESS_ITEMS)?;
            input.witness.reserve(items);
            for _ in 0..items {
                input.witness.push(reader.read_var_bytes()?);
            }
        }
        if inputs.iter().all(|input| input.witness.is_empty()) {
            return Err(CodecError::InvalidData(
                "segwit flag set but no witness data".into(),
            ));
        }
    }

    let lock_time = reader.read_u32()?;

    let mut tx = Transaction {
        txid: [0u8; 32],
        version,
        inputs,
        outputs,
        lock_time,
    };
    tx.txid = compute_txid(&tx);
    Ok(tx)
}

/// Serialises a transaction. Witness data is written only when
/// `with_witness` is set and the transaction carries any.
pub fn put_transaction(buf: &mut impl BufMut, tx: &Transaction, with_witness: bool) {
    let segwit = with_witness && tx.has_witness();
    buf.put_i32_le(tx.version);
    if segwit {
        buf.put_u8(0x00);
        buf.put_u8(0x01);
    }
    put_compact_size(buf, tx.inputs.len() as u64);
    for input in &tx.inputs {
        buf.put_slice(&input.previous_output.txid);
        buf.put_u32_le(input.previous_output.vout);
        put_var_bytes(buf, &input.script_sig);
        buf.put_u32_le(input.sequence);
    }
    put_compact_size(buf, tx.outputs.len() as u64);
    for output in &tx.outputs {
        buf.put_u64_le(output.value);
        put_var_bytes(buf, &output.script_pubkey);
    }
    if segwit {
        for input in &tx.inputs {
            put_compact_size(buf, input.witness.len() as u64);
            for item in &input.witness {
                put_var_bytes(buf, item);
            }
        }
    }
    buf.put_u32_le(tx.lock_time);
}

/// Double-SHA256 of the non-witness serialisation.
pub fn compute_txid(tx: &Transaction) -> shared_types::Hash {
    let mut legacy = Vec::new();
    put_transaction(&mut legacy, tx, false);
    sha256d(&legacy)
}

pub fn read_block(reader: &mut Reader<'_>) -> Result<Block, CodecError> {
    if reader.remaining() < BLOCK_HEADER_SIZE {
        return Err(CodecError::UnexpectedEof {
            offset: reader.position(),
            needed: BLOCK_HEADER_SIZE - reader.remaining(),
        });
    }
    let header = read_header(reader)?;
    let count = reader.read_count("block transactions", MAX_BLOCK_TXS)?;
    let mut transactions = Vec::with_capacity(count);
    for _ in 0..count {
        transactions.push(read_transaction(reader)?);
    }
    Ok(Block {
        header,
        transactions,
    })
}

pub fn put_block(buf: &mut impl BufMut, block: &Block) {
    put_header(buf, &block.header);
    put_compact_size(buf, block.transactions.len() as u64);
    for tx in &block.transactions {
        put_transaction(buf, tx, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::hash_to_hex;

    /// Mainnet genesis coinbase.
    const GENESIS_TX: &str = "01000000010000000000000000000000000000000000000000000000000000000000000000ffffffff4d04ffff001d0104455468652054696d65732030332f4a616e2f32303039204368616e63656c6c6f72206f6e206272696e6b206f66207365636f6e64206261696c6f757420666f722062616e6b73ffffffff0100f2052a01000000434104678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5fac00000000";

    #[test]
    fn test_genesis_coinbase_txid() {
        let raw = hex::decode(GENESIS_TX).unwrap();
        let mut reader = Reader::new(&raw);
        let tx = read_transaction(&mut reader).unwrap();
        reader.finish().unwrap();

        assert!(tx.is_coinbase());
        assert_eq!(tx.outputs[0].value, 50 * 100_000_000);
        assert_eq!(
            hash_to_hex(&tx.txid),
            "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
        );

        let mut reencoded = Vec::new();
        put_transaction(&mut reencoded, &tx, true);
        assert_eq!(reencoded, raw);
    }

    #[test]
    fn test_segwit_txid_ignores_witness() {
        let legacy = Transaction {
            version: 2,
            inputs: vec![TxIn {
                previous_output: OutPoint {
                    txid: [7; 32],
                    vout: 1,
                },
                script_sig: vec![],
                sequence: 0xFFFF_FFFD,
                witness: vec![],
            }],
            outputs: vec![TxOut {
                value: 1_000,
                script_pubkey: vec![0x00, 0x14],
            }],
            lock_time: 0,
            txid: [0; 32],
        };
        let mut witnessed = legacy.clone();
        witnessed.inputs[0].witness = vec![vec![0xAA; 71], vec![0x02; 33]];

        let mut raw = Vec::new();
        put_transaction(&mut raw, &witnessed, true);
        assert_eq!(&raw[4..6], &[0x00, 0x01]);

        let decoded = read_transaction(&mut Reader::new(&raw)).unwrap();
        assert_eq!(decoded.inputs[0].witness.len(), 2);
        assert_eq!(decoded.txid, compute_txid(&legacy));
    }

    #[test]
    fn test_truncated_transaction() {
        let raw = hex::decode(GENESIS_TX).unwrap();
        let result = read_transaction(&mut Reader::new(&raw[..raw.len() - 2]));
        assert!(matches!(result, Err(CodecError::UnexpectedEof { .. })));
    }

    #[test]
    fn test_block_roundtrip_preserves_hash() {
        let tx = read_transaction(&mut Reader::new(&hex::decode(GENESIS_TX).unwrap())).unwrap();
        let block = Block {
            header: BlockHeader {
                version: 1,
                prev_blockhash: [0; 32],
                merkle_root: tx.txid,
                time: 1_231_006_505,
                bits: 0x1d00_ffff,
                nonce: 2_083_236_893,
            },
            transactions: vec![tx],
        };

        let mut raw = Vec::new();
        put_block(&mut raw, &block);
        let decoded = read_block(&mut Reader::new(&raw)).unwrap();
        assert_eq!(decoded, block);
        assert_eq!(
            hash_to_hex(&decoded.block_hash()),
            "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
        );
        assert_eq!(decoded.compute_merkle_root(), decoded.header.merkle_root);
    }
}
