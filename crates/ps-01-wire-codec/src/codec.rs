//! The per-chain-family codec seam.
//!
//! A peer connection is generic over [`WireCodec`]; supporting another
//! chain family means another implementation of this trait, not a
//! subclass of the connection.

use crate::chain_data::{put_block, put_transaction, read_block, read_transaction};
use crate::encoding::Reader;
use crate::errors::CodecError;
use crate::framing::{FrameCodec, RawFrame};
use crate::message::Message;
use shared_types::{Block, Chain, Transaction};

/// Encodes and decodes messages for one chain encoding.
pub trait WireCodec: Send + Sync + 'static {
    /// Chain this codec speaks for.
    fn chain(&self) -> Chain;

    /// Network magic placed in every frame header.
    fn magic(&self) -> u32 {
        self.chain().magic()
    }

    /// Stream framer for this codec's magic.
    fn frame_codec(&self) -> FrameCodec {
        FrameCodec::new(self.magic())
    }

    /// Interprets a verified frame.
    fn decode_message(&self, frame: &RawFrame) -> Result<Message, CodecError>;

    /// Builds a frame for `message`.
    fn encode_message(&self, message: &Message) -> Result<RawFrame, CodecError>;

    /// Parses a complete serialised block.
    fn decode_block(&self, raw: &[u8]) -> Result<Block, CodecError>;

    fn encode_block(&self, block: &Block) -> Vec<u8>;

    /// Parses a complete serialised transaction.
    fn decode_transaction(&self, raw: &[u8]) -> Result<Transaction, CodecError>;

    fn encode_transaction(&self, tx: &Transaction) -> Vec<u8>;
}

/// Bitcoin family codec (mainnet, testnet, signet, regtest).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitcoinCodec {
    chain: Chain,
}

impl BitcoinCodec {
    pub fn new(chain: Chain) -> Self {
        Self { chain }
    }
}

impl Default for BitcoinCodec {
    fn default() -> Self {
        Self::new(Chain::Bitcoin)
    }
}

impl WireCodec for BitcoinCodec {
    fn chain(&self) -> Chain {
        self.chain
    }

    fn decode_message(&self, frame: &RawFrame) -> Result<Message, CodecError> {
        Message::decode(&frame.command, &frame.payload)
    }

    fn encode_message(&self, message: &Message) -> Result<RawFrame, CodecError> {
        let command = message.command();
        // Validates the command fits the header field.
        command.to_wire()?;
        Ok(RawFrame::new(command, message.encode_payload()))
    }

    fn decode_block(&self, raw: &[u8]) -> Result<Block, CodecError> {
        let mut reader = Reader::new(raw);
        let block = read_block(&mut reader)?;
        reader.finish()?;
        Ok(block)
    }

    fn encode_block(&self, block: &Block) -> Vec<u8> {
        let mut buf = Vec::new();
        put_block(&mut buf, block);
        buf
    }

    fn decode_transaction(&self, raw: &[u8]) -> Result<Transaction, CodecError> {
        let mut reader = Reader::new(raw);
        let tx = read_transaction(&mut reader)?;
        reader.finish()?;
        Ok(tx)
    }

    fn encode_transaction(&self, tx: &Transaction) -> Vec<u8> {
        let mut buf = Vec::new();
        put_transaction(&mut buf, tx, true);
        buf
    }
}
