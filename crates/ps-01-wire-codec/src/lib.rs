//! # Wire Codec
//!
//! Byte-exact Bitcoin P2P framing and payload codecs.
//!
//! ## Layers
//!
//! - [`framing`]: `magic | command | length | checksum` header, checksum
//!   verification and a `tokio_util` codec for `Framed` streams.
//! - [`message`]: typed payloads for every recognised command.
//! - [`chain_data`]: consensus serialisation of headers, transactions
//!   (legacy and segwit) and blocks.
//! - [`codec`]: the [`WireCodec`] trait a peer connection is generic over.
//!
//! ## Example
//!
//! ```rust
//! use ps_01_wire_codec::{BitcoinCodec, Message, WireCodec};
//! use shared_types::Chain;
//!
//! let codec = BitcoinCodec::new(Chain::Regtest);
//! let frame = codec.encode_message(&Message::Ping(7)).unwrap();
//! let bytes = frame.to_bytes(codec.magic()).unwrap();
//! assert_eq!(bytes.len(), 24 + 8);
//! assert_eq!(codec.decode_message(&frame).unwrap(), Message::Ping(7));
//! ```

pub mod chain_data;
pub mod codec;
pub mod command;
pub mod encoding;
pub mod errors;
pub mod framing;
pub mod message;


pub use codec::{BitcoinCodec, WireCodec};
pub use command::Command;
pub use errors::CodecError;
pub use framing::{checksum, FrameCodec, FrameHeader, RawFrame, HEADER_LEN, MAX_PAYLOAD};
pub use message::{
    services, BlockLocator, InvType, Inventory, Message, NetAddress, RejectMessage,
    TimestampedAddress, VersionMessage, MAX_HEADERS, MAX_INV_ENTRIES, MIN_PROTOCOL_VERSION,
    PROTOCOL_VERSION,
};
