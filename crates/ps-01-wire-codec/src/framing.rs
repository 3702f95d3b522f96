//! Message framing: `magic | command | length | checksum | payload`.
//!
//! [`FrameCodec`] plugs into `tokio_util::codec::Framed`. It validates the
//! magic, the declared length and the checksum before handing a
//! [`RawFrame`] to the caller. Payload interpretation happens later in
//! [`crate::WireCodec::decode_message`].

use crate::command::{Command, COMMAND_LEN};
use crate::errors::CodecError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use shared_types::sha256d;
use tokio_util::codec::{Decoder, Encoder};

/// Size of the fixed header.
pub const HEADER_LEN: usize = 4 + COMMAND_LEN + 4 + 4;

/// Largest accepted payload.
pub const MAX_PAYLOAD: usize = 32 * 1024 * 1024;

/// First four bytes of the double-SHA256 of `payload`.
pub fn checksum(payload: &[u8]) -> [u8; 4] {
    let digest = sha256d(payload);
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Parsed fixed-size header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: u32,
    pub command: Command,
    pub length: u32,
    pub checksum: [u8; 4],
}

impl FrameHeader {
    /// Parses a header. Does not check the magic or the length.
    pub fn parse(bytes: &[u8; HEADER_LEN]) -> Result<Self, CodecError> {
        let mut field = [0u8; COMMAND_LEN];
        field.copy_from_slice(&bytes[4..16]);
        Ok(Self {
            magic: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            command: Command::from_wire(&field)?,
            length: u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]),
            checksum: [bytes[20], bytes[21], bytes[22], bytes[23]],
        })
    }
}

/// A checksum-verified frame whose payload is still undecoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub command: Command,
    pub payload: Bytes,
}

impl RawFrame {
    pub fn new(command: Command, payload: impl Into<Bytes>) -> Self {
        Self {
            command,
            payload: payload.into(),
        }
    }

    /// Serialises header and payload for `magic`.
    pub fn to_bytes(&self, magic: u32) -> Result<Vec<u8>, CodecError> {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        write_frame(magic, self, &mut buf)?;
        Ok(buf.to_vec())
    }
}

fn write_frame(magic: u32, frame: &RawFrame, dst: &mut BytesMut) -> Result<(), CodecError> {
    if frame.payload.len() > MAX_PAYLOAD {
        return Err(CodecError::PayloadTooLarge(frame.payload.len()));
    }
    dst.reserve(HEADER_LEN + frame.payload.len());
    dst.put_u32_le(magic);
    dst.put_slice(&frame.command.to_wire()?);
    dst.put_u32_le(frame.payload.len() as u32);
    dst.put_slice(&checksum(&frame.payload));
    dst.put_slice(&frame.payload);
    Ok(())
}

/// Stream framing for one network magic.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    magic: u32,
}

impl FrameCodec {
    pub fn new(magic: u32) -> Self {
        Self { magic }
    }

    pub fn magic(&self) -> u32 {
        self.magic
    }
}

impl Decoder for FrameCodec {
    type Item = RawFrame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let mut raw = [0u8; HEADER_LEN];
        raw.copy_from_slice(&src[..HEADER_LEN]);
        let header = FrameHeader::parse(&raw)?;

        if header.magic != self.magic {
            return Err(CodecError::BadMagic {
                expected: self.magic,
                actual: header.magic,
            });
        }
        let length = header.length as usize;
        if length > MAX_PAYLOAD {
            return Err(CodecError::PayloadTooLarge(length));
        }
        if src.len() < HEADER_LEN + length {
            src.reserve(HEADER_LEN + length - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(length).freeze();
        if checksum(&payload) != header.checksum {
            return Err(CodecError::ChecksumMismatch {
                command: header.command.to_string(),
            });
        }

        Ok(Some(RawFrame {
            command: header.command,
            payload,
        }))
    }
}

impl Encoder<RawFrame> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: RawFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        write_frame(self.magic, &item, dst)
    }
}
