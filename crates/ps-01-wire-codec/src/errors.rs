//! Wire codec errors.

use shared_types::SyncFault;
use thiserror::Error;

/// Errors decoding or encoding wire data.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Frame magic does not belong to the configured chain.
    #[error("network magic mismatch: expected {expected:#010x}, got {actual:#010x}")]
    BadMagic { expected: u32, actual: u32 },

    /// Declared payload length exceeds the protocol maximum.
    #[error("payload of {0} bytes exceeds the maximum")]
    PayloadTooLarge(usize),

    /// Payload checksum does not match the header.
    #[error("checksum mismatch for `{command}`")]
    ChecksumMismatch { command: String },

    /// Command field is not NUL-padded ASCII.
    #[error("malformed command field")]
    MalformedCommand,

    /// Payload ended before a field was complete.
    #[error("unexpected end of payload at offset {offset} (need {needed} more bytes)")]
    UnexpectedEof { offset: usize, needed: usize },

    /// A list exceeded its protocol limit.
    #[error("{what}: {count} entries exceeds limit of {max}")]
    TooManyEntries {
        what: &'static str,
        count: u64,
        max: u64,
    },

    /// Structurally invalid payload.
    #[error("invalid payload: {0}")]
    InvalidData(String),

    /// Payload was decoded but bytes remain.
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),

    /// Transport error underneath the framing layer.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// Maps onto the shared fault taxonomy.
    pub fn fault(&self) -> SyncFault {
        SyncFault::ProtocolViolation(self.to_string())
    }
}
