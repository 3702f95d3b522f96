//! Connection errors.

use crate::domain::ConnectionState;
use ps_01_wire_codec::CodecError;
use shared_types::SyncFault;
use std::time::Duration;
use thiserror::Error;

/// Why a connection ended or an operation on it failed.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Framing or payload decoding failed.
    #[error("codec: {0}")]
    Codec(#[from] CodecError),

    /// The remote sent something the current state does not allow.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The remote runs a protocol version below our minimum.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(i32),

    /// We connected to ourselves (nonce echo).
    #[error("connected to self")]
    SelfConnection,

    /// A `tx` with neither inputs nor outputs.
    #[error("transaction {0} has no inputs and no outputs")]
    EmptyTransaction(String),

    /// Unrecognised commands exceeded the tolerance.
    #[error("{0} unknown commands received")]
    UnknownCommandFlood(u32),

    /// version/verack did not complete in time.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// Nothing received for too long.
    #[error("no activity for {0:?}")]
    Unresponsive(Duration),

    /// Illegal internal state change.
    #[error("invalid transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    /// The remote closed the stream.
    #[error("connection closed by remote")]
    Closed,
}

impl PeerError {
    /// Maps onto the shared fault taxonomy. An orderly close is no fault.
    pub fn fault(&self) -> Option<SyncFault> {
        match self {
            PeerError::Codec(e) => Some(e.fault()),
            PeerError::ProtocolViolation(_)
            | PeerError::EmptyTransaction(_)
            | PeerError::UnsupportedVersion(_)
            | PeerError::SelfConnection
            | PeerError::UnknownCommandFlood(_) => {
                Some(SyncFault::ProtocolViolation(self.to_string()))
            }
            PeerError::HandshakeTimeout | PeerError::Unresponsive(_) => {
                Some(SyncFault::Timeout(self.to_string()))
            }
            PeerError::InvalidTransition { .. } => {
                Some(SyncFault::InvariantViolation(self.to_string()))
            }
            PeerError::Closed => None,
        }
    }

    /// Whether the remote address should be banned.
    pub fn should_ban(&self) -> bool {
        matches!(self, PeerError::UnknownCommandFlood(_))
    }
}
