//! # Error Types
//!
//! The fault taxonomy shared by every sync subsystem. Crate-level errors
//! (`CodecError`, `PeerError`, ...) map onto a `SyncFault` so callers can
//! decide the blast radius without matching on every variant.

use thiserror::Error;

/// Cross-subsystem fault classes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncFault {
    /// Bad checksum, bad length, oversized payload or too many unknown
    /// commands. Disconnect the offending peer only.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Handshake, getdata or getheaders did not complete in time.
    /// Abandon and make eligible for reassignment.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The requested item is absent everywhere queried.
    #[error("not found: {0}")]
    NotFound(String),

    /// Internal bookkeeping inconsistency.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl SyncFault {
    /// Whether the fault should cost the remote peer its connection.
    pub fn disconnects_peer(&self) -> bool {
        matches!(self, SyncFault::ProtocolViolation(_) | SyncFault::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_peer_faults_disconnect() {
        assert!(SyncFault::ProtocolViolation("checksum".into()).disconnects_peer());
        assert!(SyncFault::Timeout("handshake".into()).disconnects_peer());
        assert!(!SyncFault::NotFound("block".into()).disconnects_peer());
        assert!(!SyncFault::InvariantViolation("batch".into()).disconnects_peer());
    }

    #[test]
    fn test_display() {
        let fault = SyncFault::NotFound("abc".into());
        assert_eq!(fault.to_string(), "not found: abc");
    }
}
