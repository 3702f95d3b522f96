//! Block oracle errors.
//!
//! Ordinary misses are `None`, never errors. These cover the control
//! plane: blocks that fail to decode or validate, and a stopped actor.

use ps_01_wire_codec::CodecError;
use shared_types::SyncFault;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OracleError {
    /// Raw block bytes did not parse.
    #[error("block decode failed: {0}")]
    Decode(#[from] CodecError),

    /// The block parsed but failed validation.
    #[error("invalid block {hash}: {reason}")]
    InvalidBlock { hash: String, reason: String },

    /// The actor is no longer running.
    #[error("block oracle is shut down")]
    Shutdown,
}

impl OracleError {
    pub fn fault(&self) -> SyncFault {
        match self {
            OracleError::Decode(e) => e.fault(),
            OracleError::InvalidBlock { .. } => SyncFault::ProtocolViolation(self.to_string()),
            OracleError::Shutdown => SyncFault::NotFound(self.to_string()),
        }
    }
}
