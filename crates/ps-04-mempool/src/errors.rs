//! Mempool errors.

use shared_types::SyncFault;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MempoolError {
    /// The actor is no longer running.
    #[error("mempool is shut down")]
    Shutdown,

    /// A transaction with nothing in it.
    #[error("empty transaction {0}")]
    EmptyTransaction(String),
}

impl MempoolError {
    pub fn fault(&self) -> SyncFault {
        match self {
            MempoolError::Shutdown => SyncFault::NotFound(self.to_string()),
            MempoolError::EmptyTransaction(_) => SyncFault::InvariantViolation(self.to_string()),
        }
    }
}
