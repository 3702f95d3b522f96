//! # Peer Port Adapters
//!
//! Connections talk to the block oracle and mempool through the
//! `ps-02` outbound ports. These adapters implement them over the actor
//! handles.
//!
//! ```text
//! Connection ──BlockDownloader──► OracleDownloader ──► BlockOracle actor
//!            ──TransactionSink──► MempoolSink      ──► Mempool actor
//! ```

pub mod block_oracle;
pub mod mempool;

pub use block_oracle::OracleDownloader;
pub use mempool::MempoolSink;
