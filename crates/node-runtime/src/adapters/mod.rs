//! # Adapter Implementations
//!
//! Concrete implementations of the outbound ports of each subsystem.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                     OUTER LAYER (Adapters)                          │
//! │  OracleDownloader, MempoolSink, InMemoryHeaderChain, storage        │
//! │                              ↑ implements ↑                         │
//! │                    MIDDLE LAYER (Ports)                             │
//! │  BlockDownloader, TransactionSink, HeaderSink, HeaderOracle,        │
//! │  BlockDatabase, WalletDatabase, TransactionLoader                   │
//! │                              ↑ uses ↑                               │
//! │                    INNER LAYER (Domain)                             │
//! │  Peer, BlockCache, TransactionPool                                  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

pub mod headers;
pub mod ports;
pub mod storage;

pub use headers::{genesis_hash, InMemoryHeaderChain};
pub use ports::{MempoolSink, OracleDownloader};
pub use storage::{InMemoryBlockDatabase, InMemoryWallet};
