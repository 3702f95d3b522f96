//! # Mempool
//!
//! Unconfirmed transactions announced by peers, keyed by txid.
//!
//! An id may be known without its payload. Two time-ordered queues bound
//! memory: payloads are dropped after `tx_limit`, ids after `txid_limit`.
//! A "mempool updated" event is published the first time a payload
//! arrives for an id, and never again for that id.
//!
//! ```rust,ignore
//! let (mempool, _task) = Mempool::spawn(chain, MempoolConfig::default(), time, bus);
//! mempool.submit_id(txid).await;
//! mempool.submit_transaction(tx).await;
//! ```

pub mod domain;
pub mod errors;
pub mod ports;
pub mod service;

pub use domain::{Eviction, MempoolConfig, Timestamp, TransactionPool};
pub use errors::MempoolError;
pub use ports::{MempoolApi, MonotonicTimeSource, TimeSource, TransactionLoader, WalletDatabase};
pub use service::{Mempool, MempoolStats};
