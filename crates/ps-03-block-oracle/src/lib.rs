//! # Block Oracle
//!
//! Fetches blocks on demand from whichever peers are available.
//!
//! - Callers asking for the same hash share one request and one network
//!   fetch ([`BlockWaiter`]).
//! - Queued hashes are handed to peers in batches sized by a
//!   [`PeerTargetPolicy`]; a returned batch requeues what it did not
//!   deliver.
//! - Assignments older than the download timeout are taken back on the
//!   heartbeat and retried elsewhere, up to `max_retries`.
//! - Decoded blocks stay resident up to `cache_limit`; the oldest overflow
//!   to the [`BlockDatabase`].
//!
//! All mutations run on one actor task ([`service`]); reads use a shared
//! lock.
//!
//! ```rust,ignore
//! let (oracle, _task) = BlockOracle::spawn(OracleConfig::default(), codec, ports);
//! let block = oracle.load_bitcoin_timeout(hash, Duration::from_secs(30)).await;
//! ```

pub mod adapters;
pub mod domain;
pub mod errors;
pub mod ports;
pub mod service;

pub use adapters::MerkleValidator;
pub use domain::{
    BlockCache, BlockStatus, BlockWaiter, DeliveryRatePolicy, OracleConfig, PeerStats,
    PeerTargetPolicy,
};
pub use errors::OracleError;
pub use ports::{BlockDatabase, BlockOracleApi, HeaderOracle, Validator};
pub use service::{BlockOracle, OraclePorts, OracleStats};
