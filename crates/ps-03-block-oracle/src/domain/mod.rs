//! # Domain Layer
//!
//! Request de-duplication, batch allocation, timeouts and the resident
//! block store. Nothing here performs I/O.

pub mod cache;
pub mod config;
pub mod policy;
pub mod waiter;


pub use cache::{Batch, BlockCache, Expiry, FinishedBatch, Resolution};
pub use config::OracleConfig;
pub use policy::{DeliveryRatePolicy, PeerStats, PeerTargetPolicy};
pub use waiter::{BlockStatus, BlockWaiter};
