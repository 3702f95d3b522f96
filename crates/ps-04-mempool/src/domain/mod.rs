//! # Domain Layer

pub mod config;
pub mod pool;

pub use config::MempoolConfig;
pub use pool::{Eviction, Timestamp, TransactionPool};
