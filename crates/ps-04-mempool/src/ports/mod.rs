//! # Ports Layer

pub mod inbound;
pub mod outbound;

pub use inbound::MempoolApi;
#[cfg(test)]
pub use outbound::MockTimeSource;
pub use outbound::{MonotonicTimeSource, TimeSource, TransactionLoader, WalletDatabase};
