//! # Ports Layer
//!
//! - `inbound`: [`BlockOracleApi`], implemented by the service handle
//! - `outbound`: header chain, block database and validator collaborators

pub mod inbound;
pub mod outbound;

pub use inbound::BlockOracleApi;
pub use outbound::{BlockDatabase, HeaderOracle, Validator};
