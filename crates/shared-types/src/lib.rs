//! # Shared Types Crate
//!
//! This crate contains the chain entities passed between the sync
//! subsystems and the fault taxonomy every subsystem error maps onto.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: `Block`, `Transaction` and `Hash` are defined
//!   once here; the wire codec produces them and the oracle/mempool store them.
//! - **No I/O**: Pure data plus hashing helpers.
//! - **Bitcoin byte order**: hashes are stored in internal (little endian)
//!   order and displayed reversed, like every Bitcoin tool does.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
