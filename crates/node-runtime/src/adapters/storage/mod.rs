//! # Storage Adapters
//!
//! In-memory stand-ins for the block database, the wallet database and the
//! blockchain transaction loader. The node runs against these until a
//! persistent backend is wired in.

pub mod memory;

pub use memory::{InMemoryBlockDatabase, InMemoryWallet};
