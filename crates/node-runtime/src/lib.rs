//! # Node Runtime Library
//!
//! Wires the peer connections, the block oracle and the mempool of one
//! chain into a running node. The `node-runtime` binary is a thin wrapper
//! over [`NodeRuntime`].
//!
//! ## Architectural Patterns
//!
//! - **Hexagonal Architecture**: subsystems define ports, this crate
//!   provides the adapters
//! - **Actors**: the oracle and the mempool serialise their mutations on
//!   one task each; connections run one task per socket
//! - **Event bus**: subsystems announce state changes; the router and
//!   metrics react

pub mod adapters;
pub mod container;
pub mod runtime;
pub mod wiring;

pub use container::{Collaborators, ConfigError, NodeConfig, SubsystemContainer};
pub use runtime::NodeRuntime;
pub use wiring::{ManagerConfig, ManagerError, PeerManager};
