//! # Subsystem Container
//!
//! Configuration and the subsystem instances of one node.

pub mod config;
pub mod subsystems;

pub use config::{
    ConfigError, MempoolSettings, NetworkConfig, NodeConfig, OracleSettings, PeerSettings,
};
pub use subsystems::{Collaborators, SubsystemContainer};
