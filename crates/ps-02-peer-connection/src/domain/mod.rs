//! # Domain Layer
//!
//! Pure protocol logic: lifecycle states, request tracking and the
//! per-peer state machine. Time is passed in, never read.

pub mod config;
pub mod peer;
pub mod request;
pub mod state;


pub use config::PeerConfig;
pub use peer::{Direction, Effect, Peer, PeerPreferences, PeerSnapshot, RemoteInfo};
pub use request::{RequestKind, RequestStatus, RequestTracker};
pub use state::{ConnectionState, HandshakeStep};
