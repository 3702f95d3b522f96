//! # Peer Connection
//!
//! One Bitcoin P2P connection: handshake, liveness, request tracking and
//! relay.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  PeerCommand   ┌────────────────────────────┐
//! │ Peer manager │ ─────────────► │ Connection (service.rs)    │
//! └──────────────┘                │  Framed<socket, FrameCodec>│
//!        ▲  PeerSnapshot          │  select!(frame|cmd|tick)   │
//!        └─────────────────────── │        │                   │
//!                                 │        ▼                   │
//!                                 │  Peer (domain, sans-IO)    │
//!                                 │        │ Vec<Effect>       │
//!                                 └────────┼───────────────────┘
//!                                          ▼
//!                      BlockDownloader / TransactionSink / HeaderSink
//! ```
//!
//! ## Lifecycle
//!
//! `Connecting → Handshaking → Ready → Disconnecting → Closed`, with
//! `Banned` reachable from any live state. Only an unknown-command flood
//! bans; malformed frames and timeouts just disconnect.

pub mod domain;
pub mod errors;
pub mod ports;
pub mod service;

pub use domain::{
    ConnectionState, Direction, Effect, HandshakeStep, Peer, PeerConfig, PeerPreferences,
    PeerSnapshot, RemoteInfo, RequestKind, RequestStatus, RequestTracker,
};
pub use errors::PeerError;
pub use ports::{
    BlockDownloader, HeaderSink, PeerCommand, PeerHandle, PeerPorts, TransactionSink,
};
pub use service::{spawn_connection, Connection, ConnectionOutcome};
