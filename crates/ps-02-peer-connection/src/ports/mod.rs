//! # Ports Layer
//!
//! - `inbound`: the command handle the peer manager drives
//! - `outbound`: block oracle, mempool and header collaborators

pub mod inbound;
pub mod outbound;

pub use inbound::{PeerCommand, PeerHandle};
pub use outbound::{BlockDownloader, HeaderSink, PeerPorts, TransactionSink};
