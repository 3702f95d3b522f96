//! # Integration Flows
//!
//! A full node (oracle, mempool, peer manager, router and scheduler)
//! talking to scripted remotes or to a second node over in-memory pipes.
//!
//! - `block_download`: request de-duplication, batch requeue
//! - `mempool_relay`: announce, fetch and notify; relay between nodes

pub mod block_download;
pub mod mempool_relay;
