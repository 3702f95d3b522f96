//! # Event Routing
//!
//! Reacts to subsystem events on the bus:
//!
//! | Event | Reaction |
//! |-------|----------|
//! | `QueueDepthChanged` (non-zero) | idle peers poll the oracle for a batch |
//! | `PeerConnected` | ask the new peer for headers past our tip |
//! | `BlockDownloaded` | count it |
//! | `PeerConnected` / `PeerDisconnected` | ready-peer gauge |

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use shared_bus::{Subscription, SyncEvent};

use crate::adapters::InMemoryHeaderChain;
use crate::wiring::PeerManager;

pub struct EventRouter {
    peers: PeerManager,
    header_chain: Arc<InMemoryHeaderChain>,
}

impl EventRouter {
    pub fn new(peers: PeerManager, header_chain: Arc<InMemoryHeaderChain>) -> Self {
        Self {
            peers,
            header_chain,
        }
    }

    /// Routes events until the bus closes or `shutdown` flips.
    pub async fn run(self, mut events: Subscription, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.route(event),
                    None => break,
                },
                _ = shutdown.changed() => break,
            }
        }
        debug!("Event router stopped");
    }

    fn route(&self, event: SyncEvent) {
        match event {
            SyncEvent::QueueDepthChanged { depth, .. } if depth > 0 => {
                let polled = self.peers.poll_blocks();
                debug!(depth, polled, "Download queue grew");
            }
            SyncEvent::BlockDownloaded { .. } => ps_telemetry::BLOCKS_DOWNLOADED.inc(),
            SyncEvent::PeerConnected { peer, .. } => {
                ps_telemetry::PEERS_CONNECTED.inc();
                if let Some(handle) = self.peers.peer(peer) {
                    let locator = self.header_chain.locator();
                    tokio::spawn(async move {
                        if handle.request_headers(locator).await.is_none() {
                            debug!(%peer, "Peer gone before getheaders");
                        }
                    });
                }
            }
            SyncEvent::PeerDisconnected { .. } => ps_telemetry::PEERS_CONNECTED.dec(),
            _ => {}
        }
    }
}
