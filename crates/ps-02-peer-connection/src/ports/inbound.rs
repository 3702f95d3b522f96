//! # Driving Ports (Inbound API)
//!
//! How the peer manager talks to a running connection task.

use crate::domain::{ConnectionState, PeerSnapshot, RequestStatus};
use parking_lot::RwLock;
use shared_types::{Hash, PeerId};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

/// Commands accepted by a connection task.
#[derive(Debug)]
pub enum PeerCommand {
    /// Send `getheaders`; the reply carries the request's completion signal.
    RequestHeaders {
        locator: Vec<Hash>,
        reply: oneshot::Sender<Option<watch::Receiver<RequestStatus>>>,
    },
    BroadcastBlock(Hash),
    BroadcastTransaction(Hash),
    /// Announce every id in the snapshot the peer has not been told about.
    ReconcileMempool(Arc<Vec<Hash>>),
    /// The oracle has queued work; ask for a batch now.
    PollBlocks,
    Disconnect,
}

/// Cloneable handle to a connection task.
#[derive(Clone)]
pub struct PeerHandle {
    id: PeerId,
    addr: SocketAddr,
    commands: mpsc::Sender<PeerCommand>,
    snapshot: Arc<RwLock<PeerSnapshot>>,
}

impl PeerHandle {
    pub(crate) fn new(
        id: PeerId,
        addr: SocketAddr,
        commands: mpsc::Sender<PeerCommand>,
        snapshot: Arc<RwLock<PeerSnapshot>>,
    ) -> Self {
        Self {
            id,
            addr,
            commands,
            snapshot,
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Latest state published by the connection task.
    pub fn snapshot(&self) -> PeerSnapshot {
        self.snapshot.read().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.snapshot.read().state
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Requests headers. `None` if the peer is gone or not ready.
    pub async fn request_headers(
        &self,
        locator: Vec<Hash>,
    ) -> Option<watch::Receiver<RequestStatus>> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(PeerCommand::RequestHeaders { locator, reply })
            .await
            .ok()?;
        response.await.ok().flatten()
    }

    /// Fire-and-forget relay. A saturated peer drops the announcement.
    pub fn broadcast_block(&self, hash: Hash) -> bool {
        self.try_send(PeerCommand::BroadcastBlock(hash))
    }

    pub fn broadcast_transaction(&self, txid: Hash) -> bool {
        self.try_send(PeerCommand::BroadcastTransaction(txid))
    }

    pub fn reconcile_mempool(&self, snapshot: Arc<Vec<Hash>>) -> bool {
        self.try_send(PeerCommand::ReconcileMempool(snapshot))
    }

    pub fn poll_blocks(&self) -> bool {
        self.try_send(PeerCommand::PollBlocks)
    }

    pub async fn disconnect(&self) {
        let _ = self.commands.send(PeerCommand::Disconnect).await;
    }

    fn try_send(&self, command: PeerCommand) -> bool {
        match self.commands.try_send(command) {
            Ok(()) => true,
            Err(err) => {
                debug!(peer = %self.id, error = %err, "Peer command dropped");
                false
            }
        }
    }
}
