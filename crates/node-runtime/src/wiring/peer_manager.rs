//! # Peer Manager
//!
//! Owns every live connection of the node.
//!
//! - Dials configured addresses and accepts inbound connections while
//!   fewer than `max_peers` are live.
//! - Refuses banned addresses until their ban expires.
//! - Fans broadcasts and mempool reconciliation out to ready peers.
//! - Reaps finished connection tasks, banning where the outcome says so.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use ps_01_wire_codec::BitcoinCodec;
use ps_02_peer_connection::{
    spawn_connection, ConnectionOutcome, Direction, Peer, PeerConfig, PeerHandle, PeerPorts,
};
use ps_03_block_oracle::HeaderOracle;
use shared_types::{Hash, PeerId, SyncFault};

/// Why a connection was refused.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("{0} is banned")]
    Banned(SocketAddr),

    #[error("peer limit of {0} reached")]
    Full(usize),

    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Manager limits.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub max_peers: usize,
    pub ban_duration: Duration,
}

struct ManagerInner {
    config: ManagerConfig,
    peer_config: PeerConfig,
    codec: Arc<BitcoinCodec>,
    ports: PeerPorts,
    headers: Arc<dyn HeaderOracle>,
    /// Shared by every connection so that dialing ourselves is detected.
    local_nonce: u64,
    next_id: AtomicU64,
    peers: RwLock<HashMap<PeerId, PeerHandle>>,
    bans: Mutex<HashMap<IpAddr, Instant>>,
}

/// Cloneable handle to the node's connection set.
#[derive(Clone)]
pub struct PeerManager {
    inner: Arc<ManagerInner>,
}

impl PeerManager {
    pub fn new(
        config: ManagerConfig,
        peer_config: PeerConfig,
        codec: Arc<BitcoinCodec>,
        ports: PeerPorts,
        headers: Arc<dyn HeaderOracle>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                peer_config,
                codec,
                ports,
                headers,
                local_nonce: rand::random(),
                next_id: AtomicU64::new(1),
                peers: RwLock::new(HashMap::new()),
                bans: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Dials `addr` and starts the handshake.
    pub async fn connect(&self, addr: SocketAddr) -> Result<PeerHandle, ManagerError> {
        self.admit(addr)?;
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ManagerError::Connect { addr, source })?;
        if let Err(err) = stream.set_nodelay(true) {
            debug!(%addr, error = %err, "Could not set TCP_NODELAY");
        }
        self.attach(stream, addr, Direction::Outbound).await
    }

    /// Accepts inbound connections until `shutdown` flips.
    pub async fn accept_loop(&self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if let Err(err) = self.attach(stream, addr, Direction::Inbound).await {
                            debug!(%addr, error = %err, "Inbound connection refused");
                        }
                    }
                    Err(err) => warn!(error = %err, "Accept failed"),
                },
                _ = shutdown.changed() => break,
            }
        }
    }

    /// Runs a connection over an already established stream.
    pub async fn attach<S>(
        &self,
        stream: S,
        addr: SocketAddr,
        direction: Direction,
    ) -> Result<PeerHandle, ManagerError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.admit(addr)?;
        let inner = &self.inner;
        let id = PeerId(inner.next_id.fetch_add(1, Ordering::Relaxed));
        let best_height = inner.headers.best_height().await;
        let peer = Peer::new(
            id,
            addr,
            direction,
            Arc::clone(&inner.codec),
            inner.peer_config.clone(),
            inner.local_nonce,
            best_height,
            Instant::now(),
        );

        let (handle, task) = spawn_connection(peer, stream, inner.ports.clone());
        inner.peers.write().insert(id, handle.clone());
        info!(peer = %id, %addr, ?direction, "Connection started");

        let manager = self.clone();
        tokio::spawn(async move {
            match task.await {
                Ok(outcome) => manager.reap(outcome),
                Err(err) => {
                    warn!(peer = %id, error = %err, "Connection task failed");
                    manager.inner.peers.write().remove(&id);
                }
            }
        });
        Ok(handle)
    }

    fn admit(&self, addr: SocketAddr) -> Result<(), ManagerError> {
        if self.is_banned(addr.ip()) {
            return Err(ManagerError::Banned(addr));
        }
        let live = self.inner.peers.read().len();
        if live >= self.inner.config.max_peers {
            return Err(ManagerError::Full(self.inner.config.max_peers));
        }
        Ok(())
    }

    fn reap(&self, outcome: ConnectionOutcome) {
        self.inner.peers.write().remove(&outcome.id);

        match outcome.error.as_ref().and_then(|err| err.fault()) {
            Some(SyncFault::ProtocolViolation(_)) => ps_telemetry::PROTOCOL_VIOLATIONS.inc(),
            Some(SyncFault::Timeout(_)) => ps_telemetry::REQUEST_TIMEOUTS.inc(),
            _ => {}
        }
        if outcome.banned() {
            ps_telemetry::PEERS_BANNED.inc();
            self.ban(outcome.addr.ip());
        }
        debug!(peer = %outcome.id, addr = %outcome.addr, state = ?outcome.state, "Connection reaped");
    }

    /// Refuses `ip` for the configured ban duration.
    pub fn ban(&self, ip: IpAddr) {
        let until = Instant::now() + self.inner.config.ban_duration;
        self.inner.bans.lock().insert(ip, until);
        warn!(%ip, duration = ?self.inner.config.ban_duration, "Address banned");
    }

    pub fn is_banned(&self, ip: IpAddr) -> bool {
        let mut bans = self.inner.bans.lock();
        match bans.get(&ip) {
            Some(until) if *until > Instant::now() => true,
            Some(_) => {
                bans.remove(&ip);
                false
            }
            None => false,
        }
    }

    pub fn peers(&self) -> Vec<PeerHandle> {
        self.inner.peers.read().values().cloned().collect()
    }

    pub fn peer(&self, id: PeerId) -> Option<PeerHandle> {
        self.inner.peers.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.peers.read().is_empty()
    }

    pub fn ready_count(&self) -> usize {
        self.ready().count()
    }

    fn ready(&self) -> impl Iterator<Item = PeerHandle> {
        self.peers().into_iter().filter(PeerHandle::is_ready)
    }

    /// Announces a block to every ready peer. Returns how many accepted it.
    pub fn broadcast_block(&self, hash: Hash) -> usize {
        self.ready().filter(|peer| peer.broadcast_block(hash)).count()
    }

    pub fn broadcast_transaction(&self, txid: Hash) -> usize {
        self.ready()
            .filter(|peer| peer.broadcast_transaction(txid))
            .count()
    }

    /// Sends each ready peer the ids in `snapshot` it has not been told about.
    pub fn reconcile(&self, snapshot: Arc<Vec<Hash>>) -> usize {
        self.ready()
            .filter(|peer| peer.reconcile_mempool(Arc::clone(&snapshot)))
            .count()
    }

    /// Nudges idle peers to ask the oracle for a batch.
    pub fn poll_blocks(&self) -> usize {
        self.ready().filter(|peer| peer.poll_blocks()).count()
    }

    /// Disconnects every peer.
    pub async fn shutdown(&self) {
        for peer in self.peers() {
            peer.disconnect().await;
        }
    }
}
