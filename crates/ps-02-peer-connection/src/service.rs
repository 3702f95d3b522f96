//! # Connection Driver
//!
//! Owns the socket for one peer and executes the [`Effect`]s the [`Peer`]
//! state machine produces. Three inputs feed the loop: frames from the
//! remote, commands from the peer manager and a timer tick.
//!
//! Effects run from a queue. Effects that produce further effects (an
//! announcement that turns into a `getdata`, a `getdata` that turns into
//! replies) append to the same queue instead of recursing.

use crate::domain::{ConnectionState, Effect, Peer, PeerSnapshot};
use crate::errors::PeerError;
use crate::ports::{BlockDownloader, PeerCommand, PeerHandle, PeerPorts, TransactionSink};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use ps_01_wire_codec::{services, FrameCodec, Inventory, InvType, Message, WireCodec};
use shared_bus::SyncEvent;
use shared_types::{BatchId, PeerId, SyncFault};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

/// How a connection task ended.
#[derive(Debug)]
pub struct ConnectionOutcome {
    pub id: PeerId,
    pub addr: SocketAddr,
    /// `Closed` or `Banned`.
    pub state: ConnectionState,
    /// `None` for an orderly local disconnect.
    pub error: Option<PeerError>,
    /// Whether the handshake ever completed.
    pub was_ready: bool,
}

impl ConnectionOutcome {
    pub fn banned(&self) -> bool {
        self.state == ConnectionState::Banned
    }
}

/// Spawns the driver for `peer` over `stream`.
pub fn spawn_connection<C, S>(
    peer: Peer<C>,
    stream: S,
    ports: PeerPorts,
) -> (PeerHandle, JoinHandle<ConnectionOutcome>)
where
    C: WireCodec,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sender, receiver) = mpsc::channel(peer.config().command_buffer);
    let snapshot = Arc::new(RwLock::new(peer.snapshot()));
    let handle = PeerHandle::new(peer.id(), peer.addr(), sender, Arc::clone(&snapshot));
    let connection = Connection::new(peer, stream, receiver, snapshot, ports);
    (handle, tokio::spawn(connection.run()))
}

/// One running connection.
pub struct Connection<C: WireCodec, S> {
    peer: Peer<C>,
    framed: Framed<S, FrameCodec>,
    commands: mpsc::Receiver<PeerCommand>,
    snapshot: Arc<RwLock<PeerSnapshot>>,
    ports: PeerPorts,
    want_batch: bool,
    was_ready: bool,
}

impl<C, S> Connection<C, S>
where
    C: WireCodec,
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(
        peer: Peer<C>,
        stream: S,
        commands: mpsc::Receiver<PeerCommand>,
        snapshot: Arc<RwLock<PeerSnapshot>>,
        ports: PeerPorts,
    ) -> Self {
        let framed = Framed::new(stream, peer.codec().frame_codec());
        Self {
            peer,
            framed,
            commands,
            snapshot,
            ports,
            want_batch: false,
            was_ready: false,
        }
    }

    /// Drives the connection to completion.
    pub async fn run(mut self) -> ConnectionOutcome {
        let id = self.peer.id();
        let addr = self.peer.addr();

        let error = match self.drive().await {
            Ok(()) => None,
            Err(err) => {
                log_failure(id, addr, &err);
                self.peer.fail(&err);
                Some(err)
            }
        };

        if let Some(batch) = self.peer.close() {
            self.ports.blocks.finish_batch(id, batch).await;
        }
        self.ports.blocks.forget_peer(id).await;
        if self.was_ready {
            self.ports
                .events
                .publish(SyncEvent::PeerDisconnected {
                    chain: self.ports.chain,
                    peer: id,
                })
                .await;
        }
        self.publish_snapshot();
        let state = self.peer.state();
        info!(peer = %id, %addr, ?state, "Connection finished");

        ConnectionOutcome {
            id,
            addr,
            state,
            error,
            was_ready: self.was_ready,
        }
    }

    async fn drive(&mut self) -> Result<(), PeerError> {
        let effects = self.peer.start_handshake(Instant::now())?;
        self.execute(effects).await?;
        self.publish_snapshot();

        let mut ticker = interval(self.peer.config().tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        while self.is_live() {
            tokio::select! {
                frame = self.framed.next() => {
                    let frame = match frame {
                        Some(frame) => frame?,
                        None => return Err(PeerError::Closed),
                    };
                    let effects = self.peer.receive(&frame, Instant::now())?;
                    self.execute(effects).await?;
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command).await?,
                    // Every handle dropped: nobody can drive us any more.
                    None => self.peer.disconnect(),
                },
                _ = ticker.tick() => {
                    let effects = self.peer.tick(Instant::now())?;
                    self.execute(effects).await?;
                    self.want_batch = true;
                }
            }

            if self.want_batch {
                self.want_batch = false;
                self.fill_batch().await?;
            }
            self.publish_snapshot();
        }
        Ok(())
    }

    fn is_live(&self) -> bool {
        matches!(
            self.peer.state(),
            ConnectionState::Connecting | ConnectionState::Handshaking(_) | ConnectionState::Ready
        )
    }

    async fn on_command(&mut self, command: PeerCommand) -> Result<(), PeerError> {
        let effects = match command {
            PeerCommand::RequestHeaders { locator, reply } => {
                let (effects, signal) = self.peer.request_headers(locator, Instant::now());
                let _ = reply.send(signal);
                effects
            }
            PeerCommand::BroadcastBlock(hash) => self.peer.broadcast_block(hash),
            PeerCommand::BroadcastTransaction(txid) => {
                self.peer.announce_transactions(std::iter::once(txid))
            }
            PeerCommand::ReconcileMempool(snapshot) => self.peer.reconcile_mempool(&snapshot),
            PeerCommand::PollBlocks => {
                self.want_batch = true;
                Vec::new()
            }
            PeerCommand::Disconnect => {
                debug!(peer = %self.peer.id(), "Disconnect requested");
                self.peer.disconnect();
                Vec::new()
            }
        };
        self.execute(effects).await
    }

    /// Asks the oracle for work when the peer is idle and serves blocks.
    async fn fill_batch(&mut self) -> Result<(), PeerError> {
        if !self.peer.is_ready() || self.peer.in_flight_batch().is_some() {
            return Ok(());
        }
        let serves_blocks = self.peer.remote().is_some_and(|remote| {
            remote.services & (services::NODE_NETWORK | services::NODE_NETWORK_LIMITED) != 0
        });
        if !serves_blocks {
            return Ok(());
        }
        let Some((batch, hashes)) = self.ports.blocks.get_block_batch(self.peer.id()).await else {
            return Ok(());
        };
        let effects = self.peer.request_blocks(batch, hashes, Instant::now());
        self.execute(effects).await
    }

    async fn execute(&mut self, effects: Vec<Effect>) -> Result<(), PeerError> {
        let id = self.peer.id();
        let mut queue: VecDeque<Effect> = effects.into();

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Send(message) => self.send(&message).await?,
                Effect::HandshakeComplete => {
                    self.was_ready = true;
                    self.want_batch = true;
                    self.ports
                        .events
                        .publish(SyncEvent::PeerConnected {
                            chain: self.ports.chain,
                            peer: id,
                        })
                        .await;
                }
                Effect::ForwardBlock(raw) => self.ports.blocks.receive_block(id, raw).await,
                Effect::ForwardTransaction(tx) => self.ports.transactions.receive(id, tx),
                Effect::TransactionsAnnounced(txids) => {
                    let wanted = self.ports.transactions.announce(txids);
                    queue.extend(self.peer.request_transactions(wanted, Instant::now()));
                }
                Effect::BlocksAnnounced(hashes) => {
                    self.ports.headers.blocks_announced(id, hashes).await
                }
                Effect::ForwardHeaders(headers) => {
                    self.ports.headers.receive_headers(id, headers).await
                }
                Effect::ServeData(items) => {
                    let served = serve_data(
                        id,
                        Arc::clone(self.peer.codec()),
                        Arc::clone(&self.ports.transactions),
                        Arc::clone(&self.ports.blocks),
                        items,
                    );
                    queue.extend(served.await);
                }
                Effect::ServeMempool => {
                    let txids = self.ports.transactions.snapshot().await;
                    queue.extend(self.peer.announce_transactions(txids));
                }
                Effect::FinishBatch(batch) => self.finish_batch(batch).await,
            }
        }
        Ok(())
    }

    async fn finish_batch(&mut self, batch: BatchId) {
        self.ports.blocks.finish_batch(self.peer.id(), batch).await;
        self.want_batch = true;
    }

    async fn send(&mut self, message: &Message) -> Result<(), PeerError> {
        let frame = self.peer.codec().encode_message(message)?;
        debug!(peer = %self.peer.id(), command = %frame.command, len = frame.payload.len(), "Sending");
        self.framed.send(frame).await?;
        Ok(())
    }

    fn publish_snapshot(&self) {
        *self.snapshot.write() = self.peer.snapshot();
    }
}

/// Answers `getdata` from the mempool and the block cache. Anything we
/// cannot serve goes back in one `notfound`.
/// Owns its handles: the future must not borrow the connection, whose
/// socket is `Send` but not `Sync`.
async fn serve_data<C: WireCodec>(
    peer: PeerId,
    codec: Arc<C>,
    transactions: Arc<dyn TransactionSink>,
    blocks: Arc<dyn BlockDownloader>,
    items: Vec<Inventory>,
) -> Vec<Effect> {
    let mut effects = Vec::new();
    let mut missing = Vec::new();

    for item in items {
        match item.inv_type {
            InvType::Tx | InvType::WitnessTx => match transactions.query(item.hash).await {
                Some(tx) => {
                    let mut tx = (*tx).clone();
                    if item.inv_type == InvType::Tx {
                        strip_witness(&mut tx);
                    }
                    effects.push(Effect::Send(Message::Tx(tx)));
                }
                None => missing.push(item),
            },
            InvType::Block | InvType::WitnessBlock => match blocks.query_block(item.hash).await {
                Some(block) => {
                    let raw = codec.encode_block(&block);
                    effects.push(Effect::Send(Message::Block(Bytes::from(raw))));
                }
                None => missing.push(item),
            },
            _ => missing.push(item),
        }
    }

    if !missing.is_empty() {
        debug!(%peer, count = missing.len(), "Answering notfound");
        effects.push(Effect::Send(Message::NotFound(missing)));
    }
    effects
}

fn strip_witness(tx: &mut shared_types::Transaction) {
    for input in &mut tx.inputs {
        input.witness.clear();
    }
}

fn log_failure(id: PeerId, addr: SocketAddr, err: &PeerError) {
    match err.fault() {
        None => debug!(peer = %id, %addr, "Remote closed connection"),
        Some(SyncFault::Timeout(_)) => info!(peer = %id, %addr, error = %err, "Peer timed out"),
        Some(SyncFault::InvariantViolation(_)) => {
            error!(peer = %id, %addr, error = %err, "Connection invariant broken")
        }
        Some(_) => warn!(peer = %id, %addr, error = %err, "Dropping misbehaving peer"),
    }
}
