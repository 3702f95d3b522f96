//! The per-peer protocol state machine.
//!
//! `Peer` performs no I/O. Every input (a frame, a timer tick, a command)
//! returns a list of [`Effect`]s the connection driver executes: frames to
//! send and data to forward to the block oracle or the mempool. This keeps
//! the whole protocol testable without sockets or a runtime.

use super::config::PeerConfig;
use super::request::{RequestKind, RequestStatus, RequestTracker};
use super::state::{ConnectionState, HandshakeStep};
use crate::errors::PeerError;
use bytes::Bytes;
use ps_01_wire_codec::{
    BlockLocator, Inventory, Message, NetAddress, RawFrame, VersionMessage, WireCodec,
    MAX_INV_ENTRIES,
};
use shared_types::{
    hash_to_hex, sha256d, BatchId, BlockHeader, DisplayHash, Hash, PeerId, Transaction,
    BLOCK_HEADER_SIZE,
};
use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Who opened the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
}

/// Work for the connection driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Write a message to the peer.
    Send(Message),
    /// The handshake finished; the peer is `Ready`.
    HandshakeComplete,
    /// Hand raw block bytes to the block oracle.
    ForwardBlock(Bytes),
    /// Hand a transaction to the mempool.
    ForwardTransaction(Transaction),
    /// Transaction ids announced via `inv`.
    TransactionsAnnounced(Vec<Hash>),
    /// Block hashes announced via `inv`.
    BlocksAnnounced(Vec<Hash>),
    /// Headers received in answer to `getheaders` or as announcements.
    ForwardHeaders(Vec<BlockHeader>),
    /// Answer a `getdata` from local stores.
    ServeData(Vec<Inventory>),
    /// Answer a `mempool` request.
    ServeMempool,
    /// Return a block batch to the oracle, complete or not.
    FinishBatch(BatchId),
}

/// What the remote told us in its `version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteInfo {
    pub version: i32,
    pub services: u64,
    pub user_agent: String,
    pub start_height: i32,
    pub relay: bool,
}

/// Preferences the remote announced after the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerPreferences {
    pub send_headers: bool,
    /// Minimum fee rate in sat/kvB.
    pub fee_filter: u64,
    /// `(high bandwidth, version)` from `sendcmpct`.
    pub compact_blocks: Option<(bool, u64)>,
}

/// Read-only view published for the peer manager.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerSnapshot {
    pub id: PeerId,
    pub addr: SocketAddr,
    pub direction: Direction,
    pub state: ConnectionState,
    pub remote: Option<RemoteInfo>,
    pub latency: Option<Duration>,
    pub batch: Option<BatchId>,
}

#[derive(Debug)]
struct InFlightBatch {
    id: BatchId,
    pending: HashSet<Hash>,
}

#[derive(Debug, Clone, Copy)]
struct PendingPing {
    nonce: u64,
    sent_at: Instant,
}

/// Protocol state of one connection, generic over the chain encoding.
pub struct Peer<C: WireCodec> {
    id: PeerId,
    addr: SocketAddr,
    direction: Direction,
    codec: Arc<C>,
    config: PeerConfig,
    state: ConnectionState,
    local_nonce: u64,
    best_height: i32,
    remote: Option<RemoteInfo>,
    negotiated_version: i32,
    early_verack: bool,
    last_activity: Instant,
    next_ping_at: Instant,
    pending_ping: Option<PendingPing>,
    latency: Option<Duration>,
    unknown_commands: u32,
    requests: RequestTracker,
    preferences: PeerPreferences,
    batch: Option<InFlightBatch>,
    pending_txs: HashSet<Hash>,
    /// Transaction ids the remote is known to have, at most
    /// `max_announced`. Oldest first in `announced_order`.
    announced: HashSet<Hash>,
    announced_order: VecDeque<Hash>,
}

impl<C: WireCodec> Peer<C> {
    /// `local_nonce` is shared by every connection of this node so that
    /// connections to ourselves are detected.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: PeerId,
        addr: SocketAddr,
        direction: Direction,
        codec: Arc<C>,
        config: PeerConfig,
        local_nonce: u64,
        best_height: i32,
        now: Instant,
    ) -> Self {
        let negotiated_version = config.protocol_version;
        Self {
            id,
            addr,
            direction,
            codec,
            config,
            state: ConnectionState::Connecting,
            local_nonce,
            best_height,
            remote: None,
            negotiated_version,
            early_verack: false,
            last_activity: now,
            next_ping_at: now,
            pending_ping: None,
            latency: None,
            unknown_commands: 0,
            requests: RequestTracker::new(),
            preferences: PeerPreferences::default(),
            batch: None,
            pending_txs: HashSet::new(),
            announced: HashSet::new(),
            announced_order: VecDeque::new(),
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn codec(&self) -> &Arc<C> {
        &self.codec
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    pub fn remote(&self) -> Option<&RemoteInfo> {
        self.remote.as_ref()
    }

    pub fn negotiated_version(&self) -> i32 {
        self.negotiated_version
    }

    pub fn preferences(&self) -> &PeerPreferences {
        &self.preferences
    }

    /// Transaction ids remembered as known to the remote.
    pub fn known_transactions(&self) -> usize {
        self.announced.len()
    }

    pub fn in_flight_batch(&self) -> Option<BatchId> {
        self.batch.as_ref().map(|batch| batch.id)
    }

    /// Whether a request of `kind` is still running.
    pub fn running(&self, kind: RequestKind, now: Instant) -> bool {
        self.requests.running(kind, now)
    }

    pub fn snapshot(&self) -> PeerSnapshot {
        PeerSnapshot {
            id: self.id,
            addr: self.addr,
            direction: self.direction,
            state: self.state,
            remote: self.remote.clone(),
            latency: self.latency,
            batch: self.in_flight_batch(),
        }
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Arms the handshake timer. Outbound connections speak first.
    pub fn start_handshake(&mut self, now: Instant) -> Result<Vec<Effect>, PeerError> {
        let _ = self
            .requests
            .start(RequestKind::Handshake, self.config.handshake_timeout, now);
        match self.direction {
            Direction::Outbound => {
                self.transition(ConnectionState::Handshaking(HandshakeStep::VersionSent))?;
                Ok(vec![Effect::Send(Message::Version(self.local_version()))])
            }
            Direction::Inbound => Ok(Vec::new()),
        }
    }

    /// Orderly local shutdown.
    pub fn disconnect(&mut self) {
        if self.state.can_transition_to(ConnectionState::Disconnecting) {
            self.state = ConnectionState::Disconnecting;
        }
    }

    /// Moves to `Banned` or `Disconnecting` depending on the error.
    pub fn fail(&mut self, err: &PeerError) {
        if self.state.is_terminal() {
            return;
        }
        if err.should_ban() {
            warn!(peer = %self.id, addr = %self.addr, error = %err, "Banning peer");
            self.state = ConnectionState::Banned;
        } else {
            self.disconnect();
        }
    }

    /// Final teardown. Abandons outstanding requests and returns the block
    /// batch that must go back to the oracle, if any.
    pub fn close(&mut self) -> Option<BatchId> {
        if !self.state.is_terminal() {
            self.disconnect();
            self.state = ConnectionState::Closed;
        }
        self.requests.abandon_all();
        self.pending_txs.clear();
        self.batch.take().map(|batch| batch.id)
    }

    fn transition(&mut self, next: ConnectionState) -> Result<(), PeerError> {
        if !self.state.can_transition_to(next) {
            error!(peer = %self.id, from = ?self.state, to = ?next, "Invalid state transition");
            debug_assert!(false, "invalid transition {:?} -> {:?}", self.state, next);
            return Err(PeerError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    fn local_version(&self) -> VersionMessage {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        VersionMessage {
            version: self.config.protocol_version,
            services: self.config.services,
            timestamp,
            receiver: NetAddress::from_socket(self.addr, 0),
            sender: NetAddress::default(),
            nonce: self.local_nonce,
            user_agent: self.config.user_agent.clone(),
            start_height: self.best_height,
            relay: self.config.relay,
        }
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Decodes and dispatches a verified frame.
    pub fn receive(&mut self, frame: &RawFrame, now: Instant) -> Result<Vec<Effect>, PeerError> {
        let message = self.codec.decode_message(frame)?;
        self.handle_message(message, now)
    }

    pub fn handle_message(
        &mut self,
        message: Message,
        now: Instant,
    ) -> Result<Vec<Effect>, PeerError> {
        self.last_activity = now;
        if matches!(self.state, ConnectionState::Disconnecting) || self.state.is_terminal() {
            return Ok(Vec::new());
        }

        match message {
            Message::Version(version) => self.on_version(version, now),
            Message::Verack => self.on_verack(now),
            Message::Unknown { command, .. } => self.on_unknown(&command),
            // Sent between version and verack by current nodes.
            Message::Opaque { command, .. } if !self.is_ready() => {
                debug!(peer = %self.id, %command, "Pre-handshake feature negotiation");
                Ok(Vec::new())
            }
            message if !self.is_ready() => Err(PeerError::ProtocolViolation(format!(
                "`{}` before handshake completed",
                message.command()
            ))),
            Message::Tx(tx) if tx.inputs.is_empty() && tx.outputs.is_empty() => {
                Err(PeerError::EmptyTransaction(hash_to_hex(&tx.txid)))
            }
            message => Ok(self.on_ready_message(message, now)),
        }
    }

    fn on_version(
        &mut self,
        version: VersionMessage,
        now: Instant,
    ) -> Result<Vec<Effect>, PeerError> {
        if self.remote.is_some() {
            return Err(PeerError::ProtocolViolation("duplicate version".into()));
        }
        if version.nonce == self.local_nonce {
            return Err(PeerError::SelfConnection);
        }
        if version.version < self.config.min_protocol_version {
            return Err(PeerError::UnsupportedVersion(version.version));
        }

        self.negotiated_version = version.version.min(self.config.protocol_version);
        info!(
            peer = %self.id,
            addr = %self.addr,
            version = version.version,
            user_agent = %version.user_agent,
            height = version.start_height,
            "Received version"
        );
        self.remote = Some(RemoteInfo {
            version: version.version,
            services: version.services,
            user_agent: version.user_agent,
            start_height: version.start_height,
            relay: version.relay,
        });

        match self.state {
            ConnectionState::Connecting => {
                self.transition(ConnectionState::Handshaking(HandshakeStep::AwaitingVerack))?;
                Ok(vec![
                    Effect::Send(Message::Version(self.local_version())),
                    Effect::Send(Message::Verack),
                ])
            }
            ConnectionState::Handshaking(HandshakeStep::VersionSent) => {
                let mut effects = vec![Effect::Send(Message::Verack)];
                if self.early_verack {
                    effects.extend(self.complete_handshake(now)?);
                } else {
                    self.transition(ConnectionState::Handshaking(
                        HandshakeStep::AwaitingVerack,
                    ))?;
                }
                Ok(effects)
            }
            state => Err(PeerError::ProtocolViolation(format!(
                "version in state {state:?}"
            ))),
        }
    }

    fn on_verack(&mut self, now: Instant) -> Result<Vec<Effect>, PeerError> {
        match self.state {
            ConnectionState::Handshaking(HandshakeStep::AwaitingVerack) => {
                self.complete_handshake(now)
            }
            ConnectionState::Handshaking(HandshakeStep::VersionSent) => {
                self.early_verack = true;
                Ok(Vec::new())
            }
            ConnectionState::Ready => {
                debug!(peer = %self.id, "Ignoring duplicate verack");
                Ok(Vec::new())
            }
            state => Err(PeerError::ProtocolViolation(format!(
                "verack in state {state:?}"
            ))),
        }
    }

    fn complete_handshake(&mut self, now: Instant) -> Result<Vec<Effect>, PeerError> {
        self.transition(ConnectionState::Ready)?;
        self.requests.finish(RequestKind::Handshake);
        self.next_ping_at = now + self.config.ping_interval;
        info!(
            peer = %self.id,
            addr = %self.addr,
            version = self.negotiated_version,
            "Handshake complete"
        );
        Ok(vec![
            Effect::HandshakeComplete,
            Effect::Send(Message::SendHeaders),
        ])
    }

    fn on_unknown(&mut self, command: &str) -> Result<Vec<Effect>, PeerError> {
        self.unknown_commands += 1;
        debug!(
            peer = %self.id,
            command,
            count = self.unknown_commands,
            "Unknown command"
        );
        if self.unknown_commands > self.config.unknown_command_tolerance {
            return Err(PeerError::UnknownCommandFlood(self.unknown_commands));
        }
        Ok(Vec::new())
    }

    fn on_ready_message(&mut self, message: Message, now: Instant) -> Vec<Effect> {
        match message {
            Message::Ping(nonce) => vec![Effect::Send(Message::Pong(nonce))],
            Message::Pong(nonce) => {
                match self.pending_ping {
                    Some(ping) if ping.nonce == nonce => {
                        self.latency = Some(now.saturating_duration_since(ping.sent_at));
                        self.pending_ping = None;
                    }
                    _ => debug!(peer = %self.id, nonce, "Unsolicited pong"),
                }
                Vec::new()
            }
            Message::GetAddr => vec![Effect::Send(Message::Addr(Vec::new()))],
            Message::Addr(entries) => {
                debug!(peer = %self.id, count = entries.len(), "Ignoring addr");
                Vec::new()
            }
            Message::Inv(items) => self.on_inv(items),
            Message::GetData(items) => vec![Effect::ServeData(items)],
            Message::NotFound(items) => self.on_not_found(items),
            Message::GetHeaders(_) | Message::GetBlocks(_) => {
                debug!(peer = %self.id, "Not serving header/block locators");
                Vec::new()
            }
            Message::Headers(headers) => {
                self.requests.finish(RequestKind::Headers);
                if headers.is_empty() {
                    Vec::new()
                } else {
                    vec![Effect::ForwardHeaders(headers)]
                }
            }
            Message::Block(raw) => self.on_block(raw),
            Message::Tx(tx) => {
                if self.pending_txs.remove(&tx.txid) && self.pending_txs.is_empty() {
                    self.requests.finish(RequestKind::Transactions);
                }
                self.remember(tx.txid);
                vec![Effect::ForwardTransaction(tx)]
            }
            Message::Mempool => vec![Effect::ServeMempool],
            Message::FeeFilter(rate) => {
                self.preferences.fee_filter = rate;
                Vec::new()
            }
            Message::SendHeaders => {
                self.preferences.send_headers = true;
                Vec::new()
            }
            Message::SendCmpct { announce, version } => {
                self.preferences.compact_blocks = Some((announce, version));
                Vec::new()
            }
            Message::Reject(reject) => {
                warn!(
                    peer = %self.id,
                    message = %reject.message,
                    code = reject.code,
                    reason = %reject.reason,
                    "Peer rejected our message"
                );
                Vec::new()
            }
            Message::Opaque { command, payload } => {
                debug!(peer = %self.id, %command, len = payload.len(), "Ignoring message");
                Vec::new()
            }
            // Routed before reaching here.
            Message::Version(_) | Message::Verack | Message::Unknown { .. } => Vec::new(),
        }
    }

    fn on_inv(&mut self, items: Vec<Inventory>) -> Vec<Effect> {
        let mut txids = Vec::new();
        let mut blocks = Vec::new();
        for item in items {
            if item.inv_type.is_tx() {
                self.remember(item.hash);
                txids.push(item.hash);
            } else if item.inv_type.is_block() {
                blocks.push(item.hash);
            }
        }
        let mut effects = Vec::new();
        if !txids.is_empty() {
            effects.push(Effect::TransactionsAnnounced(txids));
        }
        if !blocks.is_empty() {
            effects.push(Effect::BlocksAnnounced(blocks));
        }
        effects
    }

    fn on_not_found(&mut self, items: Vec<Inventory>) -> Vec<Effect> {
        let mut effects = Vec::new();
        for item in items {
            if item.inv_type.is_tx() {
                self.pending_txs.remove(&item.hash);
            } else if item.inv_type.is_block() {
                effects.extend(self.settle_block(&item.hash));
            }
        }
        if self.pending_txs.is_empty() {
            self.requests.finish(RequestKind::Transactions);
        }
        effects
    }

    fn on_block(&mut self, raw: Bytes) -> Vec<Effect> {
        if raw.len() < BLOCK_HEADER_SIZE {
            // Let the oracle reject it; the hash is unknowable here.
            return vec![Effect::ForwardBlock(raw)];
        }
        let hash = sha256d(&raw[..BLOCK_HEADER_SIZE]);
        let mut effects = vec![Effect::ForwardBlock(raw)];
        effects.extend(self.settle_block(&hash));
        effects
    }

    /// Removes `hash` from the in-flight batch and finishes the batch once
    /// nothing is pending.
    fn settle_block(&mut self, hash: &Hash) -> Option<Effect> {
        let batch = self.batch.as_mut()?;
        if !batch.pending.remove(hash) || !batch.pending.is_empty() {
            return None;
        }
        let id = batch.id;
        self.batch = None;
        self.requests.finish(RequestKind::Blocks);
        debug!(peer = %self.id, batch = %id, "Batch delivered");
        Some(Effect::FinishBatch(id))
    }

    // =========================================================================
    // TIMERS
    // =========================================================================

    /// Liveness, request expiry and ping scheduling.
    pub fn tick(&mut self, now: Instant) -> Result<Vec<Effect>, PeerError> {
        let idle = now.saturating_duration_since(self.last_activity);
        if idle >= self.config.dead_after() {
            return Err(PeerError::Unresponsive(idle));
        }

        let mut effects = Vec::new();
        for kind in self.requests.expire(now) {
            match kind {
                RequestKind::Handshake => return Err(PeerError::HandshakeTimeout),
                RequestKind::Blocks => {
                    if let Some(batch) = self.batch.take() {
                        warn!(
                            peer = %self.id,
                            batch = %batch.id,
                            missing = batch.pending.len(),
                            "Block request timed out"
                        );
                        effects.push(Effect::FinishBatch(batch.id));
                    }
                }
                RequestKind::Headers => {
                    debug!(peer = %self.id, "getheaders timed out");
                }
                RequestKind::Transactions => {
                    debug!(
                        peer = %self.id,
                        missing = self.pending_txs.len(),
                        "Transaction request timed out"
                    );
                    self.pending_txs.clear();
                }
            }
        }

        if self.is_ready() && now >= self.next_ping_at {
            let nonce = rand::random();
            self.pending_ping = Some(PendingPing {
                nonce,
                sent_at: now,
            });
            self.next_ping_at = now + self.config.ping_interval;
            effects.push(Effect::Send(Message::Ping(nonce)));
        }
        Ok(effects)
    }

    // =========================================================================
    // OUTBOUND REQUESTS
    // =========================================================================

    /// Requests a block batch. Only one batch is in flight per peer.
    pub fn request_blocks(&mut self, id: BatchId, hashes: Vec<Hash>, now: Instant) -> Vec<Effect> {
        if !self.is_ready() || self.batch.is_some() {
            debug!(peer = %self.id, batch = %id, "Cannot take batch now");
            return vec![Effect::FinishBatch(id)];
        }
        if hashes.is_empty() {
            return vec![Effect::FinishBatch(id)];
        }
        debug!(peer = %self.id, batch = %id, count = hashes.len(), "Requesting blocks");
        let _ = self
            .requests
            .start(RequestKind::Blocks, self.config.request_timeout, now);
        let items: Vec<Inventory> = hashes.iter().copied().map(Inventory::witness_block).collect();
        self.batch = Some(InFlightBatch {
            id,
            pending: hashes.into_iter().collect(),
        });
        chunked(items, Message::GetData)
    }

    /// Sends `getheaders`. Returns the request's completion signal; a
    /// running request is shared rather than repeated.
    pub fn request_headers(
        &mut self,
        locator_hashes: Vec<Hash>,
        now: Instant,
    ) -> (Vec<Effect>, Option<watch::Receiver<RequestStatus>>) {
        if !self.is_ready() {
            return (Vec::new(), None);
        }
        let already_running = self.requests.running(RequestKind::Headers, now);
        let signal = self
            .requests
            .start(RequestKind::Headers, self.config.request_timeout, now);
        if already_running {
            return (Vec::new(), Some(signal));
        }
        let locator = BlockLocator {
            version: self.negotiated_version as u32,
            locator_hashes,
            stop_hash: [0u8; 32],
        };
        (
            vec![Effect::Send(Message::GetHeaders(locator))],
            Some(signal),
        )
    }

    /// Fetches announced transactions the mempool does not have yet.
    pub fn request_transactions(&mut self, txids: Vec<Hash>, now: Instant) -> Vec<Effect> {
        if !self.is_ready() {
            return Vec::new();
        }
        let fresh: Vec<Hash> = txids
            .into_iter()
            .filter(|txid| self.pending_txs.insert(*txid))
            .collect();
        if fresh.is_empty() {
            return Vec::new();
        }
        let _ = self
            .requests
            .start(RequestKind::Transactions, self.config.request_timeout, now);
        chunked(
            fresh.into_iter().map(Inventory::witness_tx).collect(),
            Message::GetData,
        )
    }

    // =========================================================================
    // RELAY
    // =========================================================================

    /// Announces transactions the peer has not heard about from us or from
    /// itself.
    pub fn announce_transactions(&mut self, txids: impl IntoIterator<Item = Hash>) -> Vec<Effect> {
        let relay = self.remote.as_ref().is_some_and(|remote| remote.relay);
        if !self.is_ready() || !relay {
            return Vec::new();
        }
        let items: Vec<Inventory> = txids
            .into_iter()
            .filter(|txid| self.remember(*txid))
            .map(Inventory::tx)
            .collect();
        chunked(items, Message::Inv)
    }

    pub fn broadcast_block(&mut self, hash: Hash) -> Vec<Effect> {
        if !self.is_ready() {
            return Vec::new();
        }
        debug!(peer = %self.id, hash = %DisplayHash(&hash), "Announcing block");
        vec![Effect::Send(Message::Inv(vec![Inventory::block(hash)]))]
    }

    /// Periodic diff against the mempool: forget ids that left the pool and
    /// announce the ones this peer has not been told about.
    pub fn reconcile_mempool(&mut self, snapshot: &[Hash]) -> Vec<Effect> {
        let current: HashSet<&Hash> = snapshot.iter().collect();
        self.announced.retain(|txid| current.contains(txid));
        let announced = &self.announced;
        self.announced_order.retain(|txid| announced.contains(txid));
        self.announce_transactions(snapshot.iter().copied())
    }

    /// Records `txid` as known to the remote, dropping the oldest record
    /// past `max_announced`. `false` if it was already recorded.
    fn remember(&mut self, txid: Hash) -> bool {
        if !self.announced.insert(txid) {
            return false;
        }
        self.announced_order.push_back(txid);
        while self.announced.len() > self.config.max_announced {
            match self.announced_order.pop_front() {
                Some(oldest) => {
                    self.announced.remove(&oldest);
                }
                None => break,
            }
        }
        true
    }
}

/// Splits inventory into messages of at most `MAX_INV_ENTRIES` items.
fn chunked(items: Vec<Inventory>, wrap: fn(Vec<Inventory>) -> Message) -> Vec<Effect> {
    items
        .chunks(MAX_INV_ENTRIES as usize)
        .map(|chunk| Effect::Send(wrap(chunk.to_vec())))
        .collect()
}
