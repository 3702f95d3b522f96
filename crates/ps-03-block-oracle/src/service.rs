//! # Block Oracle Service
//!
//! A single-consumer actor owns every mutation of the [`BlockCache`];
//! [`BlockOracle`] is the cloneable handle. Reads (`query`,
//! `download_queue`) take the cache's shared lock directly and never go
//! through the actor.
//!
//! The lock is only held for synchronous cache calls. Collaborator calls
//! (database, header oracle, event bus) happen with the lock released, so
//! no lock is ever held across an await.

use crate::domain::{
    BlockCache, BlockWaiter, DeliveryRatePolicy, OracleConfig, PeerStats, PeerTargetPolicy,
    Resolution,
};
use crate::errors::OracleError;
use crate::ports::{BlockDatabase, BlockOracleApi, HeaderOracle, Validator};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use ps_01_wire_codec::WireCodec;
use shared_bus::{EventPublisher, SyncEvent};
use shared_types::{BatchId, Block, Chain, DisplayHash, Hash, PeerId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Collaborators of the oracle actor.
#[derive(Clone)]
pub struct OraclePorts {
    pub headers: Arc<dyn HeaderOracle>,
    pub database: Arc<dyn BlockDatabase>,
    pub validator: Arc<dyn Validator>,
    pub events: Arc<dyn EventPublisher>,
}

/// Point-in-time counters for metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OracleStats {
    pub download_queue: usize,
    pub unassigned: usize,
    pub resident: usize,
    pub batches_in_flight: usize,
}

enum OracleCommand {
    Load {
        hashes: Vec<Hash>,
        reply: oneshot::Sender<Vec<BlockWaiter>>,
    },
    GetBatch {
        peer: PeerId,
        reply: oneshot::Sender<Option<(BatchId, Vec<Hash>)>>,
    },
    FinishBatch(BatchId),
    ForgetPeer(PeerId),
    Received {
        peer: Option<PeerId>,
        block: Block,
    },
    Heartbeat(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to the block oracle actor of one chain.
#[derive(Clone)]
pub struct BlockOracle {
    chain: Chain,
    commands: mpsc::Sender<OracleCommand>,
    cache: Arc<RwLock<BlockCache>>,
    codec: Arc<dyn WireCodec>,
    validator: Arc<dyn Validator>,
}

impl BlockOracle {
    /// Starts the actor with the delivery-rate batch policy.
    pub fn spawn(
        config: OracleConfig,
        codec: Arc<dyn WireCodec>,
        ports: OraclePorts,
    ) -> (Self, JoinHandle<()>) {
        let policy = DeliveryRatePolicy::new(config.default_batch, config.max_batch);
        Self::spawn_with_policy(config, Box::new(policy), codec, ports)
    }

    pub fn spawn_with_policy(
        config: OracleConfig,
        policy: Box<dyn PeerTargetPolicy>,
        codec: Arc<dyn WireCodec>,
        ports: OraclePorts,
    ) -> (Self, JoinHandle<()>) {
        let chain = codec.chain();
        let (commands, receiver) = mpsc::channel(config.command_buffer);
        let cache = Arc::new(RwLock::new(BlockCache::new(config, policy)));
        let validator = Arc::clone(&ports.validator);

        let actor = OracleActor {
            chain,
            cache: Arc::clone(&cache),
            ports,
            receiver,
            last_depth: 0,
        };
        let task = tokio::spawn(actor.run());

        let handle = Self {
            chain,
            commands,
            cache,
            codec,
            validator,
        };
        (handle, task)
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn stats(&self) -> OracleStats {
        let cache = self.cache.read();
        OracleStats {
            download_queue: cache.download_queue(),
            unassigned: cache.unassigned(),
            resident: cache.resident_len(),
            batches_in_flight: cache.batches_in_flight(),
        }
    }

    /// Delivery history kept for `peer`.
    pub fn peer_stats(&self, peer: PeerId) -> Option<PeerStats> {
        self.cache.read().peer_stats(peer).cloned()
    }

    /// Decodes and validates off the async runtime, then hands the block
    /// to the actor.
    fn accept_off_thread<F>(&self, peer: Option<PeerId>, work: F)
    where
        F: FnOnce(&dyn WireCodec, &dyn Validator) -> Result<Block, OracleError> + Send + 'static,
    {
        let codec = Arc::clone(&self.codec);
        let validator = Arc::clone(&self.validator);
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let checked =
                tokio::task::spawn_blocking(move || work(codec.as_ref(), validator.as_ref())).await;
            match checked {
                Ok(Ok(block)) => {
                    if commands
                        .send(OracleCommand::Received { peer, block })
                        .await
                        .is_err()
                    {
                        debug!("Block arrived after shutdown");
                    }
                }
                Ok(Err(err)) => warn!(?peer, error = %err, "Dropping block"),
                Err(err) => error!(error = %err, "Block check task failed"),
            }
        });
    }
}

#[async_trait]
impl BlockOracleApi for BlockOracle {
    async fn load_bitcoin(&self, hash: Hash) -> Option<Arc<Block>> {
        let waiter = self.load_bitcoin_many(vec![hash]).await.into_iter().next()?;
        waiter.wait().await
    }

    async fn load_bitcoin_many(&self, hashes: Vec<Hash>) -> Vec<BlockWaiter> {
        let (reply, response) = oneshot::channel();
        let fallback: Vec<BlockWaiter> = hashes
            .iter()
            .map(|hash| BlockWaiter::done(*hash, None))
            .collect();
        if self
            .commands
            .send(OracleCommand::Load { hashes, reply })
            .await
            .is_err()
        {
            return fallback;
        }
        response.await.unwrap_or(fallback)
    }

    async fn load_bitcoin_timeout(&self, hash: Hash, timeout: Duration) -> Option<Arc<Block>> {
        tokio::time::timeout(timeout, self.load_bitcoin(hash))
            .await
            .ok()
            .flatten()
    }

    async fn get_block_batch(&self, peer: PeerId) -> Option<(BatchId, Vec<Hash>)> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(OracleCommand::GetBatch { peer, reply })
            .await
            .ok()?;
        response.await.ok().flatten()
    }

    async fn finish_batch(&self, batch: BatchId) {
        if self
            .commands
            .send(OracleCommand::FinishBatch(batch))
            .await
            .is_err()
        {
            debug!(%batch, "Batch finished after shutdown");
        }
    }

    async fn forget_peer(&self, peer: PeerId) {
        let _ = self.commands.send(OracleCommand::ForgetPeer(peer)).await;
    }

    fn submit_block(&self, peer: Option<PeerId>, raw: Bytes) {
        self.accept_off_thread(peer, move |codec, validator| {
            let block = codec.decode_block(&raw)?;
            validator.validate(&block)?;
            Ok(block)
        });
    }

    fn receive_block(&self, peer: Option<PeerId>, block: Block) {
        self.accept_off_thread(peer, move |_, validator| {
            validator.validate(&block)?;
            Ok(block)
        });
    }

    fn download_queue(&self) -> usize {
        self.cache.read().download_queue()
    }

    fn query(&self, hash: &Hash) -> Option<Arc<Block>> {
        self.cache.read().resident(hash)
    }

    async fn heartbeat(&self) {
        let (reply, response) = oneshot::channel();
        if self.commands.send(OracleCommand::Heartbeat(reply)).await.is_ok() {
            let _ = response.await;
        }
    }

    async fn shutdown(&self) {
        let (reply, response) = oneshot::channel();
        if self.commands.send(OracleCommand::Shutdown(reply)).await.is_ok() {
            let _ = response.await;
        }
    }
}

struct OracleActor {
    chain: Chain,
    cache: Arc<RwLock<BlockCache>>,
    ports: OraclePorts,
    receiver: mpsc::Receiver<OracleCommand>,
    last_depth: usize,
}

impl OracleActor {
    async fn run(mut self) {
        match self.ports.database.load_tip().await {
            Some((height, hash)) => {
                info!(chain = %self.chain, height, tip = %DisplayHash(&hash), "Block oracle started")
            }
            None => info!(chain = %self.chain, "Block oracle started without persisted tip"),
        }

        while let Some(command) = self.receiver.recv().await {
            match command {
                OracleCommand::Load { hashes, reply } => {
                    let waiters = self.load(hashes).await;
                    let _ = reply.send(waiters);
                }
                OracleCommand::GetBatch { peer, reply } => {
                    let batch = self.cache.write().allocate(peer, Instant::now());
                    let _ = reply.send(batch);
                }
                OracleCommand::FinishBatch(batch) => {
                    let finished = self.cache.write().finish_batch(batch);
                    if let Some(finished) = finished {
                        debug!(
                            peer = %finished.peer,
                            %batch,
                            delivered = finished.delivered,
                            requeued = finished.requeued,
                            abandoned = finished.abandoned.len(),
                            "Batch finished"
                        );
                        if !finished.abandoned.is_empty() {
                            self.publish_depth(false).await;
                        }
                    }
                }
                OracleCommand::ForgetPeer(peer) => {
                    if self.cache.write().forget_peer(peer) {
                        debug!(%peer, "Dropped peer delivery history");
                    }
                }
                OracleCommand::Received { peer, block } => self.received(peer, block).await,
                OracleCommand::Heartbeat(reply) => {
                    self.heartbeat().await;
                    let _ = reply.send(());
                }
                OracleCommand::Shutdown(reply) => {
                    self.shutdown().await;
                    let _ = reply.send(());
                    return;
                }
            }
        }
        self.shutdown().await;
    }

    async fn load(&mut self, hashes: Vec<Hash>) -> Vec<BlockWaiter> {
        let now = Instant::now();
        let mut waiters = Vec::with_capacity(hashes.len());

        for hash in hashes {
            let known = self.cache.read().lookup(&hash);
            if let Some(waiter) = known {
                waiters.push(waiter);
                continue;
            }

            if let Some(block) = self.ports.database.load_block(&hash).await {
                let block = Arc::new(block);
                let overflow = self.cache.write().index(hash, Arc::clone(&block), true);
                self.persist(overflow).await;
                waiters.push(BlockWaiter::done(hash, Some(block)));
                continue;
            }

            let waiter = self.cache.write().enqueue(hash, now);
            waiters.push(waiter);
        }
        self.publish_depth(false).await;
        waiters
    }

    async fn received(&mut self, peer: Option<PeerId>, block: Block) {
        let hash = block.block_hash();
        let block = Arc::new(block);
        let resolution = self.cache.write().resolve(&hash, &block);

        match resolution {
            Resolution::Resolved { waiters } => {
                debug!(?peer, hash = %DisplayHash(&hash), waiters, "Block resolved");
                self.index(hash, block).await;
            }
            Resolution::Duplicate => {
                debug!(?peer, hash = %DisplayHash(&hash), "Discarding duplicate block");
            }
            Resolution::Unsolicited => {
                if self.ports.headers.is_valid(&hash).await {
                    debug!(?peer, hash = %DisplayHash(&hash), "Indexing unsolicited block");
                    self.index(hash, block).await;
                } else {
                    debug!(?peer, hash = %DisplayHash(&hash), "Dropping block off the header chain");
                }
            }
        }
    }

    async fn index(&mut self, hash: Hash, block: Arc<Block>) {
        let overflow = self.cache.write().index(hash, block, false);
        self.persist(overflow).await;
        self.ports
            .events
            .publish(SyncEvent::BlockDownloaded {
                chain: self.chain,
                hash,
            })
            .await;
        self.publish_depth(false).await;
    }

    async fn persist(&self, overflow: Vec<Arc<Block>>) {
        for block in overflow {
            if !self.ports.database.store_block(&block).await {
                warn!(hash = %DisplayHash(&block.block_hash()), "Failed to persist evicted block");
            }
        }
    }

    async fn heartbeat(&mut self) {
        let expiry = self.cache.write().expire(Instant::now());
        if !expiry.abandoned.is_empty() {
            info!(
                chain = %self.chain,
                abandoned = expiry.abandoned.len(),
                "Gave up on blocks"
            );
        }
        self.publish_depth(true).await;
    }

    async fn shutdown(&mut self) {
        let dropped = self.cache.write().shutdown();
        info!(chain = %self.chain, dropped, "Block oracle stopped");
        self.publish_depth(false).await;
    }

    async fn publish_depth(&mut self, force: bool) {
        let depth = self.cache.read().download_queue();
        if !force && depth == self.last_depth {
            return;
        }
        self.last_depth = depth;
        self.ports
            .events
            .publish(SyncEvent::QueueDepthChanged {
                chain: self.chain,
                depth: depth as u64,
            })
            .await;
    }
}

#[cfg(test)]
mod tests;
