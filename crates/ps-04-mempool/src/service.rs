//! # Mempool Service
//!
//! Actor wrapper around [`TransactionPool`]. One task applies every
//! submission and heartbeat in arrival order; readers share the pool's
//! lock. "Mempool updated" events go out in the order first payloads
//! arrive.

use crate::domain::{MempoolConfig, TransactionPool};
use crate::errors::MempoolError;
use crate::ports::{MempoolApi, TimeSource, TransactionLoader, WalletDatabase};
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_bus::{EventPublisher, SyncEvent};
use shared_types::{hash_to_hex, Chain, DisplayHash, Hash, Transaction};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

enum MempoolCommand {
    SubmitIds {
        txids: Vec<Hash>,
        reply: oneshot::Sender<Vec<bool>>,
    },
    SubmitTransactions {
        txs: Vec<Arc<Transaction>>,
        reply: oneshot::Sender<Vec<bool>>,
    },
    Heartbeat(oneshot::Sender<()>),
}

/// Pool sizes for metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MempoolStats {
    pub ids: usize,
    pub active: usize,
}

/// Handle to the mempool actor of one chain.
#[derive(Clone)]
pub struct Mempool {
    chain: Chain,
    commands: mpsc::Sender<MempoolCommand>,
    pool: Arc<RwLock<TransactionPool>>,
}

impl Mempool {
    pub fn spawn(
        chain: Chain,
        config: MempoolConfig,
        time: Arc<dyn TimeSource>,
        events: Arc<dyn EventPublisher>,
    ) -> (Self, JoinHandle<()>) {
        let (commands, receiver) = mpsc::channel(config.command_buffer);
        let pool = Arc::new(RwLock::new(TransactionPool::new(config)));
        let actor = MempoolActor {
            chain,
            pool: Arc::clone(&pool),
            time,
            events,
            receiver,
        };
        let task = tokio::spawn(actor.run());
        (
            Self {
                chain,
                commands,
                pool,
            },
            task,
        )
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn stats(&self) -> MempoolStats {
        let pool = self.pool.read();
        MempoolStats {
            ids: pool.len(),
            active: pool.active_len(),
        }
    }

    /// Ids from `txids` whose payload is not held.
    pub fn missing(&self, txids: &[Hash]) -> Vec<Hash> {
        self.pool.read().missing(txids)
    }

    /// Seeds the pool with the wallet's unconfirmed transactions. Ids the
    /// loader cannot materialise are logged and skipped.
    pub async fn initialize(
        &self,
        wallet: &dyn WalletDatabase,
        loader: &dyn TransactionLoader,
    ) -> Result<usize, MempoolError> {
        let txids = wallet.unconfirmed_transactions().await;
        let mut loaded = Vec::with_capacity(txids.len());
        for txid in &txids {
            match loader.load_transaction(txid).await {
                Some(tx) => loaded.push(tx),
                None => warn!(txid = %DisplayHash(txid), "Unconfirmed transaction not found"),
            }
        }

        let count = loaded.len();
        let txs = loaded.into_iter().map(Arc::new).collect();
        let (reply, response) = oneshot::channel();
        self.commands
            .send(MempoolCommand::SubmitTransactions { txs, reply })
            .await
            .map_err(|_| MempoolError::Shutdown)?;
        response.await.map_err(|_| MempoolError::Shutdown)?;

        info!(chain = %self.chain, seeded = count, wanted = txids.len(), "Mempool initialised");
        Ok(count)
    }

    /// Queues id registrations without waiting for the actor.
    pub fn post_ids(&self, txids: Vec<Hash>) {
        let (reply, _) = oneshot::channel();
        self.post(MempoolCommand::SubmitIds { txids, reply });
    }

    /// Queues a payload without waiting for the actor.
    pub fn post_transaction(&self, tx: Transaction) {
        let (reply, _) = oneshot::channel();
        let txs = vec![Arc::new(tx)];
        self.post(MempoolCommand::SubmitTransactions { txs, reply });
    }

    /// Falls back to a background send when the queue is full so that
    /// nothing is dropped.
    fn post(&self, command: MempoolCommand) {
        match self.commands.try_send(command) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(command)) => {
                let commands = self.commands.clone();
                tokio::spawn(async move {
                    let _ = commands.send(command).await;
                });
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(chain = %self.chain, "Submission after shutdown");
            }
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> MempoolCommand,
    ) -> Result<T, MempoolError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| MempoolError::Shutdown)?;
        response.await.map_err(|_| MempoolError::Shutdown)
    }
}

#[async_trait]
impl MempoolApi for Mempool {
    fn dump(&self) -> Vec<Hash> {
        self.pool.read().dump()
    }

    fn query(&self, txid: &Hash) -> Option<Arc<Transaction>> {
        self.pool.read().query(txid)
    }

    async fn submit_id(&self, txid: Hash) -> bool {
        self.submit_ids(vec![txid]).await.first().copied().unwrap_or(false)
    }

    async fn submit_ids(&self, txids: Vec<Hash>) -> Vec<bool> {
        let count = txids.len();
        self.request(|reply| MempoolCommand::SubmitIds { txids, reply })
            .await
            .unwrap_or_else(|_| vec![false; count])
    }

    async fn submit_transaction(&self, tx: Transaction) -> bool {
        self.submit_transactions(vec![tx])
            .await
            .first()
            .copied()
            .unwrap_or(false)
    }

    async fn submit_transactions(&self, txs: Vec<Transaction>) -> Vec<bool> {
        let count = txs.len();
        let txs = txs.into_iter().map(Arc::new).collect();
        self.request(|reply| MempoolCommand::SubmitTransactions { txs, reply })
            .await
            .unwrap_or_else(|_| vec![false; count])
    }

    async fn heartbeat(&self) {
        let _ = self.request(MempoolCommand::Heartbeat).await;
    }
}

struct MempoolActor {
    chain: Chain,
    pool: Arc<RwLock<TransactionPool>>,
    time: Arc<dyn TimeSource>,
    events: Arc<dyn EventPublisher>,
    receiver: mpsc::Receiver<MempoolCommand>,
}

impl MempoolActor {
    async fn run(mut self) {
        while let Some(command) = self.receiver.recv().await {
            match command {
                MempoolCommand::SubmitIds { txids, reply } => {
                    let now = self.time.now();
                    let fresh: Vec<bool> = {
                        let mut pool = self.pool.write();
                        txids
                            .into_iter()
                            .map(|txid| pool.submit_id(txid, now))
                            .collect()
                    };
                    let _ = reply.send(fresh);
                }
                MempoolCommand::SubmitTransactions { txs, reply } => {
                    let first = self.submit_transactions(txs).await;
                    let _ = reply.send(first);
                }
                MempoolCommand::Heartbeat(reply) => {
                    let now = self.time.now();
                    let eviction = self.pool.write().heartbeat(now);
                    if eviction.demoted + eviction.removed > 0 {
                        debug!(
                            chain = %self.chain,
                            demoted = eviction.demoted,
                            removed = eviction.removed,
                            "Mempool eviction"
                        );
                    }
                    let _ = reply.send(());
                }
            }
        }
        debug!(chain = %self.chain, "Mempool stopped");
    }

    async fn submit_transactions(&mut self, txs: Vec<Arc<Transaction>>) -> Vec<bool> {
        let now = self.time.now();
        let mut updated = Vec::new();
        let first: Vec<bool> = {
            let mut pool = self.pool.write();
            txs.into_iter()
                .map(|tx| {
                    if tx.inputs.is_empty() && tx.outputs.is_empty() {
                        let err = MempoolError::EmptyTransaction(hash_to_hex(&tx.txid));
                        error!(error = %err, "Rejected transaction");
                        debug_assert!(false, "{err}");
                        return false;
                    }
                    let txid = tx.txid;
                    let first = pool.submit_transaction(tx, now);
                    if first {
                        updated.push(txid);
                    }
                    first
                })
                .collect()
        };

        for txid in updated {
            debug!(chain = %self.chain, txid = %DisplayHash(&txid), "Mempool updated");
            self.events
                .publish(SyncEvent::MempoolUpdated {
                    chain: self.chain,
                    txid,
                })
                .await;
        }
        first
    }
}
