//! Periodic work: heartbeats, mempool reconciliation, metric gauges.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use ps_03_block_oracle::{BlockOracle, BlockOracleApi};
use ps_04_mempool::{Mempool, MempoolApi};

use crate::wiring::PeerManager;

pub struct Scheduler {
    oracle: BlockOracle,
    mempool: Mempool,
    peers: PeerManager,
    heartbeat_interval: Duration,
    reconcile_interval: Duration,
}

impl Scheduler {
    pub fn new(
        oracle: BlockOracle,
        mempool: Mempool,
        peers: PeerManager,
        heartbeat_interval: Duration,
        reconcile_interval: Duration,
    ) -> Self {
        Self {
            oracle,
            mempool,
            peers,
            heartbeat_interval,
            reconcile_interval,
        }
    }

    /// Runs until `shutdown` flips.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut heartbeat = interval(self.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reconcile = interval(self.reconcile_interval);
        reconcile.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Both fire immediately on the first poll.
        heartbeat.tick().await;
        reconcile.tick().await;

        info!(
            heartbeat = ?self.heartbeat_interval,
            reconcile = ?self.reconcile_interval,
            "Scheduler started"
        );
        loop {
            tokio::select! {
                _ = heartbeat.tick() => self.heartbeat().await,
                _ = reconcile.tick() => {
                    let peers = self.reconcile();
                    debug!(peers, "Mempool reconciled");
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("Scheduler stopped");
    }

    /// One oracle and mempool heartbeat, then a metrics refresh.
    pub async fn heartbeat(&self) {
        self.oracle.heartbeat().await;
        self.mempool.heartbeat().await;
        self.record_metrics();
    }

    /// Offers the current mempool ids to every ready peer.
    pub fn reconcile(&self) -> usize {
        let snapshot = self.mempool.dump();
        if snapshot.is_empty() {
            return 0;
        }
        self.peers.reconcile(Arc::new(snapshot))
    }

    fn record_metrics(&self) {
        let oracle = self.oracle.stats();
        ps_telemetry::DOWNLOAD_QUEUE.set(oracle.download_queue as i64);
        ps_telemetry::RESIDENT_BLOCKS.set(oracle.resident as i64);

        let mempool = self.mempool.stats();
        ps_telemetry::MEMPOOL_IDS.set(mempool.ids as i64);
        ps_telemetry::MEMPOOL_ACTIVE.set(mempool.active as i64);
    }
}
