//! # Subsystem Container
//!
//! Holds the subsystem instances of one chain and manages their lifecycle.
//!
//! ## Initialization Order
//!
//! ```text
//! Level 0: Event bus, wire codec
//! Level 1: Block oracle (header chain, block database, validator)
//! Level 1: Mempool (clock)
//! Level 2: Peer ports (adapters over Level 1)
//! ```
//!
//! Peer connections are created later by the peer manager, each with a
//! clone of [`SubsystemContainer::peer_ports`].

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use ps_01_wire_codec::BitcoinCodec;
use ps_02_peer_connection::PeerPorts;
use ps_03_block_oracle::{BlockDatabase, BlockOracle, BlockOracleApi, MerkleValidator, OraclePorts};
use ps_04_mempool::{Mempool, MonotonicTimeSource, TransactionLoader, WalletDatabase};
use shared_bus::InMemoryEventBus;
use shared_types::Chain;

use crate::adapters::{
    InMemoryBlockDatabase, InMemoryHeaderChain, InMemoryWallet, MempoolSink, OracleDownloader,
};
use crate::container::config::NodeConfig;

/// External collaborators consumed by the subsystems.
#[derive(Clone)]
pub struct Collaborators {
    pub header_chain: Arc<InMemoryHeaderChain>,
    pub database: Arc<dyn BlockDatabase>,
    pub wallet: Arc<dyn WalletDatabase>,
    pub loader: Arc<dyn TransactionLoader>,
}

impl Collaborators {
    /// Everything in memory, starting from `chain`'s genesis.
    pub fn in_memory(chain: Chain) -> Self {
        let wallet = Arc::new(InMemoryWallet::new());
        Self {
            header_chain: Arc::new(InMemoryHeaderChain::for_chain(chain)),
            database: Arc::new(InMemoryBlockDatabase::new()),
            wallet: wallet.clone(),
            loader: wallet,
        }
    }
}

/// The subsystems of one node.
pub struct SubsystemContainer {
    pub config: NodeConfig,
    pub bus: Arc<InMemoryEventBus>,
    pub codec: Arc<BitcoinCodec>,
    pub oracle: BlockOracle,
    pub mempool: Mempool,
    pub collaborators: Collaborators,
    oracle_task: JoinHandle<()>,
    mempool_task: JoinHandle<()>,
}

impl SubsystemContainer {
    /// Spawns the oracle and mempool actors. Must run inside a runtime.
    pub fn start(config: NodeConfig, collaborators: Collaborators) -> Self {
        let chain = config.network.chain;
        let bus = Arc::new(InMemoryEventBus::new());
        let codec = Arc::new(BitcoinCodec::new(chain));

        let (oracle, oracle_task) = BlockOracle::spawn(
            config.oracle.to_oracle_config(),
            codec.clone(),
            OraclePorts {
                headers: collaborators.header_chain.clone(),
                database: Arc::clone(&collaborators.database),
                validator: Arc::new(MerkleValidator),
                events: bus.clone(),
            },
        );

        let (mempool, mempool_task) = Mempool::spawn(
            chain,
            config.mempool.to_mempool_config(),
            Arc::new(MonotonicTimeSource::new()),
            bus.clone(),
        );

        info!(%chain, "Block oracle and mempool started");

        Self {
            config,
            bus,
            codec,
            oracle,
            mempool,
            collaborators,
            oracle_task,
            mempool_task,
        }
    }

    pub fn chain(&self) -> Chain {
        self.config.network.chain
    }

    /// What every connection of this node talks to.
    pub fn peer_ports(&self) -> PeerPorts {
        PeerPorts {
            chain: self.chain(),
            blocks: Arc::new(OracleDownloader::new(self.oracle.clone())),
            transactions: Arc::new(MempoolSink::new(self.mempool.clone())),
            headers: self.collaborators.header_chain.clone(),
            events: self.bus.clone(),
        }
    }

    /// Seeds the mempool from the wallet. Returns how many were loaded.
    pub async fn seed_mempool(&self) -> Result<usize, ps_04_mempool::MempoolError> {
        self.mempool
            .initialize(
                self.collaborators.wallet.as_ref(),
                self.collaborators.loader.as_ref(),
            )
            .await
    }

    /// Resolves pending block waiters empty and stops both actors.
    pub async fn shutdown(self) {
        let chain = self.chain();
        self.oracle.shutdown().await;
        let _ = self.oracle_task.await;
        self.mempool_task.abort();
        info!(%chain, "Subsystems stopped");
    }
}
