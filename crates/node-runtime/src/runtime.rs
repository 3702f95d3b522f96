//! # Node Runtime
//!
//! ## Startup Sequence
//!
//! 1. Start the block oracle and mempool ([`SubsystemContainer`])
//! 2. Seed the mempool from the wallet
//! 3. Start the event router and the scheduler
//! 4. Listen for inbound peers (if configured)
//! 5. Dial configured peers
//!
//! Shutdown runs in reverse: stop accepting and scheduling, disconnect
//! peers, then stop the actors.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use shared_bus::EventFilter;

use crate::container::{Collaborators, NodeConfig, SubsystemContainer};
use crate::wiring::{EventRouter, ManagerConfig, PeerManager, Scheduler};

/// A running node.
pub struct NodeRuntime {
    container: SubsystemContainer,
    peers: PeerManager,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    listen_addr: Option<SocketAddr>,
}

impl NodeRuntime {
    /// Starts every subsystem. Must run inside a runtime.
    pub async fn start(config: NodeConfig, collaborators: Collaborators) -> Result<Self> {
        let network = config.network.clone();
        let peer_config = config.peer.to_peer_config();
        info!(
            chain = %network.chain,
            max_peers = network.max_peers,
            "Starting peer-sync node"
        );

        let container = SubsystemContainer::start(config, collaborators);
        let seeded = container
            .seed_mempool()
            .await
            .context("failed to seed mempool")?;
        info!(seeded, "Mempool seeded from wallet");

        let peers = PeerManager::new(
            ManagerConfig {
                max_peers: network.max_peers,
                ban_duration: network.ban_duration(),
            },
            peer_config,
            Arc::clone(&container.codec),
            container.peer_ports(),
            container.collaborators.header_chain.clone(),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        let router = EventRouter::new(
            peers.clone(),
            Arc::clone(&container.collaborators.header_chain),
        );
        let events = container.bus.subscribe(EventFilter::all());
        tasks.push(tokio::spawn(router.run(events, shutdown_rx.clone())));

        let scheduler = Scheduler::new(
            container.oracle.clone(),
            container.mempool.clone(),
            peers.clone(),
            network.heartbeat_interval(),
            network.reconcile_interval(),
        );
        tasks.push(tokio::spawn(scheduler.run(shutdown_rx.clone())));

        let mut listen_addr = None;
        if let Some(addr) = network.listen {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to listen on {addr}"))?;
            let bound = listener.local_addr().context("listener has no address")?;
            info!(addr = %bound, "Listening for peers");
            listen_addr = Some(bound);

            let acceptor = peers.clone();
            let shutdown = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                acceptor.accept_loop(listener, shutdown).await;
            }));
        }

        for addr in &network.connect {
            match peers.connect(*addr).await {
                Ok(handle) => info!(peer = %handle.id(), %addr, "Dialed peer"),
                Err(err) => warn!(%addr, error = %err, "Dial failed"),
            }
        }

        Ok(Self {
            container,
            peers,
            shutdown_tx,
            tasks,
            listen_addr,
        })
    }

    pub fn container(&self) -> &SubsystemContainer {
        &self.container
    }

    pub fn peers(&self) -> &PeerManager {
        &self.peers
    }

    /// Bound listening address, when listening.
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.listen_addr
    }

    /// Stops background tasks, disconnects peers and stops the actors.
    pub async fn shutdown(self) {
        info!("Initiating graceful shutdown...");
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        self.peers.shutdown().await;
        self.container.shutdown().await;
        info!("Shutdown complete");
    }
}
