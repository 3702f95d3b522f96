//! # Subsystem Wiring
//!
//! Connects the subsystems at runtime.
//!
//! ```text
//!                 ┌───────────────────────────────┐
//!                 │           EVENT BUS           │
//!                 └──┬─────────────▲──────────▲───┘
//!   QueueDepthChanged│ PeerConnected│          │ BlockDownloaded
//!                    ▼             │          │ MempoolUpdated
//!             ┌────────────┐  ┌────┴─────┐  ┌─┴──────────────┐
//!             │EventRouter │─►│  Peer    │  │ BlockOracle    │
//!             └────────────┘  │ Manager  │  │ Mempool        │
//!                             └────▲─────┘  └─▲──────────────┘
//!                                  │ reconcile │ heartbeat
//!                             ┌────┴───────────┴┐
//!                             │    Scheduler    │
//!                             └─────────────────┘
//! ```

pub mod event_routing;
pub mod peer_manager;
pub mod scheduler;

pub use event_routing::EventRouter;
pub use peer_manager::{ManagerConfig, ManagerError, PeerManager};
pub use scheduler::Scheduler;
