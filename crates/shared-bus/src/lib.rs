//! # Shared Bus - Sync Notifications
//!
//! The block oracle, the mempool and the peer manager publish their
//! notifications here; wallet and statistics layers subscribe.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │ Block Oracle │    publish()       │   Wallet /   │
//! │   Mempool    │ ──────┐            │  Statistics  │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐           │
//!                  │  Event Bus   │ ──────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! Events also have a tagged multi-frame encoding (frame 0 = tag) for
//! consumers outside the process, see [`SyncEvent::to_frames`].

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{EventFilter, EventTopic, FrameError, SyncEvent};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{EventStream, Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        assert_eq!(DEFAULT_CHANNEL_CAPACITY, 1000);
    }
}
