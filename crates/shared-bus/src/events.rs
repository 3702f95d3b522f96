//! # Sync Events
//!
//! Notifications emitted by the sync subsystems and their tagged frame
//! encoding.

use serde::{Deserialize, Serialize};
use shared_types::{Chain, Hash, PeerId};
use thiserror::Error;

/// All events that can be published to the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncEvent {
    /// A requested or accepted block has been decoded and cached.
    BlockDownloaded { chain: Chain, hash: Hash },

    /// Number of not-yet-satisfied block requests changed.
    QueueDepthChanged { chain: Chain, depth: u64 },

    /// The full payload of a transaction arrived for the first time.
    MempoolUpdated { chain: Chain, txid: Hash },

    /// A peer completed its handshake.
    PeerConnected { chain: Chain, peer: PeerId },

    /// A peer connection was closed or banned.
    PeerDisconnected { chain: Chain, peer: PeerId },
}

impl SyncEvent {
    /// Frame 0 of the tagged encoding.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::BlockDownloaded { .. } => "block_downloaded",
            Self::QueueDepthChanged { .. } => "queue_depth",
            Self::MempoolUpdated { .. } => "mempool_updated",
            Self::PeerConnected { .. } => "peer_connected",
            Self::PeerDisconnected { .. } => "peer_disconnected",
        }
    }

    /// Topic for filtering.
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::BlockDownloaded { .. } | Self::QueueDepthChanged { .. } => {
                EventTopic::BlockOracle
            }
            Self::MempoolUpdated { .. } => EventTopic::Mempool,
            Self::PeerConnected { .. } | Self::PeerDisconnected { .. } => EventTopic::Peers,
        }
    }

    /// The chain the event belongs to.
    #[must_use]
    pub fn chain(&self) -> Chain {
        match self {
            Self::BlockDownloaded { chain, .. }
            | Self::QueueDepthChanged { chain, .. }
            | Self::MempoolUpdated { chain, .. }
            | Self::PeerConnected { chain, .. }
            | Self::PeerDisconnected { chain, .. } => *chain,
        }
    }

    /// Encodes the event as tagged frames: `[tag, chain, payload]`.
    ///
    /// Hashes travel as 32 raw bytes, depth and peer ids as u64 LE.
    pub fn to_frames(&self) -> Vec<Vec<u8>> {
        let tag = self.tag().as_bytes().to_vec();
        let chain = self.chain().name().as_bytes().to_vec();
        let payload = match self {
            Self::BlockDownloaded { hash, .. } => hash.to_vec(),
            Self::MempoolUpdated { txid, .. } => txid.to_vec(),
            Self::QueueDepthChanged { depth, .. } => depth.to_le_bytes().to_vec(),
            Self::PeerConnected { peer, .. } | Self::PeerDisconnected { peer, .. } => {
                peer.0.to_le_bytes().to_vec()
            }
        };
        vec![tag, chain, payload]
    }

    /// Decodes tagged frames produced by [`SyncEvent::to_frames`].
    pub fn from_frames(frames: &[Vec<u8>]) -> Result<Self, FrameError> {
        let [tag, chain, payload] = frames else {
            return Err(FrameError::FrameCount(frames.len()));
        };
        let tag = std::str::from_utf8(tag).map_err(|_| FrameError::UnknownTag(hexdump(tag)))?;
        let chain = std::str::from_utf8(chain)
            .ok()
            .and_then(|name| name.parse::<Chain>().ok())
            .ok_or_else(|| FrameError::UnknownChain(hexdump(chain)))?;

        let hash = || -> Result<Hash, FrameError> {
            payload
                .as_slice()
                .try_into()
                .map_err(|_| FrameError::PayloadLength {
                    expected: 32,
                    actual: payload.len(),
                })
        };
        let word = || -> Result<u64, FrameError> {
            let bytes: [u8; 8] =
                payload
                    .as_slice()
                    .try_into()
                    .map_err(|_| FrameError::PayloadLength {
                        expected: 8,
                        actual: payload.len(),
                    })?;
            Ok(u64::from_le_bytes(bytes))
        };

        match tag {
            "block_downloaded" => Ok(Self::BlockDownloaded {
                chain,
                hash: hash()?,
            }),
            "queue_depth" => Ok(Self::QueueDepthChanged {
                chain,
                depth: word()?,
            }),
            "mempool_updated" => Ok(Self::MempoolUpdated {
                chain,
                txid: hash()?,
            }),
            "peer_connected" => Ok(Self::PeerConnected {
                chain,
                peer: PeerId(word()?),
            }),
            "peer_disconnected" => Ok(Self::PeerDisconnected {
                chain,
                peer: PeerId(word()?),
            }),
            other => Err(FrameError::UnknownTag(other.to_owned())),
        }
    }
}

fn hexdump(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Errors decoding tagged frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("expected 3 frames, got {0}")]
    FrameCount(usize),

    #[error("unknown event tag: {0}")]
    UnknownTag(String),

    #[error("unknown chain frame: {0}")]
    UnknownChain(String),

    #[error("payload frame has {actual} bytes, expected {expected}")]
    PayloadLength { expected: usize, actual: usize },
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Download progress and queue depth.
    BlockOracle,
    /// Mempool payload arrivals.
    Mempool,
    /// Peer lifecycle.
    Peers,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Chains to include. Empty means all chains.
    pub chains: Vec<Chain>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            chains: Vec::new(),
        }
    }

    /// Restrict the filter to one chain.
    #[must_use]
    pub fn on_chain(mut self, chain: Chain) -> Self {
        self.chains.push(chain);
        self
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &SyncEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let chain_match = self.chains.is_empty() || self.chains.contains(&event.chain());

        topic_match && chain_match
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_topic_mapping() {
        let event = SyncEvent::QueueDepthChanged {
            chain: Chain::Bitcoin,
            depth: 3,
        };
        assert_eq!(event.topic(), EventTopic::BlockOracle);

        let event = SyncEvent::MempoolUpdated {
            chain: Chain::Bitcoin,
            txid: [0xAA; 32],
        };
        assert_eq!(event.topic(), EventTopic::Mempool);
    }

    #[test]
    fn test_mempool_frames_layout() {
        let event = SyncEvent::MempoolUpdated {
            chain: Chain::Bitcoin,
            txid: [0xAA; 32],
        };
        let frames = event.to_frames();
        assert_eq!(frames[0], b"mempool_updated".to_vec());
        assert_eq!(frames[1], b"bitcoin".to_vec());
        assert_eq!(frames[2], vec![0xAA; 32]);
        assert_eq!(SyncEvent::from_frames(&frames).unwrap(), event);
    }

    #[test]
    fn test_queue_depth_frame_is_le() {
        let event = SyncEvent::QueueDepthChanged {
            chain: Chain::Regtest,
            depth: 258,
        };
        let frames = event.to_frames();
        assert_eq!(frames[2], vec![2, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(SyncEvent::from_frames(&frames).unwrap(), event);
    }

    #[test]
    fn test_malformed_frames_rejected() {
        assert_eq!(
            SyncEvent::from_frames(&[b"queue_depth".to_vec()]),
            Err(FrameError::FrameCount(1))
        );
        let bad_tag = vec![b"nope".to_vec(), b"bitcoin".to_vec(), vec![]];
        assert!(matches!(
            SyncEvent::from_frames(&bad_tag),
            Err(FrameError::UnknownTag(_))
        ));
        let short = vec![b"block_downloaded".to_vec(), b"bitcoin".to_vec(), vec![1; 31]];
        assert_eq!(
            SyncEvent::from_frames(&short),
            Err(FrameError::PayloadLength {
                expected: 32,
                actual: 31
            })
        );
    }

    #[test]
    fn test_filter_by_chain() {
        let filter = EventFilter::topics(vec![EventTopic::Mempool]).on_chain(Chain::Testnet3);
        let on_test = SyncEvent::MempoolUpdated {
            chain: Chain::Testnet3,
            txid: [1; 32],
        };
        let on_main = SyncEvent::MempoolUpdated {
            chain: Chain::Bitcoin,
            txid: [1; 32],
        };
        assert!(filter.matches(&on_test));
        assert!(!filter.matches(&on_main));
        assert!(EventFilter::all().matches(&on_main));
    }

    #[test]
    fn test_event_json_names_variant() {
        let event = SyncEvent::PeerConnected {
            chain: Chain::Regtest,
            peer: PeerId(4),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.starts_with("{\"PeerConnected\""));
        let back: SyncEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
