//! # Block Cache
//!
//! Pending block requests, the download queue, peer batches and the
//! resident decoded-block store. Pure state: no I/O, time is passed in.
//!
//! ## Request lifecycle
//!
//! ```text
//! enqueue ──► queued ──allocate──► assigned(batch) ──resolve──► resident
//!               ▲                      │
//!               └──finish_batch/expire─┘   (retries > max_retries → NotFound)
//! ```
//!
//! Every hash has at most one request, and every request at most one
//! owning batch. Callers asking for the same hash share the request's
//! completion signal.

use super::config::OracleConfig;
use super::policy::{PeerStats, PeerTargetPolicy};
use super::waiter::{BlockStatus, BlockWaiter};
use shared_types::{BatchId, Block, DisplayHash, Hash, PeerId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, warn};

#[derive(Debug)]
struct BlockRequest {
    signal: watch::Sender<BlockStatus>,
    enqueued_at: Instant,
    batch: Option<BatchId>,
    assigned_at: Option<Instant>,
    retries: u32,
}

/// Hashes handed to one peer in one allocation.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: BatchId,
    pub peer: PeerId,
    pub hashes: Vec<Hash>,
    outstanding: HashSet<Hash>,
    delivered: usize,
}

impl Batch {
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }
}

#[derive(Debug)]
struct Resident {
    block: Arc<Block>,
    persisted: bool,
}

/// What happened to an incoming block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Completed a pending request.
    Resolved { waiters: usize },
    /// Already resident; the later copy is discarded.
    Duplicate,
    /// Nobody asked for it.
    Unsolicited,
}

/// Result of returning a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedBatch {
    pub peer: PeerId,
    pub requested: usize,
    pub delivered: usize,
    pub requeued: usize,
    /// Undelivered and out of retries, resolved empty.
    pub abandoned: Vec<Hash>,
}

/// Result of a timeout sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Expiry {
    /// Taken back from their peer and moved to the front of the queue.
    pub requeued: Vec<Hash>,
    /// Out of retries, resolved empty.
    pub abandoned: Vec<Hash>,
}

impl Expiry {
    pub fn is_empty(&self) -> bool {
        self.requeued.is_empty() && self.abandoned.is_empty()
    }
}

pub struct BlockCache {
    config: OracleConfig,
    policy: Box<dyn PeerTargetPolicy>,
    requests: HashMap<Hash, BlockRequest>,
    /// Unassigned hashes, next to allocate at the front. May hold stale
    /// entries for resolved or already assigned hashes; those are skipped.
    queue: VecDeque<Hash>,
    batches: HashMap<BatchId, Batch>,
    next_batch: u64,
    resident: HashMap<Hash, Resident>,
    resident_order: VecDeque<Hash>,
    peers: HashMap<PeerId, PeerStats>,
}

impl BlockCache {
    pub fn new(config: OracleConfig, policy: Box<dyn PeerTargetPolicy>) -> Self {
        Self {
            config,
            policy,
            requests: HashMap::new(),
            queue: VecDeque::new(),
            batches: HashMap::new(),
            next_batch: 1,
            resident: HashMap::new(),
            resident_order: VecDeque::new(),
            peers: HashMap::new(),
        }
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub fn resident(&self, hash: &Hash) -> Option<Arc<Block>> {
        self.resident.get(hash).map(|entry| Arc::clone(&entry.block))
    }

    pub fn is_pending(&self, hash: &Hash) -> bool {
        self.requests.contains_key(hash)
    }

    /// Not-yet-satisfied requests, assigned or not.
    pub fn download_queue(&self) -> usize {
        self.requests.len()
    }

    /// Requests waiting for a peer.
    pub fn unassigned(&self) -> usize {
        self.requests
            .values()
            .filter(|request| request.batch.is_none())
            .count()
    }

    pub fn resident_len(&self) -> usize {
        self.resident.len()
    }

    pub fn batch(&self, id: BatchId) -> Option<&Batch> {
        self.batches.get(&id)
    }

    pub fn batches_in_flight(&self) -> usize {
        self.batches.len()
    }

    pub fn peer_stats(&self, peer: PeerId) -> Option<&PeerStats> {
        self.peers.get(&peer)
    }

    /// A waiter for `hash` if it is resident or already requested.
    pub fn lookup(&self, hash: &Hash) -> Option<BlockWaiter> {
        if let Some(block) = self.resident(hash) {
            return Some(BlockWaiter::done(*hash, Some(block)));
        }
        self.requests
            .get(hash)
            .map(|request| BlockWaiter::watching(*hash, request.signal.subscribe()))
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Requests `hash` from the network, or joins the running request.
    pub fn enqueue(&mut self, hash: Hash, now: Instant) -> BlockWaiter {
        if let Some(waiter) = self.lookup(&hash) {
            return waiter;
        }
        let (signal, receiver) = watch::channel(BlockStatus::Pending);
        self.requests.insert(
            hash,
            BlockRequest {
                signal,
                enqueued_at: now,
                batch: None,
                assigned_at: None,
                retries: 0,
            },
        );
        self.queue.push_back(hash);
        debug!(hash = %DisplayHash(&hash), queue = self.requests.len(), "Block queued");
        BlockWaiter::watching(hash, receiver)
    }

    /// Hands queued hashes to `peer`, sized by the target policy.
    pub fn allocate(&mut self, peer: PeerId, now: Instant) -> Option<(BatchId, Vec<Hash>)> {
        let target = self.policy.target(self.peers.get(&peer));
        let id = BatchId(self.next_batch);
        if self.batches.contains_key(&id) {
            error!(batch = %id, "Duplicate batch id");
            debug_assert!(false, "duplicate batch id {id}");
            return None;
        }

        let mut hashes = Vec::new();
        while hashes.len() < target {
            let Some(hash) = self.queue.pop_front() else {
                break;
            };
            let Some(request) = self.requests.get_mut(&hash) else {
                continue;
            };
            if request.batch.is_some() {
                continue;
            }
            request.batch = Some(id);
            request.assigned_at = Some(now);
            hashes.push(hash);
        }
        if hashes.is_empty() {
            return None;
        }

        self.next_batch += 1;
        debug!(%peer, batch = %id, count = hashes.len(), target, "Batch allocated");
        self.batches.insert(
            id,
            Batch {
                id,
                peer,
                outstanding: hashes.iter().copied().collect(),
                hashes: hashes.clone(),
                delivered: 0,
            },
        );
        Some((id, hashes))
    }

    /// Releases a batch. Undelivered hashes cost a retry and go back to the
    /// front of the queue in their original order, or resolve empty once
    /// their retries are spent.
    pub fn finish_batch(&mut self, id: BatchId) -> Option<FinishedBatch> {
        let Some(batch) = self.batches.remove(&id) else {
            debug!(batch = %id, "Finishing unknown batch");
            return None;
        };

        let mut requeued = 0;
        let mut abandoned = Vec::new();
        for hash in batch.hashes.iter().rev() {
            if !batch.outstanding.contains(hash) {
                continue;
            }
            let owned = self
                .requests
                .get(hash)
                .is_some_and(|request| request.batch == Some(id));
            if !owned {
                continue;
            }
            if self.give_back(*hash) {
                requeued += 1;
            } else {
                abandoned.push(*hash);
            }
        }
        abandoned.reverse();

        let requested = batch.hashes.len();
        self.peers
            .entry(batch.peer)
            .or_default()
            .record_batch(requested, batch.delivered);
        if requeued > 0 || !abandoned.is_empty() {
            debug!(
                peer = %batch.peer,
                batch = %id,
                requeued,
                abandoned = abandoned.len(),
                "Batch returned incomplete"
            );
        }
        Some(FinishedBatch {
            peer: batch.peer,
            requested,
            delivered: batch.delivered,
            requeued,
            abandoned,
        })
    }

    /// Unassigns `hash` and charges it a retry. Returns `false` when that
    /// exhausted its retries and it was resolved empty.
    fn give_back(&mut self, hash: Hash) -> bool {
        let Some(request) = self.requests.get_mut(&hash) else {
            return false;
        };
        if let Some(batch) = request.batch.take().and_then(|id| self.batches.get_mut(&id)) {
            batch.outstanding.remove(&hash);
        }
        request.assigned_at = None;
        request.retries += 1;

        if request.retries > self.config.max_retries {
            if let Some(request) = self.requests.remove(&hash) {
                request.signal.send_replace(BlockStatus::NotFound);
            }
            warn!(hash = %DisplayHash(&hash), "Block download abandoned after retries");
            false
        } else {
            self.queue.push_front(hash);
            true
        }
    }

    /// Drops the history kept for a disconnected peer.
    pub fn forget_peer(&mut self, peer: PeerId) -> bool {
        self.peers.remove(&peer).is_some()
    }

    /// Completes the request for `hash`, if any. The block is not indexed;
    /// see [`BlockCache::index`].
    pub fn resolve(&mut self, hash: &Hash, block: &Arc<Block>) -> Resolution {
        let Some(request) = self.requests.remove(hash) else {
            return if self.resident.contains_key(hash) {
                Resolution::Duplicate
            } else {
                Resolution::Unsolicited
            };
        };

        if let Some(batch) = request.batch.and_then(|id| self.batches.get_mut(&id)) {
            if batch.outstanding.remove(hash) {
                batch.delivered += 1;
            }
        }
        let waiters = request.signal.receiver_count();
        request.signal.send_replace(BlockStatus::Ready(Arc::clone(block)));
        Resolution::Resolved { waiters }
    }

    /// Makes a block resident. Returns blocks pushed out of memory that
    /// still need persisting.
    pub fn index(&mut self, hash: Hash, block: Arc<Block>, persisted: bool) -> Vec<Arc<Block>> {
        if self.resident.contains_key(&hash) {
            return Vec::new();
        }
        self.resident.insert(hash, Resident { block, persisted });
        self.resident_order.push_back(hash);

        let mut overflow = Vec::new();
        while self.resident.len() > self.config.cache_limit {
            let Some(oldest) = self.resident_order.pop_front() else {
                break;
            };
            if let Some(entry) = self.resident.remove(&oldest) {
                if !entry.persisted {
                    overflow.push(entry.block);
                }
            }
        }
        overflow
    }

    /// Takes back assignments older than the download timeout.
    pub fn expire(&mut self, now: Instant) -> Expiry {
        let timeout = self.config.download_timeout;
        let mut stalled: Vec<(Instant, Hash)> = self
            .requests
            .iter()
            .filter_map(|(hash, request)| {
                let assigned_at = request.assigned_at?;
                (now.saturating_duration_since(assigned_at) >= timeout)
                    .then_some((request.enqueued_at, *hash))
            })
            .collect();
        // Oldest request ends up at the very front.
        stalled.sort_by(|a, b| b.0.cmp(&a.0));

        let mut expiry = Expiry::default();
        for (_, hash) in stalled {
            if self.give_back(hash) {
                expiry.requeued.push(hash);
            } else {
                expiry.abandoned.push(hash);
            }
        }
        if !expiry.is_empty() {
            debug!(
                requeued = expiry.requeued.len(),
                abandoned = expiry.abandoned.len(),
                "Stalled downloads expired"
            );
        }
        expiry
    }

    /// Resolves every outstanding request empty and drops all state except
    /// the resident blocks.
    pub fn shutdown(&mut self) -> usize {
        let count = self.requests.len();
        for (_, request) in self.requests.drain() {
            request.signal.send_replace(BlockStatus::NotFound);
        }
        self.queue.clear();
        self.batches.clear();
        count
    }
}
