//! # Transaction Pool - Two-Tier Eviction
//!
//! Every known id is in exactly one of three states: absent, id-only, or
//! id with payload. Payload-carrying entries are a subset of all entries.
//!
//! ## Eviction queues
//!
//! - `payload_queue`: `(time, txid)` per payload arrival. Entries older
//!   than `tx_limit` lose their payload and stay id-only.
//! - `id_queue`: `(time, txid)` per first sighting. Entries older than
//!   `txid_limit` are removed, and so are the oldest entries whenever the
//!   pool holds more than `max_ids`.
//!
//! Both queues are appended in time order, so eviction pops from the front
//! until the first young entry. Queue items whose entry has since been
//! replaced are recognised by their timestamp and skipped.

use super::config::MempoolConfig;
use shared_types::{Hash, Transaction};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Milliseconds on a monotonic clock.
pub type Timestamp = u64;

#[derive(Debug, Clone)]
struct MempoolEntry {
    tx: Option<Arc<Transaction>>,
    first_seen: Timestamp,
    payload_at: Option<Timestamp>,
    /// Whether the first-payload notification already went out.
    notified: bool,
}

/// Counts from one heartbeat.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Eviction {
    /// Payloads cleared.
    pub demoted: usize,
    /// Entries removed.
    pub removed: usize,
}

#[derive(Debug)]
pub struct TransactionPool {
    config: MempoolConfig,
    entries: HashMap<Hash, MempoolEntry>,
    payload_queue: VecDeque<(Timestamp, Hash)>,
    id_queue: VecDeque<(Timestamp, Hash)>,
    active: usize,
}

impl TransactionPool {
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            payload_queue: VecDeque::new(),
            id_queue: VecDeque::new(),
            active: 0,
        }
    }

    pub fn config(&self) -> &MempoolConfig {
        &self.config
    }

    /// Every known id.
    pub fn dump(&self) -> Vec<Hash> {
        self.entries.keys().copied().collect()
    }

    pub fn query(&self, txid: &Hash) -> Option<Arc<Transaction>> {
        self.entries.get(txid)?.tx.clone()
    }

    pub fn contains(&self, txid: &Hash) -> bool {
        self.entries.contains_key(txid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries carrying a payload.
    pub fn active_len(&self) -> usize {
        self.active
    }

    /// Ids from `txids` whose payload is not held.
    pub fn missing(&self, txids: &[Hash]) -> Vec<Hash> {
        txids
            .iter()
            .filter(|txid| self.query(txid).is_none())
            .copied()
            .collect()
    }

    /// Registers an announced id. `false` if it was already known.
    pub fn submit_id(&mut self, txid: Hash, now: Timestamp) -> bool {
        if self.entries.contains_key(&txid) {
            return false;
        }
        self.entries.insert(
            txid,
            MempoolEntry {
                tx: None,
                first_seen: now,
                payload_at: None,
                notified: false,
            },
        );
        self.id_queue.push_back((now, txid));
        while self.entries.len() > self.config.max_ids {
            let Some((at, oldest)) = self.id_queue.pop_front() else {
                break;
            };
            self.remove_sighting(at, &oldest);
        }
        true
    }

    /// Inserts or upgrades an entry with its payload. Returns `true` only
    /// the first time a payload arrives for this id.
    pub fn submit_transaction(&mut self, tx: Arc<Transaction>, now: Timestamp) -> bool {
        let txid = tx.txid;
        self.submit_id(txid, now);
        let Some(entry) = self.entries.get_mut(&txid) else {
            return false;
        };
        if entry.tx.is_some() {
            return false;
        }

        entry.tx = Some(tx);
        entry.payload_at = Some(now);
        self.payload_queue.push_back((now, txid));
        self.active += 1;

        let first = !entry.notified;
        entry.notified = true;
        first
    }

    /// Clears payloads older than `tx_limit` and removes entries older than
    /// `txid_limit`.
    pub fn heartbeat(&mut self, now: Timestamp) -> Eviction {
        let mut eviction = Eviction::default();
        let tx_limit = millis(self.config.tx_limit);
        let txid_limit = millis(self.config.txid_limit);

        while let Some(&(at, txid)) = self.payload_queue.front() {
            if now.saturating_sub(at) < tx_limit {
                break;
            }
            self.payload_queue.pop_front();
            if let Some(entry) = self.entries.get_mut(&txid) {
                if entry.payload_at == Some(at) && entry.tx.take().is_some() {
                    entry.payload_at = None;
                    self.active -= 1;
                    eviction.demoted += 1;
                }
            }
        }

        while let Some(&(at, txid)) = self.id_queue.front() {
            if now.saturating_sub(at) < txid_limit {
                break;
            }
            self.id_queue.pop_front();
            if self.remove_sighting(at, &txid) {
                eviction.removed += 1;
            }
        }
        eviction
    }

    /// Removes `txid` if its entry is the one first seen at `at`.
    fn remove_sighting(&mut self, at: Timestamp, txid: &Hash) -> bool {
        let current = self
            .entries
            .get(txid)
            .is_some_and(|entry| entry.first_seen == at);
        if !current {
            return false;
        }
        match self.entries.remove(txid) {
            Some(entry) => {
                if entry.tx.is_some() {
                    self.active -= 1;
                }
                true
            }
            None => false,
        }
    }
}

fn millis(duration: Duration) -> Timestamp {
    duration.as_millis() as Timestamp
}
