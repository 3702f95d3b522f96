//! Per-peer delivery statistics and batch sizing.
//!
//! How many hashes a peer receives at once is a pluggable decision. The
//! default scales with the peer's smoothed delivery rate so that peers
//! that time out get smaller batches and reliable peers get full ones.

/// Weight of the newest batch in the smoothed rate.
const RATE_SMOOTHING: f64 = 0.3;

/// Delivery history for one peer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PeerStats {
    /// Blocks delivered across all finished batches.
    pub delivered: u64,
    /// Hashes returned undelivered.
    pub failed: u64,
    /// Batches finished.
    pub batches: u64,
    /// Exponentially smoothed fraction of each batch delivered, `0.0..=1.0`.
    pub rate: f64,
}

impl PeerStats {
    /// Folds one finished batch into the history.
    pub fn record_batch(&mut self, requested: usize, delivered: usize) {
        if requested == 0 {
            return;
        }
        let sample = delivered as f64 / requested as f64;
        self.rate = if self.batches == 0 {
            sample
        } else {
            RATE_SMOOTHING * sample + (1.0 - RATE_SMOOTHING) * self.rate
        };
        self.batches += 1;
        self.delivered += delivered as u64;
        self.failed += (requested - delivered) as u64;
    }
}

/// Decides how many hashes a peer may have in flight.
pub trait PeerTargetPolicy: Send + Sync {
    /// `None` when the peer has no history yet.
    fn target(&self, stats: Option<&PeerStats>) -> usize;
}

/// Scales the batch with the smoothed delivery rate, within
/// `[1, max_batch]`.
#[derive(Clone, Debug)]
pub struct DeliveryRatePolicy {
    pub default_batch: usize,
    pub max_batch: usize,
}

impl DeliveryRatePolicy {
    pub fn new(default_batch: usize, max_batch: usize) -> Self {
        Self {
            default_batch,
            max_batch: max_batch.max(1),
        }
    }
}

impl PeerTargetPolicy for DeliveryRatePolicy {
    fn target(&self, stats: Option<&PeerStats>) -> usize {
        match stats {
            Some(stats) if stats.batches > 0 => {
                let scaled = (stats.rate * self.max_batch as f64).round() as usize;
                scaled.clamp(1, self.max_batch)
            }
            _ => self.default_batch.clamp(1, self.max_batch),
        }
    }
}
