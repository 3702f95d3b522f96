//! Outstanding request tracking.
//!
//! At most one request per [`RequestKind`] is outstanding. Each carries a
//! start time and a completion signal other tasks may await. A request is
//! *running* until it is finished or its timeout elapses. Expired requests
//! are abandoned here; reassignment happens in the block oracle or the
//! mempool.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// version/verack exchange.
    Handshake,
    /// `getheaders`.
    Headers,
    /// `getdata` for a block batch.
    Blocks,
    /// `getdata` for announced transactions.
    Transactions,
}

/// Observable outcome of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Completed,
    TimedOut,
    /// Connection went away first.
    Abandoned,
}

#[derive(Debug)]
struct Request {
    started_at: Instant,
    timeout: Duration,
    signal: watch::Sender<RequestStatus>,
}

impl Request {
    fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started_at) >= self.timeout
    }
}

/// Per-connection table of outstanding requests.
#[derive(Debug, Default)]
pub struct RequestTracker {
    requests: HashMap<RequestKind, Request>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a request. If one of the same kind is still running, its
    /// signal is shared instead of starting another.
    pub fn start(
        &mut self,
        kind: RequestKind,
        timeout: Duration,
        now: Instant,
    ) -> watch::Receiver<RequestStatus> {
        if let Some(existing) = self.requests.get(&kind) {
            if !existing.expired(now) {
                return existing.signal.subscribe();
            }
        }
        let (signal, receiver) = watch::channel(RequestStatus::Pending);
        if let Some(stale) = self.requests.insert(
            kind,
            Request {
                started_at: now,
                timeout,
                signal,
            },
        ) {
            stale.signal.send_replace(RequestStatus::TimedOut);
        }
        receiver
    }

    /// False once resolved or once the timeout has elapsed.
    pub fn running(&self, kind: RequestKind, now: Instant) -> bool {
        self.requests
            .get(&kind)
            .is_some_and(|request| !request.expired(now))
    }

    /// Resolves a request. Returns false if none was outstanding.
    pub fn finish(&mut self, kind: RequestKind) -> bool {
        match self.requests.remove(&kind) {
            Some(request) => {
                request.signal.send_replace(RequestStatus::Completed);
                true
            }
            None => false,
        }
    }

    /// Removes and signals every expired request, returning their kinds.
    pub fn expire(&mut self, now: Instant) -> Vec<RequestKind> {
        let expired: Vec<RequestKind> = self
            .requests
            .iter()
            .filter(|(_, request)| request.expired(now))
            .map(|(kind, _)| *kind)
            .collect();
        for kind in &expired {
            if let Some(request) = self.requests.remove(kind) {
                request.signal.send_replace(RequestStatus::TimedOut);
            }
        }
        expired
    }

    /// Signals every outstanding request as abandoned.
    pub fn abandon_all(&mut self) {
        for (_, request) in self.requests.drain() {
            request.signal.send_replace(RequestStatus::Abandoned);
        }
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
