//! Completion signals shared by every caller waiting on one hash.

use shared_types::{Block, Hash};
use std::sync::Arc;
use tokio::sync::watch;

/// Resolution state of a block request.
#[derive(Clone, Debug, Default)]
pub enum BlockStatus {
    #[default]
    Pending,
    Ready(Arc<Block>),
    /// Given up on: retries exhausted or the oracle shut down.
    NotFound,
}

impl BlockStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, BlockStatus::Pending)
    }
}

/// A caller's handle on one requested block.
#[derive(Debug)]
pub struct BlockWaiter {
    hash: Hash,
    inner: Inner,
}

#[derive(Debug)]
enum Inner {
    Done(Option<Arc<Block>>),
    Watching(watch::Receiver<BlockStatus>),
}

impl BlockWaiter {
    /// Already resolved, e.g. served from the resident cache.
    pub fn done(hash: Hash, block: Option<Arc<Block>>) -> Self {
        Self {
            hash,
            inner: Inner::Done(block),
        }
    }

    pub fn watching(hash: Hash, receiver: watch::Receiver<BlockStatus>) -> Self {
        Self {
            hash,
            inner: Inner::Watching(receiver),
        }
    }

    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    /// Waits for the block. `None` when it was not found or the oracle
    /// went away.
    pub async fn wait(self) -> Option<Arc<Block>> {
        match self.inner {
            Inner::Done(block) => block,
            Inner::Watching(mut receiver) => {
                let status = receiver
                    .wait_for(|status| !status.is_pending())
                    .await
                    .ok()?
                    .clone();
                match status {
                    BlockStatus::Ready(block) => Some(block),
                    BlockStatus::Pending | BlockStatus::NotFound => None,
                }
            }
        }
    }
}
