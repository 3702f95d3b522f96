//! # Block Download
//!
//! Consumers ask the oracle; the oracle hands batches to ready peers; the
//! remote answers `getdata` with blocks or `notfound`. A hash no peer can
//! deliver resolves empty once its retries are spent.

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use node_runtime::adapters::InMemoryBlockDatabase;
    use node_runtime::{Collaborators, NodeRuntime};
    use ps_01_wire_codec::{Inventory, Message};
    use ps_03_block_oracle::{BlockDatabase, BlockOracleApi};
    use shared_types::Hash;
    use tokio::time::timeout;

    use crate::harness::*;

    fn requests(message: &Message, hash: Hash) -> bool {
        matches!(message, Message::GetData(items) if items.iter().any(|item| item.hash == hash))
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_request() {
        let node = start_node(Collaborators::in_memory(CHAIN)).await;
        let oracle = node.container().oracle.clone();
        let wanted = block(1);
        let hash = wanted.block_hash();

        let mut remote = RemotePeer::attach(node.peers(), addr(2)).await;
        remote.handshake().await;

        let loads: Vec<_> = (0..5)
            .map(|_| {
                let oracle = oracle.clone();
                tokio::spawn(async move { oracle.load_bitcoin_timeout(hash, WAIT).await })
            })
            .collect();

        let Message::GetData(items) = remote.expect(|m| requests(m, hash)).await else {
            unreachable!()
        };
        assert_eq!(items.iter().filter(|item| item.hash == hash).count(), 1);
        remote.send(block_message(&wanted)).await;

        for load in loads {
            let delivered = load.await.unwrap().expect("block delivered");
            assert_eq!(*delivered, wanted);
        }
        assert!(remote
            .within(Duration::from_millis(300), |m| requests(m, hash))
            .await
            .is_none());
        assert_eq!(oracle.download_queue(), 0);

        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_partial_batch_requeues_the_rest() {
        let node = start_node(Collaborators::in_memory(CHAIN)).await;
        let oracle = node.container().oracle.clone();
        let (first, second) = (block(3), block(4));
        let (first_hash, second_hash) = (first.block_hash(), second.block_hash());

        let waiters = oracle
            .load_bitcoin_many(vec![first_hash, second_hash])
            .await;
        assert_eq!(oracle.download_queue(), 2);

        let mut remote = RemotePeer::attach(node.peers(), addr(3)).await;
        remote.handshake().await;

        let Message::GetData(items) = remote.expect(|m| requests(m, first_hash)).await else {
            unreachable!()
        };
        let asked: HashSet<Hash> = items.iter().map(|item| item.hash).collect();
        assert_eq!(asked, HashSet::from([first_hash, second_hash]));

        remote.send(block_message(&first)).await;
        until(|| oracle.query(&first_hash).is_some()).await;
        remote
            .send(Message::NotFound(vec![Inventory::witness_block(second_hash)]))
            .await;

        // Only the undelivered hash comes back.
        let Message::GetData(retry) = remote.expect(|m| requests(m, second_hash)).await else {
            unreachable!()
        };
        assert_eq!(retry.len(), 1);
        remote.send(block_message(&second)).await;

        for waiter in waiters {
            let delivered = timeout(WAIT, waiter.wait()).await.expect("waiter resolved");
            assert!(delivered.is_some());
        }
        assert_eq!(oracle.download_queue(), 0);

        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_block_nobody_has_resolves_empty() {
        let mut config = config();
        config.oracle.max_retries = 1;
        let node = NodeRuntime::start(config, Collaborators::in_memory(CHAIN))
            .await
            .expect("node starts");
        let oracle = node.container().oracle.clone();
        let hash = block(6).block_hash();

        let mut remote = RemotePeer::attach(node.peers(), addr(7)).await;
        remote.handshake().await;
        let load = {
            let oracle = oracle.clone();
            tokio::spawn(async move { oracle.load_bitcoin_timeout(hash, WAIT).await })
        };

        // One try plus one retry, both answered `notfound`.
        for _ in 0..2 {
            remote.expect(|m| requests(m, hash)).await;
            remote
                .send(Message::NotFound(vec![Inventory::witness_block(hash)]))
                .await;
        }

        assert!(load.await.unwrap().is_none());
        assert_eq!(oracle.download_queue(), 0);
        assert!(remote
            .within(Duration::from_millis(300), |m| requests(m, hash))
            .await
            .is_none());

        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_disconnect_drops_peer_history() {
        let node = start_node(Collaborators::in_memory(CHAIN)).await;
        let oracle = node.container().oracle.clone();
        let hash = block(8).block_hash();
        oracle.load_bitcoin_many(vec![hash]).await;

        let mut remote = RemotePeer::attach(node.peers(), addr(8)).await;
        let peer = remote.handle.id();
        remote.handshake().await;
        remote.expect(|m| requests(m, hash)).await;
        remote
            .send(Message::NotFound(vec![Inventory::witness_block(hash)]))
            .await;
        until(|| oracle.peer_stats(peer).is_some()).await;

        drop(remote);
        until(|| node.peers().is_empty()).await;
        until(|| oracle.peer_stats(peer).is_none()).await;

        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_persisted_block_skips_the_network() {
        let stored = block(5);
        let hash = stored.block_hash();
        let database: Arc<dyn BlockDatabase> = Arc::new(InMemoryBlockDatabase::new());
        assert!(database.store_block(&stored).await);

        let mut collaborators = Collaborators::in_memory(CHAIN);
        collaborators.database = database;
        let node = start_node(collaborators).await;
        let mut remote = RemotePeer::attach(node.peers(), addr(4)).await;
        remote.handshake().await;

        let oracle = node.container().oracle.clone();
        let loaded = oracle.load_bitcoin_timeout(hash, WAIT).await;
        assert_eq!(loaded.as_deref(), Some(&stored));
        assert!(remote
            .within(Duration::from_millis(300), |m| requests(m, hash))
            .await
            .is_none());

        // Now resident, so the node serves it.
        remote
            .send(Message::GetData(vec![Inventory::witness_block(hash)]))
            .await;
        let Message::Block(raw) = remote.expect(|m| matches!(m, Message::Block(_))).await else {
            unreachable!()
        };
        assert!(matches!(block_message(&stored), Message::Block(expected) if expected == raw));

        node.shutdown().await;
    }
}
