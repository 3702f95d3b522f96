//! # Mempool Relay
//!
//! Announcements register ids, `getdata` fetches payloads, the first
//! payload publishes one `MempoolUpdated`. Between two nodes the periodic
//! reconcile carries wallet transactions across.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use node_runtime::adapters::InMemoryWallet;
    use node_runtime::Collaborators;
    use ps_01_wire_codec::{Inventory, Message};
    use ps_02_peer_connection::Direction;
    use ps_04_mempool::MempoolApi;
    use shared_bus::{EventFilter, EventTopic, SyncEvent};
    use shared_types::Hash;
    use tokio::io::duplex;
    use tokio::time::timeout;

    use crate::harness::*;

    fn fetches(message: &Message, txid: Hash) -> bool {
        matches!(message, Message::GetData(items) if items.iter().any(|item| item.hash == txid))
    }

    #[tokio::test]
    async fn test_announced_transaction_is_fetched_and_published_once() {
        let node = start_node(Collaborators::in_memory(CHAIN)).await;
        let mempool = node.container().mempool.clone();
        let mut events = node
            .container()
            .bus
            .subscribe(EventFilter::topics(vec![EventTopic::Mempool]));
        let tx = spend(0xAA);
        let txid = tx.txid;

        let mut remote = RemotePeer::attach(node.peers(), addr(5)).await;
        remote.handshake().await;
        remote.send(Message::Inv(vec![Inventory::witness_tx(txid)])).await;

        let Message::GetData(items) = remote.expect(|m| fetches(m, txid)).await else {
            unreachable!()
        };
        assert_eq!(items.len(), 1);
        // Id is known before the payload.
        until(|| mempool.dump().contains(&txid)).await;
        assert!(mempool.query(&txid).is_none());

        remote.send(Message::Tx(tx.clone())).await;
        remote.send(Message::Tx(tx.clone())).await;
        remote.sync(1).await;

        // Receipt does not wait for the mempool.
        until(|| mempool.query(&txid).is_some()).await;
        assert_eq!(mempool.query(&txid).as_deref(), Some(&tx));
        match timeout(WAIT, events.recv()).await.expect("event published") {
            Some(SyncEvent::MempoolUpdated { chain, txid: seen }) => {
                assert_eq!(chain, CHAIN);
                assert_eq!(seen, txid);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(events.try_recv(), Ok(None)));

        // Re-announcing a held transaction fetches nothing.
        remote.send(Message::Inv(vec![Inventory::witness_tx(txid)])).await;
        assert!(remote
            .within(Duration::from_millis(300), |m| fetches(m, txid))
            .await
            .is_none());

        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_mempool_request_is_answered_with_inventory() {
        let wallet = Arc::new(InMemoryWallet::new());
        let tx = spend(0x10);
        wallet.add_unconfirmed(tx.clone());
        let mut collaborators = Collaborators::in_memory(CHAIN);
        collaborators.wallet = wallet.clone();
        collaborators.loader = wallet;

        let node = start_node(collaborators).await;
        let mut remote = RemotePeer::attach(node.peers(), addr(6)).await;
        remote.handshake().await;

        remote.send(Message::Mempool).await;
        let Message::Inv(items) = remote
            .expect(|m| matches!(m, Message::Inv(items) if items.iter().any(|i| i.hash == tx.txid)))
            .await
        else {
            unreachable!()
        };
        assert!(items.iter().all(|item| item.inv_type.is_tx()));

        remote
            .send(Message::GetData(vec![Inventory::witness_tx(tx.txid)]))
            .await;
        let served = remote.expect(|m| matches!(m, Message::Tx(_))).await;
        assert!(matches!(served, Message::Tx(got) if got == tx));

        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_wallet_transaction_reaches_second_node() {
        let wallet = Arc::new(InMemoryWallet::new());
        let tx = spend(0x20);
        wallet.add_unconfirmed(tx.clone());
        let mut collaborators = Collaborators::in_memory(CHAIN);
        collaborators.wallet = wallet.clone();
        collaborators.loader = wallet;

        let a = start_node(collaborators).await;
        let b = start_node(Collaborators::in_memory(CHAIN)).await;
        let (left, right) = duplex(1 << 20);
        a.peers()
            .attach(left, addr(20), Direction::Outbound)
            .await
            .unwrap();
        b.peers()
            .attach(right, addr(10), Direction::Inbound)
            .await
            .unwrap();
        until(|| a.peers().ready_count() == 1 && b.peers().ready_count() == 1).await;

        let received = b.container().mempool.clone();
        until(|| received.query(&tx.txid).is_some()).await;
        assert_eq!(received.query(&tx.txid).as_deref(), Some(&tx));

        a.shutdown().await;
        b.shutdown().await;
    }
}
