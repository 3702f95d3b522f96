//! # Malformed Frames
//!
//! Bad checksums, foreign magic, oversized length fields and transactions
//! with neither inputs nor outputs end the connection before anything
//! reaches the oracle or the mempool. None of them gets the address banned.

#[cfg(test)]
mod tests {
    use node_runtime::Collaborators;
    use ps_01_wire_codec::{Command, Message, MAX_PAYLOAD};
    use ps_04_mempool::MempoolApi;
    use shared_types::Chain;

    use crate::harness::*;

    #[tokio::test]
    async fn test_corrupted_payload_disconnects_without_ban() {
        let node = start_node(Collaborators::in_memory(CHAIN)).await;
        let mut remote = RemotePeer::attach(node.peers(), addr(30)).await;
        remote.handshake().await;

        let tx = spend(0x30);
        let mut raw = remote.frame_bytes(&Message::Tx(tx.clone()));
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        remote.send_bytes(&raw).await;

        remote.closed().await;
        until(|| node.peers().is_empty()).await;
        assert!(!node.peers().is_banned(addr(30).ip()));
        assert!(node.container().mempool.dump().is_empty());

        // The address may come straight back.
        let mut again = RemotePeer::attach(node.peers(), addr(30)).await;
        again.handshake().await;

        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_empty_transaction_disconnects_only_that_peer() {
        let node = start_node(Collaborators::in_memory(CHAIN)).await;
        let mempool = node.container().mempool.clone();
        let mut hostile = RemotePeer::attach(node.peers(), addr(33)).await;
        hostile.handshake().await;
        let mut honest = RemotePeer::attach(node.peers(), addr(34)).await;
        honest.handshake().await;

        // Version 2, no inputs, no outputs, lock time 0.
        hostile
            .send_frame(Command::Tx, &[0x02, 0, 0, 0, 0x00, 0x00, 0, 0, 0, 0])
            .await;
        hostile.closed().await;
        until(|| node.peers().ready_count() == 1).await;
        assert!(!node.peers().is_banned(addr(33).ip()));
        assert!(mempool.dump().is_empty());

        // The mempool and the other connection carry on.
        honest.sync(34).await;
        let tx = spend(0x34);
        honest.send(Message::Tx(tx.clone())).await;
        until(|| mempool.query(&tx.txid).is_some()).await;
        assert!(mempool.submit_id([5; 32]).await);

        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_foreign_magic_disconnects() {
        let node = start_node(Collaborators::in_memory(CHAIN)).await;
        let mut remote = RemotePeer::attach(node.peers(), addr(31)).await;
        remote.handshake().await;

        let mut raw = remote.frame_bytes(&Message::Ping(7));
        raw[..4].copy_from_slice(&Chain::Bitcoin.magic().to_le_bytes());
        remote.send_bytes(&raw).await;

        remote.closed().await;
        until(|| node.peers().is_empty()).await;
        assert!(!node.peers().is_banned(addr(31).ip()));

        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_oversized_length_is_rejected_from_the_header() {
        let node = start_node(Collaborators::in_memory(CHAIN)).await;
        let mut remote = RemotePeer::attach(node.peers(), addr(32)).await;
        remote.handshake().await;

        // Only the header is sent; the node must not wait for the body.
        let mut raw = remote.frame_bytes(&Message::Ping(7));
        raw.truncate(24);
        raw[16..20].copy_from_slice(&(MAX_PAYLOAD as u32 + 1).to_le_bytes());
        remote.send_bytes(&raw).await;

        remote.closed().await;
        until(|| node.peers().is_empty()).await;

        node.shutdown().await;
    }
}
