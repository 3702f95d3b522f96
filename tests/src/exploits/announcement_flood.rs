//! # Announcement Flood
//!
//! A peer announcing more transaction ids than the node will hold only
//! ever fills the mempool up to its id cap.

#[cfg(test)]
mod tests {
    use node_runtime::{Collaborators, NodeRuntime};
    use ps_01_wire_codec::{Inventory, Message};
    use ps_04_mempool::MempoolApi;

    use crate::harness::*;

    const MAX_IDS: usize = 50;

    #[tokio::test]
    async fn test_announced_ids_stay_within_the_cap() {
        let mut config = config();
        config.mempool.max_ids = MAX_IDS;
        let node = NodeRuntime::start(config, Collaborators::in_memory(CHAIN))
            .await
            .expect("node starts");
        let mempool = node.container().mempool.clone();

        let mut remote = RemotePeer::attach(node.peers(), addr(45)).await;
        remote.handshake().await;

        let flood: Vec<Inventory> = (0..4 * MAX_IDS as u32)
            .map(|n| {
                let mut txid = [0u8; 32];
                txid[..4].copy_from_slice(&n.to_le_bytes());
                Inventory::witness_tx(txid)
            })
            .collect();
        let newest = flood[flood.len() - 1].hash;
        remote.send(Message::Inv(flood)).await;
        remote.sync(45).await;

        until(|| mempool.dump().contains(&newest)).await;
        assert_eq!(mempool.dump().len(), MAX_IDS);
        assert_eq!(node.peers().ready_count(), 1);

        node.shutdown().await;
    }
}
