//! # Command Flood
//!
//! A handful of unknown commands is tolerated. Past the tolerance the
//! connection is dropped and the address refused until the ban expires.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use node_runtime::{Collaborators, ManagerError};
    use ps_01_wire_codec::Message;
    use ps_02_peer_connection::Direction;
    use tokio::io::duplex;

    use crate::harness::*;

    const TOLERANCE: u32 = 10;

    fn junk() -> Message {
        Message::Unknown {
            command: "junk".into(),
            payload: Bytes::from_static(b"\x00\x01"),
        }
    }

    #[tokio::test]
    async fn test_tolerated_unknown_commands_keep_the_connection() {
        let node = start_node(Collaborators::in_memory(CHAIN)).await;
        let mut remote = RemotePeer::attach(node.peers(), addr(40)).await;
        remote.handshake().await;

        for _ in 0..TOLERANCE {
            remote.send(junk()).await;
        }
        remote.sync(40).await;
        assert_eq!(node.peers().ready_count(), 1);

        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_command_flood_bans_the_address() {
        let node = start_node(Collaborators::in_memory(CHAIN)).await;
        let mut remote = RemotePeer::attach(node.peers(), addr(41)).await;
        remote.handshake().await;

        for _ in 0..=TOLERANCE {
            remote.send(junk()).await;
        }
        remote.closed().await;
        until(|| node.peers().is_banned(addr(41).ip())).await;
        assert!(node.peers().is_empty());

        let (local, _far) = duplex(1024);
        let refused = node
            .peers()
            .attach(local, addr(41), Direction::Inbound)
            .await;
        assert!(matches!(refused, Err(ManagerError::Banned(_))));

        // Other addresses are unaffected.
        let mut other = RemotePeer::attach(node.peers(), addr(42)).await;
        other.handshake().await;

        node.shutdown().await;
    }
}
