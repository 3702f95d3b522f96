//! Scripted remote peer and chain fixtures.
//!
//! A [`RemotePeer`] is the far end of an in-memory pipe attached to a
//! node's [`PeerManager`]. Tests drive it message by message.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{duplex, AsyncWriteExt, DuplexStream};
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tokio_util::codec::Framed;

use node_runtime::adapters::genesis_hash;
use node_runtime::{Collaborators, NodeConfig, NodeRuntime, PeerManager};
use ps_01_wire_codec::chain_data::compute_txid;
use ps_01_wire_codec::{
    services, BitcoinCodec, Command, FrameCodec, Message, NetAddress, RawFrame, VersionMessage,
    WireCodec, PROTOCOL_VERSION,
};
use ps_02_peer_connection::{Direction, PeerHandle};
use shared_types::{Block, BlockHeader, Chain, OutPoint, Transaction, TxIn, TxOut};

pub const CHAIN: Chain = Chain::Regtest;
pub const WAIT: Duration = Duration::from_secs(5);

pub fn addr(last: u8) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, last], 18444))
}

/// Regtest node that reconciles its mempool every second.
pub fn config() -> NodeConfig {
    let mut config = NodeConfig::default();
    config.network.chain = CHAIN;
    config.network.heartbeat_interval_ms = 200;
    config.network.reconcile_interval_secs = 1;
    config
}

pub async fn start_node(collaborators: Collaborators) -> NodeRuntime {
    NodeRuntime::start(config(), collaborators)
        .await
        .expect("node starts")
}

/// Polls `check` until it holds.
pub async fn until(check: impl Fn() -> bool) {
    timeout(WAIT, async {
        while !check() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Spends output 0 of a made-up transaction tagged `tag`.
pub fn spend(tag: u8) -> Transaction {
    let mut tx = Transaction {
        version: 2,
        inputs: vec![TxIn {
            previous_output: OutPoint {
                txid: [tag; 32],
                vout: 0,
            },
            script_sig: vec![0x51],
            sequence: u32::MAX,
            witness: Vec::new(),
        }],
        outputs: vec![TxOut {
            value: 50_000,
            script_pubkey: vec![0x51],
        }],
        ..Default::default()
    };
    tx.txid = compute_txid(&tx);
    tx
}

/// A block on top of genesis that passes merkle validation.
pub fn block(tag: u8) -> Block {
    let mut coinbase = Transaction {
        version: 1,
        inputs: vec![TxIn {
            previous_output: OutPoint {
                txid: [0u8; 32],
                vout: u32::MAX,
            },
            script_sig: vec![0x01, tag],
            sequence: u32::MAX,
            witness: Vec::new(),
        }],
        outputs: vec![TxOut {
            value: 50 * 100_000_000,
            script_pubkey: vec![0x51],
        }],
        ..Default::default()
    };
    coinbase.txid = compute_txid(&coinbase);

    let mut block = Block {
        header: BlockHeader {
            version: 1,
            prev_blockhash: genesis_hash(CHAIN),
            time: 1_700_000_000 + u32::from(tag),
            bits: 0x207f_ffff,
            nonce: u32::from(tag),
            ..Default::default()
        },
        transactions: vec![coinbase, spend(tag)],
    };
    block.header.merkle_root = block.compute_merkle_root();
    block
}

/// `block` message carrying `block` in wire encoding.
pub fn block_message(block: &Block) -> Message {
    Message::Block(Bytes::from(BitcoinCodec::new(CHAIN).encode_block(block)))
}

pub fn version(nonce: u64) -> Message {
    Message::Version(VersionMessage {
        version: PROTOCOL_VERSION,
        services: services::NODE_NETWORK | services::NODE_WITNESS,
        timestamp: 0,
        receiver: NetAddress::default(),
        sender: NetAddress::default(),
        nonce,
        user_agent: "/scripted:0.1/".into(),
        start_height: 0,
        relay: true,
    })
}

/// Far end of a connection the node believes it dialed.
pub struct RemotePeer {
    pub handle: PeerHandle,
    framed: Framed<DuplexStream, FrameCodec>,
    codec: BitcoinCodec,
}

impl RemotePeer {
    pub async fn attach(peers: &PeerManager, addr: SocketAddr) -> Self {
        let codec = BitcoinCodec::new(CHAIN);
        let (local, remote) = duplex(1 << 20);
        let handle = peers
            .attach(local, addr, Direction::Outbound)
            .await
            .expect("peer admitted");
        Self {
            handle,
            framed: Framed::new(remote, codec.frame_codec()),
            codec,
        }
    }

    pub async fn send(&mut self, message: Message) {
        let frame = self.codec.encode_message(&message).expect("encodable");
        self.framed.send(frame).await.expect("pipe open");
    }

    /// Serialised frame for `message`, for tests that tamper with bytes.
    pub fn frame_bytes(&self, message: &Message) -> Vec<u8> {
        self.codec
            .encode_message(message)
            .and_then(|frame| frame.to_bytes(self.codec.magic()))
            .expect("encodable")
    }

    /// Frames `payload` under `command` as is, without encoding a message.
    pub async fn send_frame(&mut self, command: Command, payload: &'static [u8]) {
        self.framed
            .send(RawFrame::new(command, Bytes::from_static(payload)))
            .await
            .expect("pipe open");
    }

    /// Writes bytes straight to the pipe, bypassing the framer.
    pub async fn send_bytes(&mut self, raw: &[u8]) {
        self.framed.get_mut().write_all(raw).await.expect("pipe open");
    }

    /// First message matching `wanted` within `window`. Others are skipped.
    pub async fn within(
        &mut self,
        window: Duration,
        wanted: impl Fn(&Message) -> bool,
    ) -> Option<Message> {
        let deadline = Instant::now() + window;
        loop {
            let frame = match timeout_at(deadline, self.framed.next()).await {
                Ok(Some(frame)) => frame.expect("well-formed frame from node"),
                Ok(None) | Err(_) => return None,
            };
            let message = self.codec.decode_message(&frame).expect("decodable");
            if wanted(&message) {
                return Some(message);
            }
        }
    }

    pub async fn expect(&mut self, wanted: impl Fn(&Message) -> bool) -> Message {
        self.within(WAIT, wanted)
            .await
            .expect("timed out waiting for message")
    }

    /// Completes the handshake the node opened.
    pub async fn handshake(&mut self) {
        self.expect(|m| matches!(m, Message::Version(_))).await;
        self.send(version(0xbbbb)).await;
        self.send(Message::Verack).await;
        self.expect(|m| matches!(m, Message::Verack)).await;
        self.expect(|m| matches!(m, Message::SendHeaders)).await;
    }

    /// Round-trips a ping. Everything sent before it has been handled.
    pub async fn sync(&mut self, nonce: u64) {
        self.send(Message::Ping(nonce)).await;
        self.expect(|m| matches!(m, Message::Pong(n) if *n == nonce))
            .await;
    }

    /// Waits for the node to hang up.
    pub async fn closed(&mut self) {
        timeout(WAIT, async {
            while let Some(Ok(_)) = self.framed.next().await {}
        })
        .await
        .expect("connection still open");
    }
}
