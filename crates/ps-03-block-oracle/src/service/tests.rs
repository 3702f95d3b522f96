//! Actor tests with in-memory collaborators.

use super::*;
use crate::adapters::MerkleValidator;
use futures::future::join_all;
use parking_lot::Mutex;
use ps_01_wire_codec::BitcoinCodec;
use shared_bus::{EventFilter, EventTopic, InMemoryEventBus, Subscription};
use shared_types::{BlockHeader, OutPoint, Transaction, TxIn, TxOut};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::timeout;

const PEER: PeerId = PeerId(9);
const WAIT: Duration = Duration::from_secs(5);

struct MockHeaders {
    valid: HashSet<Hash>,
    asked: UnboundedSender<Hash>,
}

#[async_trait]
impl HeaderOracle for MockHeaders {
    async fn best_height(&self) -> i32 {
        0
    }

    async fn is_valid(&self, hash: &Hash) -> bool {
        let _ = self.asked.send(*hash);
        self.valid.contains(hash)
    }
}

#[derive(Default)]
struct MockDatabase {
    blocks: Mutex<HashMap<Hash, Block>>,
    stored: Mutex<Vec<Hash>>,
    lookups: AtomicUsize,
}

#[async_trait]
impl BlockDatabase for MockDatabase {
    async fn load_tip(&self) -> Option<(i32, Hash)> {
        None
    }

    async fn load_block(&self, hash: &Hash) -> Option<Block> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.blocks.lock().get(hash).cloned()
    }

    async fn store_block(&self, block: &Block) -> bool {
        self.stored.lock().push(block.block_hash());
        true
    }
}

struct Harness {
    oracle: BlockOracle,
    database: Arc<MockDatabase>,
    asked: UnboundedReceiver<Hash>,
    events: Subscription,
    codec: BitcoinCodec,
}

fn start(config: OracleConfig, valid: HashSet<Hash>, database: MockDatabase) -> Harness {
    let codec = BitcoinCodec::new(Chain::Regtest);
    let (asked_tx, asked) = unbounded_channel();
    let bus = Arc::new(InMemoryEventBus::new());
    let events = bus.subscribe(EventFilter::topics(vec![EventTopic::BlockOracle]));
    let database = Arc::new(database);

    let ports = OraclePorts {
        headers: Arc::new(MockHeaders {
            valid,
            asked: asked_tx,
        }),
        database: database.clone(),
        validator: Arc::new(MerkleValidator),
        events: bus,
    };
    let (oracle, _task) = BlockOracle::spawn(config, Arc::new(codec), ports);
    Harness {
        oracle,
        database,
        asked,
        events,
        codec,
    }
}

fn default_harness() -> Harness {
    start(OracleConfig::default(), HashSet::new(), MockDatabase::default())
}

/// A block whose merkle root matches its single coinbase.
fn valid_block(codec: &BitcoinCodec, tag: u8) -> Block {
    let coinbase = Transaction {
        txid: [0u8; 32],
        version: 1,
        inputs: vec![TxIn {
            previous_output: OutPoint {
                txid: [0u8; 32],
                vout: u32::MAX,
            },
            script_sig: vec![tag, 0x01],
            sequence: u32::MAX,
            witness: Vec::new(),
        }],
        outputs: vec![TxOut {
            value: 50,
            script_pubkey: vec![0x51],
        }],
        lock_time: 0,
    };
    // Decoding assigns the real txid.
    let coinbase = codec
        .decode_transaction(&codec.encode_transaction(&coinbase))
        .unwrap();
    Block {
        header: BlockHeader {
            merkle_root: coinbase.txid,
            nonce: tag as u32,
            ..Default::default()
        },
        transactions: vec![coinbase],
    }
}

impl Harness {
    fn raw(&self, block: &Block) -> Bytes {
        Bytes::from(self.codec.encode_block(block))
    }

    async fn next_event(&mut self) -> SyncEvent {
        timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("bus closed")
    }

    async fn next_download(&mut self) -> Hash {
        loop {
            if let SyncEvent::BlockDownloaded { hash, .. } = self.next_event().await {
                return hash;
            }
        }
    }
}

// =============================================================================
// LOADING
// =============================================================================

#[tokio::test]
async fn test_concurrent_loads_issue_one_fetch() {
    let mut harness = default_harness();
    let block = valid_block(&harness.codec, 1);
    let hash = block.block_hash();

    let waiters: Vec<BlockWaiter> = join_all(
        (0..5).map(|_| harness.oracle.load_bitcoin_many(vec![hash])),
    )
    .await
    .into_iter()
    .flatten()
    .collect();
    assert_eq!(waiters.len(), 5);
    assert_eq!(harness.oracle.download_queue(), 1);
    assert_eq!(harness.database.lookups.load(Ordering::SeqCst), 1);

    let (batch, hashes) = harness.oracle.get_block_batch(PEER).await.unwrap();
    assert_eq!(hashes, vec![hash]);
    assert!(harness.oracle.get_block_batch(PeerId(10)).await.is_none());

    harness.oracle.submit_block(Some(PEER), harness.raw(&block));
    let results = join_all(waiters.into_iter().map(BlockWaiter::wait)).await;
    let first = results[0].clone().unwrap();
    for result in &results {
        assert!(Arc::ptr_eq(result.as_ref().unwrap(), &first));
    }
    assert_eq!(harness.next_download().await, hash);

    harness.oracle.finish_batch(batch).await;
    harness.oracle.heartbeat().await;
    assert_eq!(harness.oracle.download_queue(), 0);
    assert!(harness.oracle.query(&hash).is_some());
}

#[tokio::test]
async fn test_load_consults_database_first() {
    let codec = BitcoinCodec::new(Chain::Regtest);
    let block = valid_block(&codec, 2);
    let hash = block.block_hash();
    let database = MockDatabase::default();
    database.blocks.lock().insert(hash, block.clone());

    let harness = start(OracleConfig::default(), HashSet::new(), database);
    let loaded = harness.oracle.load_bitcoin(hash).await.unwrap();
    assert_eq!(*loaded, block);
    assert_eq!(harness.oracle.download_queue(), 0);
    assert!(harness.oracle.query(&hash).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_caller_timeout_keeps_request() {
    let harness = default_harness();
    let hash = [0x55; 32];

    let loaded = harness
        .oracle
        .load_bitcoin_timeout(hash, Duration::from_secs(2))
        .await;
    assert!(loaded.is_none());
    assert_eq!(harness.oracle.download_queue(), 1);
}

#[tokio::test]
async fn test_queue_depth_is_published() {
    let mut harness = default_harness();
    harness.oracle.load_bitcoin_many(vec![[1u8; 32], [2u8; 32]]).await;

    match harness.next_event().await {
        SyncEvent::QueueDepthChanged { chain, depth } => {
            assert_eq!(chain, Chain::Regtest);
            assert_eq!(depth, 2);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

// =============================================================================
// INCOMING BLOCKS
// =============================================================================

#[tokio::test]
async fn test_invalid_block_leaves_hash_queued() {
    let harness = default_harness();
    let mut block = valid_block(&harness.codec, 3);
    block.header.merkle_root = [0xff; 32];
    let hash = block.block_hash();

    let waiter = harness
        .oracle
        .load_bitcoin_many(vec![hash])
        .await
        .pop()
        .unwrap();
    harness.oracle.submit_block(Some(PEER), harness.raw(&block));

    assert!(timeout(Duration::from_millis(300), waiter.wait()).await.is_err());
    assert_eq!(harness.oracle.download_queue(), 1);
    assert!(harness.oracle.query(&hash).is_none());
}

#[tokio::test]
async fn test_garbage_bytes_are_dropped() {
    let harness = default_harness();
    harness
        .oracle
        .submit_block(Some(PEER), Bytes::from_static(&[0u8; 10]));
    harness.oracle.heartbeat().await;
    assert_eq!(harness.oracle.stats().resident, 0);
}

#[tokio::test]
async fn test_unsolicited_block_gated_by_header_chain() {
    let codec = BitcoinCodec::new(Chain::Regtest);
    let on_chain = valid_block(&codec, 4);
    let off_chain = valid_block(&codec, 5);
    let mut harness = start(
        OracleConfig::default(),
        HashSet::from([on_chain.block_hash()]),
        MockDatabase::default(),
    );

    harness.oracle.receive_block(None, off_chain.clone());
    let asked = timeout(WAIT, harness.asked.recv()).await.unwrap().unwrap();
    assert_eq!(asked, off_chain.block_hash());
    harness.oracle.heartbeat().await;
    assert!(harness.oracle.query(&off_chain.block_hash()).is_none());

    harness.oracle.receive_block(None, on_chain.clone());
    assert_eq!(harness.next_download().await, on_chain.block_hash());
    assert!(harness.oracle.query(&on_chain.block_hash()).is_some());
}

#[tokio::test]
async fn test_overflow_is_persisted() {
    let codec = BitcoinCodec::new(Chain::Regtest);
    let first = valid_block(&codec, 6);
    let second = valid_block(&codec, 7);
    let mut harness = start(
        OracleConfig {
            cache_limit: 1,
            ..Default::default()
        },
        HashSet::from([first.block_hash(), second.block_hash()]),
        MockDatabase::default(),
    );

    harness.oracle.receive_block(Some(PEER), first);
    harness.next_download().await;
    harness.oracle.receive_block(Some(PEER), second);
    harness.next_download().await;
    harness.oracle.heartbeat().await;

    assert_eq!(harness.oracle.stats().resident, 1);
    assert_eq!(harness.database.stored.lock().len(), 1);
}

// =============================================================================
// BATCHES AND TIMEOUTS
// =============================================================================

#[tokio::test]
async fn test_finish_batch_requeues_undelivered() {
    let mut harness = default_harness();
    let delivered = valid_block(&harness.codec, 8);
    let hashes = vec![delivered.block_hash(), [0xa1; 32], [0xa2; 32]];
    harness.oracle.load_bitcoin_many(hashes.clone()).await;

    let (batch, assigned) = harness.oracle.get_block_batch(PEER).await.unwrap();
    assert_eq!(assigned, hashes);
    assert_eq!(harness.oracle.stats().unassigned, 0);

    harness.oracle.receive_block(Some(PEER), delivered);
    harness.next_download().await;
    harness.oracle.finish_batch(batch).await;
    harness.oracle.heartbeat().await;

    let stats = harness.oracle.stats();
    assert_eq!(stats.download_queue, 2);
    assert_eq!(stats.unassigned, 2);
    assert_eq!(stats.batches_in_flight, 0);

    let (_, again) = harness.oracle.get_block_batch(PeerId(10)).await.unwrap();
    assert_eq!(again, hashes[1..].to_vec());
}

#[tokio::test]
async fn test_batch_returned_empty_until_retries_run_out() {
    let harness = start(
        OracleConfig {
            max_retries: 1,
            ..Default::default()
        },
        HashSet::new(),
        MockDatabase::default(),
    );
    let hash = [0xb1; 32];
    let waiters = harness.oracle.load_bitcoin_many(vec![hash]).await;

    for peer in 0..2 {
        let (batch, assigned) = harness.oracle.get_block_batch(PeerId(peer)).await.unwrap();
        assert_eq!(assigned, vec![hash]);
        harness.oracle.finish_batch(batch).await;
    }
    harness.oracle.heartbeat().await;

    assert_eq!(harness.oracle.download_queue(), 0);
    assert!(harness.oracle.get_block_batch(PeerId(5)).await.is_none());
    for waiter in waiters {
        assert!(waiter.wait().await.is_none());
    }
}

#[tokio::test]
async fn test_forget_peer_drops_delivery_history() {
    let harness = default_harness();
    harness.oracle.load_bitcoin_many(vec![[0xc1; 32]]).await;
    let (batch, _) = harness.oracle.get_block_batch(PEER).await.unwrap();
    harness.oracle.finish_batch(batch).await;
    harness.oracle.heartbeat().await;
    assert!(harness.oracle.peer_stats(PEER).is_some());

    harness.oracle.forget_peer(PEER).await;
    harness.oracle.heartbeat().await;
    assert!(harness.oracle.peer_stats(PEER).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_expires_stalled_batch() {
    let harness = start(
        OracleConfig {
            download_timeout: Duration::from_secs(5),
            ..Default::default()
        },
        HashSet::new(),
        MockDatabase::default(),
    );
    harness.oracle.load_bitcoin_many(vec![[0xb1; 32]]).await;
    harness.oracle.get_block_batch(PEER).await.unwrap();
    assert_eq!(harness.oracle.stats().unassigned, 0);

    tokio::time::advance(Duration::from_secs(5)).await;
    harness.oracle.heartbeat().await;
    assert_eq!(harness.oracle.stats().unassigned, 1);
    assert_eq!(harness.oracle.download_queue(), 1);
}

#[tokio::test]
async fn test_shutdown_resolves_waiters_empty() {
    let harness = default_harness();
    let waiter = harness
        .oracle
        .load_bitcoin_many(vec![[0xc1; 32]])
        .await
        .pop()
        .unwrap();

    harness.oracle.shutdown().await;
    assert!(waiter.wait().await.is_none());
    assert!(harness.oracle.load_bitcoin([0xc2; 32]).await.is_none());
    assert!(harness.oracle.get_block_batch(PEER).await.is_none());
}
