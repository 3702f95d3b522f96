//! Decoded message payloads.
//!
//! Every command in [`Command`] maps to exactly one [`Message`] variant.
//! Commands this node only needs to recognise (compact blocks, bloom
//! filters, compact filters) are carried as [`Message::Opaque`].

use crate::chain_data::{put_header, put_transaction, read_header, read_transaction};
use crate::command::Command;
use crate::encoding::{put_compact_size, put_var_bytes, Reader};
use crate::errors::CodecError;
use bytes::{BufMut, Bytes};
use shared_types::{BlockHeader, Hash, Transaction};

/// Current protocol version advertised in `version`.
pub const PROTOCOL_VERSION: i32 = 70016;
/// Oldest protocol version this node talks to.
pub const MIN_PROTOCOL_VERSION: i32 = 70012;
/// Inventory entries per `inv`/`getdata`/`notfound`.
pub const MAX_INV_ENTRIES: u64 = 50_000;
/// Headers per `headers` message.
pub const MAX_HEADERS: u64 = 2_000;
/// Addresses per `addr` message.
pub const MAX_ADDR: u64 = 1_000;
/// Block locator length.
pub const MAX_LOCATOR: u64 = 101;
/// `version` user agent length.
pub const MAX_USER_AGENT: usize = 256;
/// `reject` string fields.
const MAX_REJECT_STR: usize = 111;

/// Service bits.
pub mod services {
    pub const NODE_NETWORK: u64 = 1;
    pub const NODE_BLOOM: u64 = 1 << 2;
    pub const NODE_WITNESS: u64 = 1 << 3;
    pub const NODE_COMPACT_FILTERS: u64 = 1 << 6;
    pub const NODE_NETWORK_LIMITED: u64 = 1 << 10;
}

/// Inventory object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvType {
    Error,
    Tx,
    Block,
    FilteredBlock,
    CompactBlock,
    WitnessTx,
    WitnessBlock,
    WitnessFilteredBlock,
    Other(u32),
}

const WITNESS_FLAG: u32 = 1 << 30;

impl InvType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => InvType::Error,
            1 => InvType::Tx,
            2 => InvType::Block,
            3 => InvType::FilteredBlock,
            4 => InvType::CompactBlock,
            v if v == WITNESS_FLAG | 1 => InvType::WitnessTx,
            v if v == WITNESS_FLAG | 2 => InvType::WitnessBlock,
            v if v == WITNESS_FLAG | 3 => InvType::WitnessFilteredBlock,
            other => InvType::Other(other),
        }
    }

    pub fn to_u32(self) -> u32 {
        match self {
            InvType::Error => 0,
            InvType::Tx => 1,
            InvType::Block => 2,
            InvType::FilteredBlock => 3,
            InvType::CompactBlock => 4,
            InvType::WitnessTx => WITNESS_FLAG | 1,
            InvType::WitnessBlock => WITNESS_FLAG | 2,
            InvType::WitnessFilteredBlock => WITNESS_FLAG | 3,
            InvType::Other(v) => v,
        }
    }

    pub fn is_tx(self) -> bool {
        matches!(self, InvType::Tx | InvType::WitnessTx)
    }

    pub fn is_block(self) -> bool {
        matches!(
            self,
            InvType::Block | InvType::WitnessBlock | InvType::CompactBlock
        )
    }
}

/// One inventory vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Inventory {
    pub inv_type: InvType,
    pub hash: Hash,
}

impl Inventory {
    pub fn tx(hash: Hash) -> Self {
        Self {
            inv_type: InvType::Tx,
            hash,
        }
    }

    pub fn witness_tx(hash: Hash) -> Self {
        Self {
            inv_type: InvType::WitnessTx,
            hash,
        }
    }

    pub fn block(hash: Hash) -> Self {
        Self {
            inv_type: InvType::Block,
            hash,
        }
    }

    pub fn witness_block(hash: Hash) -> Self {
        Self {
            inv_type: InvType::WitnessBlock,
            hash,
        }
    }
}

/// Network address without timestamp, as embedded in `version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetAddress {
    pub services: u64,
    /// IPv6 or IPv4-mapped IPv6.
    pub ip: [u8; 16],
    pub port: u16,
}

impl NetAddress {
    pub fn from_socket(addr: std::net::SocketAddr, services: u64) -> Self {
        let ip = match addr.ip() {
            std::net::IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
            std::net::IpAddr::V6(v6) => v6.octets(),
        };
        Self {
            services,
            ip,
            port: addr.port(),
        }
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        let services = reader.read_u64()?;
        let mut ip = [0u8; 16];
        ip.copy_from_slice(reader.read_bytes(16)?);
        Ok(Self {
            services,
            ip,
            port: reader.read_u16_be()?,
        })
    }

    fn put(&self, buf: &mut impl BufMut) {
        buf.put_u64_le(self.services);
        buf.put_slice(&self.ip);
        buf.put_u16(self.port);
    }
}

/// `addr` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampedAddress {
    pub time: u32,
    pub address: NetAddress,
}

/// `version` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMessage {
    pub version: i32,
    pub services: u64,
    pub timestamp: i64,
    pub receiver: NetAddress,
    pub sender: NetAddress,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: i32,
    /// Absent in very old peers; treated as `true`.
    pub relay: bool,
}

/// `getheaders`/`getblocks` payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockLocator {
    pub version: u32,
    pub locator_hashes: Vec<Hash>,
    pub stop_hash: Hash,
}

/// `reject` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectMessage {
    pub message: String,
    pub code: u8,
    pub reason: String,
    pub data: Option<Hash>,
}

/// A decoded wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Version(VersionMessage),
    Verack,
    Ping(u64),
    Pong(u64),
    GetAddr,
    Addr(Vec<TimestampedAddress>),
    Inv(Vec<Inventory>),
    GetData(Vec<Inventory>),
    NotFound(Vec<Inventory>),
    GetHeaders(BlockLocator),
    GetBlocks(BlockLocator),
    Headers(Vec<BlockHeader>),
    /// Raw block bytes. Decoding is left to the block oracle so the
    /// connection task never parses large blocks.
    Block(Bytes),
    Tx(Transaction),
    Mempool,
    FeeFilter(u64),
    SendHeaders,
    SendCmpct { announce: bool, version: u64 },
    Reject(RejectMessage),
    /// Recognised command whose payload is not interpreted.
    Opaque { command: Command, payload: Bytes },
    /// Unrecognised command.
    Unknown { command: String, payload: Bytes },
}

impl Message {
    pub fn command(&self) -> Command {
        match self {
            Message::Version(_) => Command::Version,
            Message::Verack => Command::Verack,
            Message::Ping(_) => Command::Ping,
            Message::Pong(_) => Command::Pong,
            Message::GetAddr => Command::GetAddr,
            Message::Addr(_) => Command::Addr,
            Message::Inv(_) => Command::Inv,
            Message::GetData(_) => Command::GetData,
            Message::NotFound(_) => Command::NotFound,
            Message::GetHeaders(_) => Command::GetHeaders,
            Message::GetBlocks(_) => Command::GetBlocks,
            Message::Headers(_) => Command::Headers,
            Message::Block(_) => Command::Block,
            Message::Tx(_) => Command::Tx,
            Message::Mempool => Command::Mempool,
            Message::FeeFilter(_) => Command::FeeFilter,
            Message::SendHeaders => Command::SendHeaders,
            Message::SendCmpct { .. } => Command::SendCmpct,
            Message::Reject(_) => Command::Reject,
            Message::Opaque { command, .. } => command.clone(),
            Message::Unknown { command, .. } => Command::Unknown(command.clone()),
        }
    }

    /// Decodes `payload` as the body of `command`.
    pub fn decode(command: &Command, payload: &Bytes) -> Result<Self, CodecError> {
        let mut r = Reader::new(payload);
        let message = match command {
            Command::Version => Message::Version(read_version(&mut r)?),
            Command::Verack => Message::Verack,
            Command::Ping => Message::Ping(r.read_u64()?),
            Command::Pong => Message::Pong(r.read_u64()?),
            Command::GetAddr => Message::GetAddr,
            Command::Addr => Message::Addr(read_addr(&mut r)?),
            Command::Inv => Message::Inv(read_inventory(&mut r)?),
            Command::GetData => Message::GetData(read_inventory(&mut r)?),
            Command::NotFound => Message::NotFound(read_inventory(&mut r)?),
            Command::GetHeaders => Message::GetHeaders(read_locator(&mut r)?),
            Command::GetBlocks => Message::GetBlocks(read_locator(&mut r)?),
            Command::Headers => Message::Headers(read_headers(&mut r)?),
            Command::Block => return Ok(Message::Block(payload.clone())),
            Command::Tx => Message::Tx(read_transaction(&mut r)?),
            Command::Mempool => Message::Mempool,
            Command::FeeFilter => Message::FeeFilter(r.read_u64()?),
            Command::SendHeaders => Message::SendHeaders,
            Command::SendCmpct => Message::SendCmpct {
                announce: r.read_bool()?,
                version: r.read_u64()?,
            },
            Command::Reject => Message::Reject(read_reject(&mut r)?),
            Command::Unknown(name) => {
                return Ok(Message::Unknown {
                    command: name.clone(),
                    payload: payload.clone(),
                })
            }
            Command::AddrV2
            | Command::SendAddrV2
            | Command::CmpctBlock
            | Command::GetBlockTxn
            | Command::BlockTxn
            | Command::FilterLoad
            | Command::FilterAdd
            | Command::FilterClear
            | Command::MerkleBlock
            | Command::GetCFilters
            | Command::CFilter
            | Command::GetCFHeaders
            | Command::CFHeaders
            | Command::GetCFCheckpt
            | Command::CFCheckpt
            | Command::WtxidRelay => {
                return Ok(Message::Opaque {
                    command: command.clone(),
                    payload: payload.clone(),
                })
            }
        };
        // Version may carry fields newer than this node knows.
        if !matches!(command, Command::Version) {
            r.finish()?;
        }
        Ok(message)
    }

    /// Encodes the payload (no header).
    pub fn encode_payload(&self) -> Bytes {
        let mut buf = Vec::new();
        match self {
            Message::Version(v) => put_version(&mut buf, v),
            Message::Verack
            | Message::GetAddr
            | Message::Mempool
            | Message::SendHeaders => {}
            Message::Ping(nonce) | Message::Pong(nonce) => buf.put_u64_le(*nonce),
            Message::Addr(entries) => {
                put_compact_size(&mut buf, entries.len() as u64);
                for entry in entries {
                    buf.put_u32_le(entry.time);
                    entry.address.put(&mut buf);
                }
            }
            Message::Inv(items) | Message::GetData(items) | Message::NotFound(items) => {
                put_inventory(&mut buf, items)
            }
            Message::GetHeaders(locator) | Message::GetBlocks(locator) => {
                buf.put_u32_le(locator.version);
                put_compact_size(&mut buf, locator.locator_hashes.len() as u64);
                for hash in &locator.locator_hashes {
                    buf.put_slice(hash);
                }
                buf.put_slice(&locator.stop_hash);
            }
            Message::Headers(headers) => {
                put_compact_size(&mut buf, headers.len() as u64);
                for header in headers {
                    put_header(&mut buf, header);
                    // Transaction count, always zero in `headers`.
                    buf.put_u8(0);
                }
            }
            Message::Block(raw) => return raw.clone(),
            Message::Tx(tx) => put_transaction(&mut buf, tx, true),
            Message::FeeFilter(rate) => buf.put_u64_le(*rate),
            Message::SendCmpct { announce, version } => {
                buf.put_u8(u8::from(*announce));
                buf.put_u64_le(*version);
            }
            Message::Reject(reject) => {
                put_var_bytes(&mut buf, reject.message.as_bytes());
                buf.put_u8(reject.code);
                put_var_bytes(&mut buf, reject.reason.as_bytes());
                if let Some(data) = &reject.data {
                    buf.put_slice(data);
                }
            }
            Message::Opaque { payload, .. } | Message::Unknown { payload, .. } => {
                return payload.clone()
            }
        }
        Bytes::from(buf)
    }
}

fn read_version(r: &mut Reader<'_>) -> Result<VersionMessage, CodecError> {
    let version = r.read_i32()?;
    let services = r.read_u64()?;
    let timestamp = r.read_i64()?;
    let receiver = NetAddress::read(r)?;
    let sender = NetAddress::read(r)?;
    let nonce = r.read_u64()?;
    let user_agent = r.read_var_str(MAX_USER_AGENT)?;
    let start_height = r.read_i32()?;
    let relay = if r.is_empty() { true } else { r.read_bool()? };
    Ok(VersionMessage {
        version,
        services,
        timestamp,
        receiver,
        sender,
        nonce,
        user_agent,
        start_height,
        relay,
    })
}

fn put_version(buf: &mut Vec<u8>, v: &VersionMessage) {
    buf.put_i32_le(v.version);
    buf.put_u64_le(v.services);
    buf.put_i64_le(v.timestamp);
    v.receiver.put(buf);
    v.sender.put(buf);
    buf.put_u64_le(v.nonce);
    put_var_bytes(buf, v.user_agent.as_bytes());
    buf.put_i32_le(v.start_height);
    buf.put_u8(u8::from(v.relay));
}

fn read_inventory(r: &mut Reader<'_>) -> Result<Vec<Inventory>, CodecError> {
    let count = r.read_count("inventory", MAX_INV_ENTRIES)?;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(Inventory {
            inv_type: InvType::from_u32(r.read_u32()?),
            hash: r.read_hash()?,
        });
    }
    Ok(items)
}

fn put_inventory(buf: &mut Vec<u8>, items: &[Inventory]) {
    put_compact_size(buf, items.len() as u64);
    for item in items {
        buf.put_u32_le(item.inv_type.to_u32());
        buf.put_slice(&item.hash);
    }
}

fn read_addr(r: &mut Reader<'_>) -> Result<Vec<TimestampedAddress>, CodecError> {
    let count = r.read_count("addr", MAX_ADDR)?;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        entries.push(TimestampedAddress {
            time: r.read_u32()?,
            address: NetAddress::read(r)?,
        });
    }
    Ok(entries)
}

fn read_locator(r: &mut Reader<'_>) -> Result<BlockLocator, CodecError> {
    let version = r.read_u32()?;
    let count = r.read_count("locator", MAX_LOCATOR)?;
    let mut locator_hashes = Vec::with_capacity(count);
    for _ in 0..count {
        locator_hashes.push(r.read_hash()?);
    }
    Ok(BlockLocator {
        version,
        locator_hashes,
        stop_hash: r.read_hash()?,
    })
}

fn read_headers(r: &mut Reader<'_>) -> Result<Vec<BlockHeader>, CodecError> {
    let count = r.read_count("headers", MAX_HEADERS)?;
    let mut headers = Vec::with_capacity(count);
    for _ in 0..count {
        headers.push(read_header(r)?);
        if r.read_compact_size()? != 0 {
            return Err(CodecError::InvalidData(
                "headers entry carries transactions".into(),
            ));
        }
    }
    Ok(headers)
}

fn read_reject(r: &mut Reader<'_>) -> Result<RejectMessage, CodecError> {
    let message = r.read_var_str(MAX_REJECT_STR)?;
    let code = r.read_u8()?;
    let reason = r.read_var_str(MAX_REJECT_STR)?;
    let data = if r.remaining() >= 32 {
        Some(r.read_hash()?)
    } else {
        None
    };
    Ok(RejectMessage {
        message,
        code,
        reason,
        data,
    })
}
