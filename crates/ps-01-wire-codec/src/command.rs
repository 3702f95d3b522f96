//! The 12-byte command field.

use crate::errors::CodecError;
use std::fmt;

/// Width of the NUL-padded command field.
pub const COMMAND_LEN: usize = 12;

macro_rules! commands {
    ($($variant:ident => $name:literal,)*) => {
        /// Every command this node recognises, plus `Unknown` for the rest.
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum Command {
            $($variant,)*
            /// Syntactically valid but unrecognised command.
            Unknown(String),
        }

        impl Command {
            /// ASCII name as it appears on the wire.
            pub fn as_str(&self) -> &str {
                match self {
                    $(Command::$variant => $name,)*
                    Command::Unknown(name) => name,
                }
            }

            fn from_name(name: &str) -> Self {
                match name {
                    $($name => Command::$variant,)*
                    other => Command::Unknown(other.to_owned()),
                }
            }
        }
    };
}

commands! {
    Version => "version",
    Verack => "verack",
    Ping => "ping",
    Pong => "pong",
    GetAddr => "getaddr",
    Addr => "addr",
    AddrV2 => "addrv2",
    SendAddrV2 => "sendaddrv2",
    Inv => "inv",
    GetData => "getdata",
    NotFound => "notfound",
    GetHeaders => "getheaders",
    Headers => "headers",
    GetBlocks => "getblocks",
    Block => "block",
    CmpctBlock => "cmpctblock",
    GetBlockTxn => "getblocktxn",
    BlockTxn => "blocktxn",
    Tx => "tx",
    Mempool => "mempool",
    FeeFilter => "feefilter",
    FilterLoad => "filterload",
    FilterAdd => "filteradd",
    FilterClear => "filterclear",
    SendHeaders => "sendheaders",
    SendCmpct => "sendcmpct",
    Reject => "reject",
    MerkleBlock => "merkleblock",
    GetCFilters => "getcfilters",
    CFilter => "cfilter",
    GetCFHeaders => "getcfheaders",
    CFHeaders => "cfheaders",
    GetCFCheckpt => "getcfcheckpt",
    CFCheckpt => "cfcheckpt",
    WtxidRelay => "wtxidrelay",
}

impl Command {
    /// Parses the NUL-padded field. Printable ASCII followed only by NULs.
    pub fn from_wire(field: &[u8; COMMAND_LEN]) -> Result<Self, CodecError> {
        let end = field.iter().position(|&b| b == 0).unwrap_or(COMMAND_LEN);
        let (name, padding) = field.split_at(end);
        if name.is_empty()
            || !name.iter().all(|b| b.is_ascii_graphic())
            || padding.iter().any(|&b| b != 0)
        {
            return Err(CodecError::MalformedCommand);
        }
        // Checked ASCII above.
        let name = std::str::from_utf8(name).map_err(|_| CodecError::MalformedCommand)?;
        Ok(Self::from_name(name))
    }

    /// Encodes the NUL-padded field.
    pub fn to_wire(&self) -> Result<[u8; COMMAND_LEN], CodecError> {
        let name = self.as_str().as_bytes();
        if name.is_empty() || name.len() > COMMAND_LEN {
            return Err(CodecError::MalformedCommand);
        }
        let mut field = [0u8; COMMAND_LEN];
        field[..name.len()].copy_from_slice(name);
        Ok(field)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Command::Unknown(_))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
