use alloy_primitives::{
    B256,
    U64,
};
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
};
use serde_json::{
    Value,
    json,
};
use std::{
    fmt,
    str::FromStr,
};

/// One instruction to the node to seal a new block on top of its head.
///
/// On the wire this is the positional parameter list of
/// `engine_createBlock`: `[create_empty, finalize, parent_hash]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockCommand {
    /// Build the block even if no transactions are pending.
    pub create_empty: bool,
    /// Mark the block final once it is imported.
    pub finalize: bool,
    /// Parent to build on. `None` means the current head.
    pub parent_hash: Option<B256>,
}

impl BlockCommand {
    pub fn new(finalize: bool) -> Self {
        Self {
            create_empty: true,
            finalize,
            parent_hash: None,
        }
    }

    pub fn params(&self) -> Vec<Value> {
        vec![
            json!(self.create_empty),
            json!(self.finalize),
            json!(self.parent_hash),
        ]
    }

    /// Parses the positional parameters. A missing parent hash is read as `null`.
    pub fn from_params(params: &[Value]) -> Result<Self, &'static str> {
        if params.len() < 2 || params.len() > 3 {
            return Err("Expected two or three parameters");
        }
        let create_empty = params[0]
            .as_bool()
            .ok_or("create_empty must be a boolean")?;
        let finalize = params[1].as_bool().ok_or("finalize must be a boolean")?;
        let parent_hash = match params.get(2) {
            None | Some(Value::Null) => None,
            Some(value) => {
                Some(
                    serde_json::from_value(value.clone())
                        .map_err(|_| "parent_hash must be a 32-byte hex string or null")?,
                )
            }
        };

        Ok(Self {
            create_empty,
            finalize,
            parent_hash,
        })
    }
}

/// Bookkeeping returned alongside a sealed block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedAux {
    pub header_only: bool,
    pub clear_justification_requests: bool,
    pub needs_justification: bool,
    pub bad_justification: bool,
    pub is_new_best: bool,
}

/// Acknowledgment of `engine_createBlock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedBlock {
    pub hash: B256,
    pub aux: ImportedAux,
}

/// Block as returned by `eth_getBlockByNumber` and `eth_getBlockByHash`.
///
/// Only transaction hashes are ever listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    pub number: U64,
    pub hash: B256,
    pub parent_hash: B256,
    pub transactions: Vec<B256>,
}

impl RpcBlock {
    pub fn height(&self) -> u64 {
        self.number.to::<u64>()
    }
}

/// Block selector accepted by the `eth_*` block queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Finalized,
    Safe,
    Earliest,
    Pending,
    Number(u64),
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Finalized => f.write_str("finalized"),
            Self::Safe => f.write_str("safe"),
            Self::Earliest => f.write_str("earliest"),
            Self::Pending => f.write_str("pending"),
            Self::Number(n) => write!(f, "0x{n:x}"),
        }
    }
}

impl FromStr for BlockTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" => Ok(Self::Latest),
            "finalized" => Ok(Self::Finalized),
            "safe" => Ok(Self::Safe),
            "earliest" => Ok(Self::Earliest),
            "pending" => Ok(Self::Pending),
            _ => {
                let digits = s
                    .strip_prefix("0x")
                    .ok_or_else(|| format!("Invalid block tag: {s}"))?;
                u64::from_str_radix(digits, 16)
                    .map(Self::Number)
                    .map_err(|_| format!("Invalid block number: {s}"))
            }
        }
    }
}

impl Serialize for BlockTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BlockTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl From<u64> for BlockTag {
    fn from(number: u64) -> Self {
        Self::Number(number)
    }
}
