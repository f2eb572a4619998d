//! Block-hash history query.
//!
//! Historical block hashes are read with a contract-call-style query: an
//! `eth_call` to the EIP-2935 history address whose calldata is the requested
//! height as a 32-byte big-endian word. The node answers with the recorded
//! hash, or with [`SENTINEL_HASH`] when the height is outside its window.
//!
//! See also <https://eips.ethereum.org/EIPS/eip-2935>.

use alloy_primitives::{
    Address,
    B256,
    Bytes,
    U256,
};
use serde::{
    Deserialize,
    Serialize,
};

/// Address the history query is routed to.
pub const HISTORY_CONTRACT: Address = alloy_eips::eip2935::HISTORY_STORAGE_ADDRESS;

/// Hash returned for any height the node does not serve.
pub const SENTINEL_HASH: B256 = B256::ZERO;

/// Number of recent block hashes served by default, as with `BLOCKHASH`.
pub const DEFAULT_BLOCK_HASH_COUNT: u64 = 256;

/// Minimal `eth_call` transaction object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Bytes>,
}

impl CallRequest {
    /// Builds the history query for `height`.
    pub fn block_hash(height: u64) -> Self {
        Self {
            to: Some(HISTORY_CONTRACT),
            data: Some(history_calldata(height)),
            input: None,
        }
    }

    /// Calldata of the call. `input` takes precedence over `data`.
    pub fn calldata(&self) -> Option<&Bytes> {
        self.input.as_ref().or(self.data.as_ref())
    }
}

/// Encodes `height` as the 32-byte calldata word.
pub fn history_calldata(height: u64) -> Bytes {
    Bytes::from(U256::from(height).to_be_bytes::<32>())
}

/// Decodes history calldata. Anything other than exactly one word is rejected.
pub fn decode_history_calldata(calldata: &[u8]) -> Option<U256> {
    let word: [u8; 32] = calldata.try_into().ok()?;
    Some(U256::from_be_bytes(word))
}
