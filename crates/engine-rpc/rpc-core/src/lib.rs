//! Wire types shared by the engine RPC client and the development node.
//!
//! Everything in this crate is plain data: JSON-RPC 2.0 framing, the engine
//! block command and its acknowledgment, block query shapes, and the
//! constants that define the block-hash history query.

#![allow(clippy::must_use_candidate)]

mod block;
mod history;
mod wire;

pub use block::{
    BlockCommand,
    BlockTag,
    CreatedBlock,
    ImportedAux,
    RpcBlock,
};
pub use history::{
    CallRequest,
    DEFAULT_BLOCK_HASH_COUNT,
    HISTORY_CONTRACT,
    SENTINEL_HASH,
    decode_history_calldata,
    history_calldata,
};
pub use wire::{
    JSONRPC_VERSION,
    JsonRpcErrorCode,
    JsonRpcErrorObject,
    JsonRpcReply,
    JsonRpcRequest,
    ReplyPayload,
    is_truthy,
};

/// JSON-RPC method names understood by the development node.
pub mod methods {
    /// Seal a new block on top of the current head.
    pub const ENGINE_CREATE_BLOCK: &str = "engine_createBlock";
    /// Finalize a previously sealed block.
    pub const ENGINE_FINALIZE_BLOCK: &str = "engine_finalizeBlock";
    pub const ETH_SEND_RAW_TRANSACTION: &str = "eth_sendRawTransaction";
    pub const ETH_BLOCK_NUMBER: &str = "eth_blockNumber";
    pub const ETH_CHAIN_ID: &str = "eth_chainId";
    pub const ETH_GET_BLOCK_BY_NUMBER: &str = "eth_getBlockByNumber";
    pub const ETH_GET_BLOCK_BY_HASH: &str = "eth_getBlockByHash";
    pub const ETH_CALL: &str = "eth_call";
    pub const NET_VERSION: &str = "net_version";
}
