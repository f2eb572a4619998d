//! Typed wrappers for the chain queries used alongside the engine commands.

use crate::{
    client::RpcClient,
    error::ClientError,
    transport::Transport,
};

use alloy_primitives::{
    B256,
    Bytes,
    U64,
};
use engine_rpc_core::{
    BlockTag,
    CallRequest,
    RpcBlock,
    methods,
};
use serde::de::Error as _;
use serde_json::json;

impl<T: Transport> RpcClient<T> {
    pub async fn chain_id(&self) -> Result<u64, ClientError> {
        let id: U64 = self.request(methods::ETH_CHAIN_ID, vec![]).await?;
        Ok(id.to::<u64>())
    }

    /// Height of the node's committed head.
    pub async fn block_number(&self) -> Result<u64, ClientError> {
        let number: U64 = self.request(methods::ETH_BLOCK_NUMBER, vec![]).await?;
        Ok(number.to::<u64>())
    }

    pub async fn block_by_number(&self, tag: BlockTag) -> Result<Option<RpcBlock>, ClientError> {
        self.request(methods::ETH_GET_BLOCK_BY_NUMBER, vec![json!(tag), json!(false)])
            .await
    }

    pub async fn block_by_hash(&self, hash: B256) -> Result<Option<RpcBlock>, ClientError> {
        self.request(methods::ETH_GET_BLOCK_BY_HASH, vec![json!(hash), json!(false)])
            .await
    }

    /// Reads the hash recorded for `height` through the history contract.
    ///
    /// Heights outside the node's window yield [`engine_rpc_core::SENTINEL_HASH`].
    pub async fn block_hash_at(&self, height: u64) -> Result<B256, ClientError> {
        let output: Bytes = self
            .request(
                methods::ETH_CALL,
                vec![json!(CallRequest::block_hash(height)), json!(BlockTag::Latest)],
            )
            .await?;

        B256::try_from(output.as_ref()).map_err(|_| {
            ClientError::Decode {
                method: methods::ETH_CALL.to_string(),
                source: serde_json::Error::custom(format!(
                    "expected a 32-byte word, got {} bytes",
                    output.len()
                )),
            }
        })
    }

    /// Submits a pre-signed transaction and returns its hash.
    pub async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, ClientError> {
        self.request(methods::ETH_SEND_RAW_TRANSACTION, vec![json!(raw)])
            .await
    }
}
