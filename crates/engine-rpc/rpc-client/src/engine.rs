//! Block engine controller.
//!
//! Drives block production on a node through the engine command methods.
//! A production is *acknowledged* once the node returns a truthy result and
//! *settled* once its side effects are observable. [`BlockEngine::produce_block`]
//! waits for both; [`BlockEngine::produce_block_no_wait`] only for the first.

use crate::{
    client::RpcClient,
    error::ClientError,
    transport::Transport,
};

use alloy_primitives::B256;
use engine_rpc_core::{
    BlockCommand,
    CreatedBlock,
    RpcBlock,
    is_truthy,
    methods,
};
use serde_json::{
    Value,
    json,
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::time::Instant;
use tracing::{
    debug,
    info,
};

/// Settling delay applied after an acknowledged production by default.
pub const DEFAULT_SETTLING_DELAY: Duration = Duration::from_millis(500);

/// How [`BlockEngine`] waits for an acknowledged block to become observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Sleep for a fixed duration.
    FixedDelay(Duration),
    /// Poll `eth_getBlockByHash` until the node returns the block.
    ///
    /// Acknowledgments without a block hash fall back to
    /// [`DEFAULT_SETTLING_DELAY`].
    AwaitBlock {
        poll_interval: Duration,
        timeout: Duration,
    },
}

impl Default for Settlement {
    fn default() -> Self {
        Self::FixedDelay(DEFAULT_SETTLING_DELAY)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineConfig {
    pub settlement: Settlement,
}

/// Truthy result of an engine command.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockAck {
    result: Value,
}

impl BlockAck {
    /// Raw result as returned by the node.
    pub fn result(&self) -> &Value {
        &self.result
    }

    /// The result parsed as a manual-seal acknowledgment, if it has that shape.
    pub fn created_block(&self) -> Option<CreatedBlock> {
        serde_json::from_value(self.result.clone()).ok()
    }

    pub fn hash(&self) -> Option<B256> {
        self.result
            .get("hash")
            .and_then(|hash| serde_json::from_value(hash.clone()).ok())
    }
}

/// Issues block production and finalization commands.
#[derive(Debug)]
pub struct BlockEngine<T> {
    client: Arc<RpcClient<T>>,
    config: EngineConfig,
}

impl<T> Clone for BlockEngine<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            config: self.config,
        }
    }
}

impl<T: Transport> BlockEngine<T> {
    pub fn new(client: Arc<RpcClient<T>>, config: EngineConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &Arc<RpcClient<T>> {
        &self.client
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Produces a block on top of the head and waits until it has settled.
    pub async fn produce_block(&self, finalize: bool) -> Result<BlockAck, ClientError> {
        let ack = self.create_block(BlockCommand::new(finalize)).await?;
        self.settle(&ack).await?;
        Ok(ack)
    }

    /// Produces a block on top of the head and returns on acknowledgment.
    pub async fn produce_block_no_wait(&self, finalize: bool) -> Result<BlockAck, ClientError> {
        self.create_block(BlockCommand::new(finalize)).await
    }

    /// Sends `command` as `engine_createBlock` without settling.
    #[tracing::instrument(level = "debug", skip(self), fields(finalize = command.finalize))]
    pub async fn create_block(&self, command: BlockCommand) -> Result<BlockAck, ClientError> {
        let ack = self
            .acknowledge(methods::ENGINE_CREATE_BLOCK, command.params())
            .await?;
        debug!(hash = ?ack.hash(), "Block acknowledged");
        Ok(ack)
    }

    /// Finalizes a block sealed earlier without finalization.
    pub async fn finalize_block(&self, hash: B256) -> Result<BlockAck, ClientError> {
        self.acknowledge(methods::ENGINE_FINALIZE_BLOCK, vec![json!(hash), Value::Null])
            .await
    }

    /// Waits until the block behind `ack` is observable, per [`Settlement`].
    pub async fn settle(&self, ack: &BlockAck) -> Result<(), ClientError> {
        match (self.config.settlement, ack.hash()) {
            (Settlement::FixedDelay(delay), _) => tokio::time::sleep(delay).await,
            (
                Settlement::AwaitBlock {
                    poll_interval,
                    timeout,
                },
                Some(hash),
            ) => self.await_block(hash, poll_interval, timeout).await?,
            (Settlement::AwaitBlock { .. }, None) => {
                tokio::time::sleep(DEFAULT_SETTLING_DELAY).await;
            }
        }
        Ok(())
    }

    async fn await_block(
        &self,
        hash: B256,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<(), ClientError> {
        let started = Instant::now();
        loop {
            let block: Option<RpcBlock> = self
                .client
                .request(methods::ETH_GET_BLOCK_BY_HASH, vec![json!(hash), json!(false)])
                .await?;
            if block.is_some() {
                return Ok(());
            }

            let waited = started.elapsed();
            if waited >= timeout {
                info!(%hash, ?waited, "Block did not settle in time");
                return Err(ClientError::SettleTimeout { hash, waited });
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Sends an engine command and requires a truthy result.
    async fn acknowledge(&self, method: &str, params: Vec<Value>) -> Result<BlockAck, ClientError> {
        let reply = self
            .client
            .exchange(method, params, self.client.config().request_timeout)
            .await?;

        if let Some(error) = reply.error {
            return Err(ClientError::Protocol {
                method: method.to_string(),
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }

        match reply.result {
            Some(result) if is_truthy(&result) => Ok(BlockAck { result }),
            result => {
                let raw = json!({
                    "jsonrpc": reply.jsonrpc,
                    "id": reply.id,
                    "result": result,
                });
                Err(ClientError::Engine {
                    reply: raw.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::ClientConfig,
        transport::{
            ChannelPeer,
            ChannelTransport,
        },
    };
    use engine_rpc_core::{
        JsonRpcErrorCode,
        JsonRpcErrorObject,
        JsonRpcRequest,
    };

    fn engine(settlement: Settlement) -> (BlockEngine<ChannelTransport>, ChannelPeer) {
        let (transport, inbound, peer) = ChannelTransport::pair();
        let client = Arc::new(RpcClient::new(transport, inbound, ClientConfig::default()));
        (BlockEngine::new(client, EngineConfig { settlement }), peer)
    }

    fn created(hash: B256) -> Value {
        serde_json::to_value(CreatedBlock {
            hash,
            aux: Default::default(),
        })
        .unwrap()
    }

    /// Answers every request with `answer`, recording the requests it saw.
    fn serve(
        mut peer: ChannelPeer,
        answer: impl Fn(&JsonRpcRequest) -> String + Send + 'static,
    ) -> tokio::task::JoinHandle<Vec<JsonRpcRequest>> {
        tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(request) = peer.next_request().await {
                peer.send_raw(answer(&request));
                seen.push(request);
            }
            seen
        })
    }

    #[tokio::test]
    async fn test_create_block_sends_the_command() {
        let (engine, peer) = engine(Settlement::default());
        let hash = B256::repeat_byte(0x11);
        let server = serve(peer, move |request| {
            json!({"jsonrpc": "2.0", "id": request.id, "result": created(hash)}).to_string()
        });

        let ack = engine.produce_block_no_wait(true).await.unwrap();
        assert_eq!(ack.hash(), Some(hash));
        assert_eq!(ack.created_block().unwrap().hash, hash);

        drop(engine);
        let seen = server.await.unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, "engine_createBlock");
        assert_eq!(seen[0].params, vec![json!(true), json!(true), Value::Null]);
    }

    #[tokio::test]
    async fn test_falsy_result_is_an_engine_failure() {
        for result in [json!(false), Value::Null, json!(0), json!(""), json!({})] {
            let (engine, peer) = engine(Settlement::default());
            let expected = result.clone();
            serve(peer, move |request| {
                json!({"jsonrpc": "2.0", "id": request.id, "result": expected}).to_string()
            });

            let err = engine.produce_block(true).await.unwrap_err();
            match err {
                ClientError::Engine { reply } => {
                    assert!(reply.contains("\"result\""), "{reply}");
                }
                other => panic!("expected engine failure for {result}, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_absent_result_is_an_engine_failure() {
        let (engine, peer) = engine(Settlement::default());
        serve(peer, |request| {
            json!({"jsonrpc": "2.0", "id": request.id}).to_string()
        });

        let err = engine.produce_block(true).await.unwrap_err();
        assert!(err.is_engine(), "{err:?}");
        assert!(err.to_string().starts_with("Unexpected result: "));
    }

    #[tokio::test]
    async fn test_error_reply_is_a_protocol_failure() {
        let (engine, peer) = engine(Settlement::default());
        serve(peer, |request| {
            let error = JsonRpcErrorObject::new(JsonRpcErrorCode::InternalError, "no transactions to include");
            json!({"jsonrpc": "2.0", "id": request.id, "error": error}).to_string()
        });

        let err = engine.produce_block_no_wait(true).await.unwrap_err();
        assert!(err.is_protocol(), "{err:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_skips_the_settling_delay() {
        let (engine, peer) = engine(Settlement::default());
        serve(peer, |request| {
            json!({"jsonrpc": "2.0", "id": request.id, "result": true}).to_string()
        });

        let started = Instant::now();
        engine.produce_block_no_wait(true).await.unwrap();
        assert!(started.elapsed() < DEFAULT_SETTLING_DELAY);

        let started = Instant::now();
        engine.produce_block(true).await.unwrap();
        assert!(started.elapsed() >= DEFAULT_SETTLING_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_block_polls_until_the_block_is_visible() {
        let hash = B256::repeat_byte(0x22);
        let (engine, peer) = engine(Settlement::AwaitBlock {
            poll_interval: Duration::from_millis(10),
            timeout: Duration::from_secs(1),
        });

        let polls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = polls.clone();
        serve(peer, move |request| {
            let result = match request.method.as_str() {
                "engine_createBlock" => created(hash),
                _ => {
                    // Visible from the third poll on.
                    let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    if n < 2 {
                        Value::Null
                    } else {
                        json!({
                            "number": "0x1",
                            "hash": hash,
                            "parentHash": B256::ZERO,
                            "transactions": [],
                        })
                    }
                }
            };
            json!({"jsonrpc": "2.0", "id": request.id, "result": result}).to_string()
        });

        let ack = engine.produce_block(true).await.unwrap();
        assert_eq!(ack.hash(), Some(hash));
        assert_eq!(polls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_block_times_out() {
        let hash = B256::repeat_byte(0x33);
        let (engine, peer) = engine(Settlement::AwaitBlock {
            poll_interval: Duration::from_millis(50),
            timeout: Duration::from_millis(200),
        });
        serve(peer, move |request| {
            let result = match request.method.as_str() {
                "engine_createBlock" => created(hash),
                _ => Value::Null,
            };
            json!({"jsonrpc": "2.0", "id": request.id, "result": result}).to_string()
        });

        match engine.produce_block(false).await.unwrap_err() {
            ClientError::SettleTimeout { hash: late, waited } => {
                assert_eq!(late, hash);
                assert!(waited >= Duration::from_millis(200));
            }
            other => panic!("expected settle timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_finalize_block_params() {
        let (engine, peer) = engine(Settlement::default());
        let server = serve(peer, |request| {
            json!({"jsonrpc": "2.0", "id": request.id, "result": true}).to_string()
        });

        let hash = B256::repeat_byte(0x44);
        let ack = engine.finalize_block(hash).await.unwrap();
        assert_eq!(ack.result(), &json!(true));
        assert_eq!(ack.hash(), None);

        drop(engine);
        let seen = server.await.unwrap();
        assert_eq!(seen[0].method, "engine_finalizeBlock");
        assert_eq!(seen[0].params, vec![json!(hash), Value::Null]);
    }
}
