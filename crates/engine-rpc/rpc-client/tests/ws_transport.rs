use alloy_primitives::B256;
use engine_rpc_client::{
    BlockEngine,
    ClientConfig,
    ClientError,
    EngineConfig,
    RpcClient,
};
use int_test_utils::MockRpcServer;
use serde_json::json;
use std::{
    sync::Arc,
    time::{
        Duration,
        Instant,
    },
};

#[tokio::test]
async fn test_out_of_order_replies_over_one_socket() -> anyhow::Result<()> {
    let server = MockRpcServer::new().await?;
    server.add_result("test_slow", json!("slow"));
    server.add_result("test_fast", json!("fast"));
    server.set_delay("test_slow", Duration::from_millis(300));

    let client = RpcClient::ws(&server.ws_url(), ClientConfig::default()).await?;

    let started = Instant::now();
    let slow = async {
        let result = client.send("test_slow", vec![json!(1)]).await;
        (result, started.elapsed())
    };
    let fast = async {
        // Issued after the slow call, answered before it.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let result = client.send("test_fast", vec![json!(2)]).await;
        (result, started.elapsed())
    };
    let ((slow, slow_at), (fast, fast_at)) = tokio::join!(slow, fast);

    assert_eq!(slow?, json!("slow"));
    assert_eq!(fast?, json!("fast"));
    assert!(fast_at < slow_at);
    assert_eq!(client.pending_requests(), 0);
    Ok(())
}

#[tokio::test]
async fn test_many_concurrent_calls() -> anyhow::Result<()> {
    let server = MockRpcServer::new().await?;
    let client = Arc::new(RpcClient::ws(&server.ws_url(), ClientConfig::default()).await?);

    let mut handles = Vec::new();
    for _ in 0..32 {
        let client = client.clone();
        handles.push(tokio::spawn(async move { client.chain_id().await }));
    }
    for handle in handles {
        assert_eq!(handle.await??, 42);
    }
    assert_eq!(server.call_count("eth_chainId"), 32);
    Ok(())
}

#[tokio::test]
async fn test_protocol_error_over_websocket() -> anyhow::Result<()> {
    let server = MockRpcServer::new().await?;
    server.mock_rpc_error("eth_call", -32000, "execution reverted");

    let client = RpcClient::ws(&server.ws_url(), ClientConfig::default()).await?;
    match client.block_hash_at(3).await.unwrap_err() {
        ClientError::Protocol { code, message, .. } => {
            assert_eq!(code, -32000);
            assert_eq!(message, "execution reverted");
        }
        other => panic!("expected protocol failure, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_engine_over_websocket() -> anyhow::Result<()> {
    let server = MockRpcServer::new().await?;
    let client = Arc::new(RpcClient::ws(&server.ws_url(), ClientConfig::default()).await?);
    let engine = BlockEngine::new(client, EngineConfig::default());

    let ack = engine.produce_block_no_wait(true).await?;
    assert_eq!(ack.hash(), Some(B256::with_last_byte(1)));

    server.add_result("engine_createBlock", json!(false));
    let err = engine.produce_block_no_wait(true).await.unwrap_err();
    assert!(err.is_engine(), "{err:?}");
    Ok(())
}
