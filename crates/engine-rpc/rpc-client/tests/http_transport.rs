use engine_rpc_client::{
    ClientConfig,
    ClientError,
    RpcClient,
    TransportError,
};
use serde_json::json;
use std::time::Duration;
use wiremock::{
    Mock,
    MockServer,
    ResponseTemplate,
    matchers::{
        body_partial_json,
        method,
    },
};

#[tokio::test]
async fn test_successful_call() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"jsonrpc": "2.0", "id": 1, "method": "eth_chainId"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": "0x2a"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = RpcClient::http(&server.uri(), ClientConfig::default())?;
    assert_eq!(client.chain_id().await?, 42);
    Ok(())
}

#[tokio::test]
async fn test_http_status_is_a_transport_failure() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = RpcClient::http(&server.uri(), ClientConfig::default())?;
    let err = client
        .send("engine_createBlock", vec![json!(true), json!(false), json!(null)])
        .await
        .unwrap_err();

    assert!(matches!(
        err.transport_cause(),
        Some(TransportError::Status(500))
    ));
    assert_eq!(
        err.to_string(),
        "Failed to send request (engine_createBlock (true,false,null)): HTTP error: 500"
    );
    assert_eq!(client.pending_requests(), 0);
    Ok(())
}

#[tokio::test]
async fn test_non_json_body_is_a_malformed_frame() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>bad gateway</html>"))
        .mount(&server)
        .await;

    let client = RpcClient::http(&server.uri(), ClientConfig::default())?;
    let err = client.send("eth_blockNumber", vec![]).await.unwrap_err();

    match err.transport_cause() {
        Some(TransportError::MalformedFrame(body)) => assert!(body.contains("bad gateway")),
        other => panic!("expected malformed frame, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_reply_with_foreign_id_is_never_delivered() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 999,
            "result": "0x1"
        })))
        .mount(&server)
        .await;

    let client = RpcClient::http(&server.uri(), ClientConfig::default())?;
    let err = client
        .send_with_timeout("eth_blockNumber", vec![], Duration::from_millis(300))
        .await
        .unwrap_err();

    assert!(matches!(
        err.transport_cause(),
        Some(TransportError::Timeout(_))
    ));
    assert_eq!(client.pending_requests(), 0);
    Ok(())
}

#[tokio::test]
async fn test_error_object_is_a_protocol_failure() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32602, "message": "forking is not supported", "data": "0xdead"}
        })))
        .mount(&server)
        .await;

    let client = RpcClient::http(&server.uri(), ClientConfig::default())?;
    match client.send("engine_createBlock", vec![]).await.unwrap_err() {
        ClientError::Protocol {
            code,
            message,
            data,
            ..
        } => {
            assert_eq!(code, -32602);
            assert_eq!(message, "forking is not supported");
            assert_eq!(data, Some(json!("0xdead")));
        }
        other => panic!("expected protocol failure, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_null_id_error_reaches_the_sender() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": {"code": -32600, "message": "Request too large"}
        })))
        .mount(&server)
        .await;

    let client = RpcClient::http(&server.uri(), ClientConfig::default())?;
    let started = std::time::Instant::now();
    let err = client
        .send_with_timeout("eth_blockNumber", vec![], Duration::from_secs(10))
        .await
        .unwrap_err();

    match err {
        ClientError::Protocol { code, message, .. } => {
            assert_eq!(code, -32600);
            assert_eq!(message, "Request too large");
        }
        other => panic!("expected protocol failure, got {other:?}"),
    }
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(client.pending_requests(), 0);
    Ok(())
}

#[tokio::test]
async fn test_connection_refused() -> anyhow::Result<()> {
    // Bind and drop to get a port nothing listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);

    let client = RpcClient::http(&format!("http://{addr}"), ClientConfig::default())?;
    let err = client.send("eth_chainId", vec![]).await.unwrap_err();

    assert!(matches!(err.transport_cause(), Some(TransportError::Http(_))));
    Ok(())
}

#[test]
fn test_invalid_url() {
    let err = RpcClient::http("not a url", ClientConfig::default()).unwrap_err();
    assert!(matches!(err, TransportError::InvalidUrl(_)));
}
