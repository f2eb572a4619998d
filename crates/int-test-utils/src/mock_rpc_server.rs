use axum::{
    Router,
    extract::{
        State,
        WebSocketUpgrade,
        ws::{
            Message,
            WebSocket,
        },
    },
    http::{
        StatusCode,
        header,
    },
    response::{
        IntoResponse,
        Response,
    },
    routing::{
        get,
        post,
    },
};
use dashmap::DashMap;
use futures_util::{
    SinkExt,
    StreamExt,
};
use serde_json::{
    Value,
    json,
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    net::TcpListener,
    sync::mpsc,
};

/// Canned HTTP answer that bypasses JSON-RPC framing.
#[derive(Debug, Clone)]
struct RawResponse {
    status: StatusCode,
    body: String,
}

#[derive(Debug, Clone, Default)]
struct MockState {
    /// Reply template per method. The request id is patched in.
    responses: Arc<DashMap<String, Value>>,
    raw_responses: Arc<DashMap<String, RawResponse>>,
    delays: Arc<DashMap<String, Duration>>,
    call_counts: Arc<DashMap<String, u64>>,
}

/// Scripted JSON-RPC node reachable over HTTP and WebSocket.
///
/// Every method answers from a reply template; the request id is echoed.
/// Methods without a template answer `{"result": null}`.
#[derive(Debug, Clone)]
pub struct MockRpcServer {
    state: MockState,
    http_port: u16,
    ws_port: u16,
}

impl MockRpcServer {
    pub async fn new() -> anyhow::Result<Self> {
        let http_listener = TcpListener::bind("127.0.0.1:0").await?;
        let ws_listener = TcpListener::bind("127.0.0.1:0").await?;

        let server = Self {
            state: MockState::default(),
            http_port: http_listener.local_addr()?.port(),
            ws_port: ws_listener.local_addr()?.port(),
        };

        server.setup_default_responses();
        server.start_http_server(http_listener);
        server.start_ws_server(ws_listener);

        Ok(server)
    }

    fn setup_default_responses(&self) {
        self.add_result("eth_chainId", json!("0x2a"));
        self.add_result("net_version", json!("42"));
        self.add_result("eth_blockNumber", json!("0x0"));
        self.add_result(
            "engine_createBlock",
            json!({
                "hash": format!("0x{:064x}", 1),
                "aux": {
                    "header_only": false,
                    "clear_justification_requests": false,
                    "needs_justification": false,
                    "bad_justification": false,
                    "is_new_best": true
                }
            }),
        );
        self.add_result("engine_finalizeBlock", json!(true));
    }

    pub fn http_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.http_port)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.ws_port)
    }

    /// Sets the full reply template for `method`.
    pub fn add_response(&self, method: &str, response: Value) {
        self.state.responses.insert(method.to_string(), response);
    }

    /// Answers `method` with `result`.
    pub fn add_result(&self, method: &str, result: Value) {
        self.add_response(
            method,
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": result
            }),
        );
    }

    /// Mock an RPC error response
    pub fn mock_rpc_error(&self, method: &str, error_code: i64, error_message: &str) {
        self.add_response(
            method,
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {
                    "code": error_code,
                    "message": error_message
                }
            }),
        );
    }

    /// Answers HTTP calls to `method` with a raw status and body.
    pub fn mock_raw_response(&self, method: &str, status: u16, body: &str) {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.state.raw_responses.insert(
            method.to_string(),
            RawResponse {
                status,
                body: body.to_string(),
            },
        );
    }

    /// Delays every reply to `method` by `delay`.
    pub fn set_delay(&self, method: &str, delay: Duration) {
        self.state.delays.insert(method.to_string(), delay);
    }

    /// Number of requests seen for `method` on either protocol.
    pub fn call_count(&self, method: &str) -> u64 {
        self.state.call_counts.get(method).map_or(0, |count| *count)
    }

    fn start_http_server(&self, listener: TcpListener) {
        let app = Router::new()
            .route("/", post(handle_http_request))
            .with_state(self.state.clone());

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(%e, "Mock HTTP server error");
            }
        });
    }

    fn start_ws_server(&self, listener: TcpListener) {
        let app = Router::new()
            .route("/", get(handle_ws_upgrade))
            .with_state(self.state.clone());

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(%e, "Mock WebSocket server error");
            }
        });
    }
}

async fn handle_http_request(State(state): State<MockState>, body: String) -> Response {
    let Ok(request) = serde_json::from_str::<Value>(&body) else {
        return (StatusCode::BAD_REQUEST, "invalid JSON").into_response();
    };

    let method = method_of(&request);
    if let Some(raw) = state.raw_responses.get(&method).map(|raw| raw.clone()) {
        state.record_call(&method);
        return (raw.status, raw.body).into_response();
    }

    let response = state.generate_response(&request).await;
    (
        [(header::CONTENT_TYPE, "application/json")],
        response.to_string(),
    )
        .into_response()
}

async fn handle_ws_upgrade(ws: WebSocketUpgrade, State(state): State<MockState>) -> Response {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Serves one socket. Each request is answered from its own task, so delayed
/// methods are answered after faster ones issued later.
async fn handle_ws_connection(socket: WebSocket, state: MockState) {
    let (mut sink, mut source) = socket.split();
    let (replies, mut replies_rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        while let Some(reply) = replies_rx.recv().await {
            if let Err(e) = sink.send(Message::Text(reply.into())).await {
                tracing::warn!(%e, "Mock WebSocket send error");
                break;
            }
        }
    });

    while let Some(Ok(message)) = source.next().await {
        let text = match message {
            Message::Text(text) => text.as_str().to_owned(),
            Message::Close(_) => break,
            _ => continue,
        };
        let Ok(request) = serde_json::from_str::<Value>(&text) else {
            continue;
        };

        let state = state.clone();
        let replies = replies.clone();
        tokio::spawn(async move {
            let response = state.generate_response(&request).await;
            let _ = replies.send(response.to_string());
        });
    }

    drop(replies);
    let _ = writer.await;
}

fn method_of(request: &Value) -> String {
    request
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

impl MockState {
    fn record_call(&self, method: &str) {
        *self.call_counts.entry(method.to_string()).or_insert(0) += 1;
    }

    /// Builds the reply to `request` from its method's template.
    async fn generate_response(&self, request: &Value) -> Value {
        let method = method_of(request);
        let id = request.get("id").cloned().unwrap_or(Value::Null);
        self.record_call(&method);

        let delay = self.delays.get(&method).map(|delay| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut response = self
            .responses
            .get(&method)
            .map(|response| response.clone())
            .unwrap_or_else(|| {
                json!({
                    "jsonrpc": "2.0",
                    "result": null
                })
            });
        if let Some(obj) = response.as_object_mut() {
            obj.insert("id".to_string(), id);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_echoes_the_request_id() {
        let server = MockRpcServer::new().await.unwrap();

        let body: Value = reqwest::Client::new()
            .post(server.http_url())
            .json(&json!({"jsonrpc": "2.0", "id": 77, "method": "eth_chainId", "params": []}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["id"], 77);
        assert_eq!(body["result"], "0x2a");
        assert_eq!(server.call_count("eth_chainId"), 1);
    }

    #[tokio::test]
    async fn test_raw_response_override() {
        let server = MockRpcServer::new().await.unwrap();
        server.mock_raw_response("eth_blockNumber", 503, "unavailable");

        let response = reqwest::Client::new()
            .post(server.http_url())
            .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "eth_blockNumber", "params": []}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 503);
        assert_eq!(response.text().await.unwrap(), "unavailable");
    }

    #[tokio::test]
    async fn test_unknown_method_answers_null() {
        let server = MockRpcServer::new().await.unwrap();

        let body: Value = reqwest::Client::new()
            .post(server.http_url())
            .json(&json!({"jsonrpc": "2.0", "id": "x", "method": "eth_whatever"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["id"], "x");
        assert!(body["result"].is_null());
        assert!(body.get("result").is_some());
    }
}
