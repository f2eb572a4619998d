use crate::{
    error::{
        ClientError,
        TransportError,
    },
    transport::{
        FrameReceiver,
        HttpTransport,
        Transport,
        WsTransport,
    },
};

use dashmap::DashMap;
use engine_rpc_core::{
    JsonRpcReply,
    JsonRpcRequest,
    ReplyPayload,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{
    sync::{
        Arc,
        atomic::{
            AtomicU64,
            Ordering,
        },
    },
    time::Duration,
};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    trace,
    warn,
};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Outstanding requests, keyed by correlation id.
type PendingTable = Arc<DashMap<u64, oneshot::Sender<JsonRpcReply>>>;

/// Configuration of an [`RpcClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Timeout applied by [`RpcClient::send`].
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// JSON-RPC client that correlates replies to requests.
///
/// Every call allocates a fresh id from a monotonic counter and parks a
/// oneshot sender in the pending table. A single dispatcher task drains the
/// transport's inbound frames and resolves the entry whose id matches; replies
/// for ids that are not outstanding are dropped. Calls may be issued
/// concurrently from any number of tasks.
///
/// ``` no_run
/// use engine_rpc_client::{ClientConfig, RpcClient};
///
/// #[tokio::main]
/// async fn main() {
///     let client = RpcClient::http("http://127.0.0.1:8545", ClientConfig::default()).unwrap();
///     let head = client.send("eth_blockNumber", vec![]).await.unwrap();
/// }
/// ```
#[derive(Debug)]
pub struct RpcClient<T> {
    transport: T,
    pending: PendingTable,
    request_id: AtomicU64,
    config: ClientConfig,
    /// Stops the dispatcher when the client is dropped.
    shutdown: CancellationToken,
    /// Cancelled by the dispatcher once the inbound stream has ended.
    closed: CancellationToken,
}

impl<T: Transport> RpcClient<T> {
    /// Creates a client over `transport` and spawns its dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(transport: T, inbound: FrameReceiver, config: ClientConfig) -> Self {
        let pending: PendingTable = Arc::new(DashMap::new());
        let shutdown = CancellationToken::new();
        let closed = CancellationToken::new();

        tokio::spawn(dispatch(
            inbound,
            pending.clone(),
            shutdown.clone(),
            closed.clone(),
        ));

        Self {
            transport,
            pending,
            request_id: AtomicU64::new(1),
            config,
            shutdown,
            closed,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Number of requests awaiting a reply.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Sends `method` and returns the result payload.
    pub async fn send(&self, method: &str, params: Vec<Value>) -> Result<Value, ClientError> {
        self.send_with_timeout(method, params, self.config.request_timeout)
            .await
    }

    /// Sends `method` and decodes the result payload into `R`.
    pub async fn request<R>(&self, method: &str, params: Vec<Value>) -> Result<R, ClientError>
    where
        R: DeserializeOwned,
    {
        let result = self.send(method, params).await?;
        serde_json::from_value(result).map_err(|source| {
            ClientError::Decode {
                method: method.to_string(),
                source,
            }
        })
    }

    /// Sends `method` with an explicit timeout and returns the result payload.
    ///
    /// A reply carrying an error object fails with [`ClientError::Protocol`];
    /// a reply carrying neither member fails with [`ClientError::MalformedReply`].
    pub async fn send_with_timeout(
        &self,
        method: &str,
        params: Vec<Value>,
        timeout: Duration,
    ) -> Result<Value, ClientError> {
        let reply = self.exchange(method, params, timeout).await?;
        let malformed = (reply.result.is_none() && reply.error.is_none())
            .then(|| serde_json::to_string(&reply).unwrap_or_default());

        match reply.into_payload() {
            ReplyPayload::Result(result) => Ok(result),
            ReplyPayload::Error(error) => {
                Err(ClientError::Protocol {
                    method: method.to_string(),
                    code: error.code,
                    message: error.message,
                    data: error.data,
                })
            }
            ReplyPayload::Empty => {
                Err(ClientError::MalformedReply {
                    method: method.to_string(),
                    reply: malformed.unwrap_or_default(),
                })
            }
        }
    }

    /// Runs one request/reply exchange and returns the matched reply as is.
    ///
    /// Only transport failures are raised here. The id is removed from the
    /// pending table on every exit path, so a reply arriving after a timeout
    /// is dropped by the dispatcher.
    #[tracing::instrument(level = "debug", skip_all, fields(method, id))]
    pub async fn exchange(
        &self,
        method: &str,
        params: Vec<Value>,
        timeout: Duration,
    ) -> Result<JsonRpcReply, ClientError> {
        if method.is_empty() {
            return Err(ClientError::EmptyMethod);
        }

        let id = self.next_request_id();
        tracing::Span::current().record("method", method);
        tracing::Span::current().record("id", id);

        let request = JsonRpcRequest::new(id, method, params);
        let frame = serde_json::to_string(&request)
            .map_err(|err| transport_failure(&request, TransportError::Serialize(err)))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.insert(id, reply_tx);
        let _entry = PendingEntry {
            pending: &self.pending,
            id,
        };

        if self.closed.is_cancelled() {
            return Err(transport_failure(&request, TransportError::Closed));
        }

        trace!(%frame, "Sending request");
        let exchange = async {
            self.transport.send_frame(frame).await?;
            reply_rx.await.map_err(|_| TransportError::Closed)
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(reply)) => {
                debug!("Reply received");
                Ok(reply)
            }
            Ok(Err(err)) => Err(transport_failure(&request, err)),
            Err(_) => {
                warn!(?timeout, "Request timed out");
                Err(transport_failure(&request, TransportError::Timeout(timeout)))
            }
        }
    }
}

impl RpcClient<HttpTransport> {
    /// Creates a client speaking JSON-RPC over HTTP to `url`.
    pub fn http(url: &str, config: ClientConfig) -> Result<Self, TransportError> {
        let (transport, inbound) = HttpTransport::new(url)?;
        Ok(Self::new(transport, inbound, config))
    }
}

impl RpcClient<WsTransport> {
    /// Connects a client speaking JSON-RPC over a WebSocket to `url`.
    pub async fn ws(url: &str, config: ClientConfig) -> Result<Self, TransportError> {
        let (transport, inbound) = WsTransport::connect(url).await?;
        Ok(Self::new(transport, inbound, config))
    }
}

impl<T> Drop for RpcClient<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Removes its id from the pending table when dropped.
struct PendingEntry<'a> {
    pending: &'a PendingTable,
    id: u64,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

fn transport_failure(request: &JsonRpcRequest, source: TransportError) -> ClientError {
    ClientError::Transport {
        method: request.method.clone(),
        params: request
            .params
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join(","),
        source,
    }
}

/// Drains inbound frames until the stream ends or the client is dropped.
///
/// On exit every outstanding sender is dropped, which fails the waiting calls
/// with [`TransportError::Closed`].
async fn dispatch(
    mut inbound: FrameReceiver,
    pending: PendingTable,
    shutdown: CancellationToken,
    closed: CancellationToken,
) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            frame = inbound.recv() => {
                let Some(frame) = frame else {
                    debug!("Inbound frame stream ended");
                    break;
                };
                route_frame(&frame, &pending);
            }
        }
    }

    closed.cancel();
    pending.clear();
}

fn route_frame(frame: &str, pending: &PendingTable) {
    let value: Value = match serde_json::from_str(frame) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "Dropping unparsable frame");
            return;
        }
    };

    match value {
        Value::Array(replies) => {
            for reply in replies {
                route_reply(reply, pending);
            }
        }
        reply => route_reply(reply, pending),
    }
}

fn route_reply(value: Value, pending: &PendingTable) {
    let reply: JsonRpcReply = match serde_json::from_value(value) {
        Ok(reply) => reply,
        Err(err) => {
            warn!(error = %err, "Dropping frame that is not a JSON-RPC reply");
            return;
        }
    };

    // Notifications and replies with non-numeric ids never match a request.
    let Some(id) = reply.correlation_id() else {
        trace!(id = %reply.id, "Ignoring frame without a numeric id");
        return;
    };

    match pending.remove(&id) {
        Some((_, sender)) => {
            if sender.send(reply).is_err() {
                debug!(id, "Caller went away before its reply arrived");
            }
        }
        None => warn!(id, "Dropping reply for unknown or expired request id"),
    }
}
