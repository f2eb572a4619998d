use alloy_primitives::B256;
use serde_json::Value;
use std::time::Duration;

/// Failure of a single call made through [`crate::RpcClient`] or [`crate::BlockEngine`].
///
/// Every variant is terminal for the call that produced it. Nothing here is
/// retried by the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The exchange never completed: connection error, timeout, malformed
    /// frame, or the transport went away while the call was outstanding.
    #[error("Failed to send request ({method} ({params})): {source}")]
    Transport {
        method: String,
        params: String,
        #[source]
        source: TransportError,
    },
    /// The node answered with an error object.
    #[error("JSON-RPC error code {code} from {method}: {message}")]
    Protocol {
        method: String,
        code: i64,
        message: String,
        data: Option<Value>,
    },
    /// The reply carried neither a result nor an error.
    #[error("Reply to {method} carried neither result nor error: {reply}")]
    MalformedReply { method: String, reply: String },
    /// The engine acknowledged the command without a truthy result.
    #[error("Unexpected result: {reply}")]
    Engine { reply: String },
    /// A produced block did not become observable within the settling window.
    #[error("Block {hash} was not observable after {waited:?}")]
    SettleTimeout { hash: B256, waited: Duration },
    #[error("Method name must not be empty")]
    EmptyMethod,
    #[error("Failed to decode result of {method}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ClientError {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    pub fn is_engine(&self) -> bool {
        matches!(self, Self::Engine { .. })
    }

    /// Underlying transport cause, if this is a transport failure.
    pub fn transport_cause(&self) -> Option<&TransportError> {
        match self {
            Self::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors raised by a [`crate::Transport`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP error: {0}")]
    Status(u16),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("URL parse error: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Transport closed")]
    Closed,
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
    #[error("JSON serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
