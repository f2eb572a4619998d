use super::{
    FrameReceiver,
    FrameSender,
    Transport,
};
use crate::error::TransportError;

use engine_rpc_core::{
    JsonRpcErrorObject,
    JsonRpcReply,
    JsonRpcRequest,
};
use serde_json::{
    Value,
    json,
};
use tokio::sync::mpsc;

/// In-memory transport. The other end is a [`ChannelPeer`] that plays the
/// node: it reads request frames and writes reply frames in any order.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    outbound: FrameSender,
}

/// Node side of a [`ChannelTransport`]. Dropping it closes the transport.
#[derive(Debug)]
pub struct ChannelPeer {
    requests: FrameReceiver,
    replies: FrameSender,
}

impl ChannelTransport {
    /// Creates a connected transport, the client's inbound stream, and the peer.
    pub fn pair() -> (Self, FrameReceiver, ChannelPeer) {
        let (outbound, requests) = mpsc::unbounded_channel();
        let (replies, inbound) = mpsc::unbounded_channel();

        (Self { outbound }, inbound, ChannelPeer { requests, replies })
    }
}

impl Transport for ChannelTransport {
    async fn send_frame(&self, frame: String) -> Result<(), TransportError> {
        self.outbound.send(frame).map_err(|_| TransportError::Closed)
    }
}

impl ChannelPeer {
    /// Next raw request frame, or `None` once the client side is gone.
    pub async fn next_frame(&mut self) -> Option<String> {
        self.requests.recv().await
    }

    /// Next request, skipping frames that do not parse as a request.
    pub async fn next_request(&mut self) -> Option<JsonRpcRequest> {
        loop {
            let frame = self.requests.recv().await?;
            if let Ok(request) = serde_json::from_str(&frame) {
                return Some(request);
            }
        }
    }

    /// Writes a raw frame. Returns `false` if the client side is gone.
    pub fn send_raw(&self, frame: impl Into<String>) -> bool {
        self.replies.send(frame.into()).is_ok()
    }

    pub fn reply(&self, reply: &JsonRpcReply) -> bool {
        match serde_json::to_string(reply) {
            Ok(frame) => self.send_raw(frame),
            Err(_) => false,
        }
    }

    /// Replies to `request` with `result`.
    pub fn respond(&self, request: &JsonRpcRequest, result: Value) -> bool {
        self.reply(&JsonRpcReply::success(json!(request.id), result))
    }

    /// Replies to `request` with an error object.
    pub fn respond_error(&self, request: &JsonRpcRequest, error: JsonRpcErrorObject) -> bool {
        self.reply(&JsonRpcReply::failure(json!(request.id), error))
    }
}
