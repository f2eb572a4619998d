//! `transport`
//!
//! Transports move serialized JSON-RPC frames between the client and a node.
//! Outbound frames go through [`Transport::send_frame`]; inbound frames are
//! pushed into the [`FrameSender`] the transport was created with and drained
//! by the client's dispatcher task. A transport signals that it is gone by
//! dropping that sender.

mod channel;
mod http;
mod ws;

pub use channel::{
    ChannelPeer,
    ChannelTransport,
};
pub use http::HttpTransport;
pub use ws::WsTransport;

use crate::error::TransportError;
use std::future::Future;
use tokio::sync::mpsc;

/// Sending half of the inbound frame stream.
pub type FrameSender = mpsc::UnboundedSender<String>;

/// Receiving half of the inbound frame stream, owned by the client dispatcher.
pub type FrameReceiver = mpsc::UnboundedReceiver<String>;

/// A duplex channel to a JSON-RPC node.
///
/// Implementations must deliver every frame they receive from the node to the
/// inbound stream unchanged, and must not interpret correlation ids.
pub trait Transport: Send + Sync + 'static {
    /// Sends one serialized request frame.
    ///
    /// An error returned here is attributed to the call that sent the frame.
    fn send_frame(
        &self,
        frame: String,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
