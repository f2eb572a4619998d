use super::{
    FrameReceiver,
    FrameSender,
    Transport,
};
use crate::error::TransportError;

use futures_util::{
    SinkExt,
    StreamExt,
};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::Message,
};
use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    warn,
};
use url::Url;

/// WebSocket transport: a single socket shared by every outstanding call.
///
/// A writer task drains outbound frames into the socket and a reader task
/// forwards text frames to the inbound stream. When the socket closes the
/// reader drops the inbound sender, which fails every outstanding call.
#[derive(Debug)]
pub struct WsTransport {
    outbound: mpsc::UnboundedSender<String>,
    shutdown: CancellationToken,
}

impl WsTransport {
    pub async fn connect(url: &str) -> Result<(Self, FrameReceiver), TransportError> {
        let url = Url::parse(url)?;
        let (stream, _response) = connect_async(url.as_str()).await?;
        debug!(%url, "WebSocket connected");

        let (mut sink, mut source) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound, inbound_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let writer_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = writer_shutdown.cancelled() => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                    frame = outbound_rx.recv() => {
                        let Some(frame) = frame else {
                            break;
                        };
                        if let Err(err) = sink.send(Message::Text(frame.into())).await {
                            warn!(%err, "WebSocket write failed");
                            writer_shutdown.cancel();
                            break;
                        }
                    }
                }
            }
        });

        let reader_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = reader_shutdown.cancelled() => break,
                    message = source.next() => {
                        if !forward_message(message, &inbound) {
                            break;
                        }
                    }
                }
            }
            reader_shutdown.cancel();
        });

        Ok((Self { outbound, shutdown }, inbound_rx))
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Forwards one socket message to the inbound stream. Returns `false` once
/// the reader should stop.
fn forward_message(
    message: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
    inbound: &FrameSender,
) -> bool {
    match message {
        Some(Ok(Message::Text(text))) => inbound.send(text.as_str().to_owned()).is_ok(),
        Some(Ok(Message::Binary(bytes))) => {
            match String::from_utf8(bytes.to_vec()) {
                Ok(text) => inbound.send(text).is_ok(),
                Err(err) => {
                    warn!(%err, "Dropping non UTF-8 binary frame");
                    true
                }
            }
        }
        Some(Ok(Message::Close(frame))) => {
            debug!(?frame, "WebSocket closed by peer");
            false
        }
        Some(Ok(_)) => true,
        Some(Err(err)) => {
            warn!(%err, "WebSocket read failed");
            false
        }
        None => false,
    }
}

impl Transport for WsTransport {
    async fn send_frame(&self, frame: String) -> Result<(), TransportError> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.outbound.send(frame).map_err(|_| TransportError::Closed)
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
