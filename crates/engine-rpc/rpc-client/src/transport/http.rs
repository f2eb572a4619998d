use super::{
    FrameReceiver,
    FrameSender,
    Transport,
};
use crate::error::TransportError;

use reqwest::{
    Client,
    header,
};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

/// Longest body excerpt kept in a [`TransportError::MalformedFrame`].
const MAX_FRAME_EXCERPT: usize = 256;

/// HTTP transport: one POST per request frame.
///
/// The response body is forwarded to the inbound stream when it is JSON.
/// HTTP status failures and non-JSON bodies are returned to the sending call
/// directly, since the body cannot be correlated. An error reply with a `null`
/// id answers the POST that carried it, so it gets the request's id before it
/// is forwarded.
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    url: Url,
    inbound: FrameSender,
}

impl HttpTransport {
    pub fn new(url: &str) -> Result<(Self, FrameReceiver), TransportError> {
        let url = Url::parse(url)?;
        let client = Client::builder().use_rustls_tls().build()?;
        let (inbound, inbound_rx) = mpsc::unbounded_channel();

        Ok((
            Self {
                client,
                url,
                inbound,
            },
            inbound_rx,
        ))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Transport for HttpTransport {
    async fn send_frame(&self, frame: String) -> Result<(), TransportError> {
        let request_id = serde_json::from_str::<FrameId>(&frame)
            .ok()
            .map(|frame| frame.id);

        let response = self
            .client
            .post(self.url.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .body(frame)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let mut body = response.text().await?;
        let Ok(mut reply) = serde_json::from_str::<Value>(&body) else {
            return Err(TransportError::MalformedFrame(excerpt(body)));
        };

        if let Some(id) = request_id
            && claim_uncorrelated_error(&mut reply, id)
        {
            body = reply.to_string();
        }

        self.inbound.send(body).map_err(|_| TransportError::Closed)
    }
}

/// Id of an outgoing request frame.
#[derive(Deserialize)]
struct FrameId {
    id: Value,
}

/// Sets `id` on an error reply whose id is `null` or missing. Returns whether
/// the reply was changed.
fn claim_uncorrelated_error(reply: &mut Value, id: Value) -> bool {
    let Value::Object(object) = reply else {
        return false;
    };
    let uncorrelated = object.get("id").is_none_or(Value::is_null);
    if !uncorrelated || !object.contains_key("error") {
        return false;
    }
    object.insert("id".to_string(), id);
    true
}

fn excerpt(mut body: String) -> String {
    if body.len() > MAX_FRAME_EXCERPT {
        let mut end = MAX_FRAME_EXCERPT;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}
